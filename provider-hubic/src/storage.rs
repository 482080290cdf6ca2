//! HubiC storage variant.
//!
//! HubiC layers two credential tiers: the primary OAuth2 tokens issued by
//! the HubiC API, and OpenStack object-store credentials (token, endpoint,
//! account identifier) derived from them through the credentials endpoint.
//! Every document operation first obtains an account whose secondary tier is
//! valid; a 401 from the object store triggers exactly one re-derivation and
//! retry, never a loop.
//!
//! Folders do not exist on the object store. They are implied by file paths,
//! and a folder "exists" exactly when its marker entry does.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bridge_traits::{
    AppKeyProvider, Clock, HttpClient, HttpMethod, HttpRequest, HttpResponse, ProgressListener,
};
use tracing::{debug, info, instrument, warn};
use url::Url;

use core_cloud::document::trim_slashes;
use core_cloud::error::{self, RemoteReason};
use core_cloud::{
    Account, AccountStore, ChangeCollector, CredentialManager, IdentityResolver, OauthEndpoints,
    ProviderKind, RemoteChanges, RemoteDocument, RemoteStorage, Result, StorageError,
    APP_FOLDER_NAME, FOLDER_METADATA_FILE_NAME,
};

use crate::openstack::OpenStackClient;
use crate::types::{
    parse_last_modified, parse_rfc3339, HubicAccountInfo, HubicAccountUsage,
    HubicOpenStackCredentials, OpenStackObject,
};

/// HubiC OAuth2 authorization page
const OAUTH_AUTHORIZE_URL: &str = "https://api.hubic.com/oauth/auth/";

/// HubiC OAuth2 token endpoint
const OAUTH_TOKEN_URL: &str = "https://api.hubic.com/oauth/token/";

/// HubiC REST API base URL
const API_BASE_URL: &str = "https://api.hubic.com/1.0";

/// Scopes needed for identity, usage, and object-store credentials
const OAUTH_SCOPE: &str = "usage.r,account.r,credentials.r,links.drw";

/// The single OpenStack container HubiC exposes
const OPENSTACK_CONTAINER: &str = "default";

/// Resolves the account name through the HubiC identity endpoint.
struct HubicIdentityResolver {
    http_client: Arc<dyn HttpClient>,
}

#[async_trait]
impl IdentityResolver for HubicIdentityResolver {
    async fn account_name_from_token(&self, access_token: &str) -> Result<String> {
        let request = HttpRequest::new(HttpMethod::Get, format!("{}/account", API_BASE_URL))
            .bearer_token(access_token);
        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(error::classify_response(response.status, &response.body));
        }
        let info: HubicAccountInfo = response.json().map_err(|e| {
            StorageError::Transport(format!("failed to parse account response: {}", e))
        })?;
        Ok(info.email)
    }
}

/// One object-store request, replayable for the single 401 retry.
enum ObjectRequest<'a> {
    Head { path: &'a str },
    Delete { path: &'a str },
    List { prefix: &'a str },
}

/// [`RemoteStorage`] variant for HubiC.
pub struct HubicStorage {
    http_client: Arc<dyn HttpClient>,
    store: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    credentials: CredentialManager,
    /// One client per storage endpoint, created lazily
    openstack_clients: Mutex<HashMap<String, Arc<OpenStackClient>>>,
}

impl HubicStorage {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        app_keys: Arc<dyn AppKeyProvider>,
        store: Arc<dyn AccountStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let endpoints = OauthEndpoints {
            authorize_url: OAUTH_AUTHORIZE_URL.to_string(),
            token_url: OAUTH_TOKEN_URL.to_string(),
            revoke_url: None,
            scope: OAUTH_SCOPE.to_string(),
        };
        let credentials = CredentialManager::new(
            ProviderKind::Hubic,
            endpoints,
            http_client.clone(),
            app_keys,
            store.clone(),
            clock.clone(),
        );
        Self {
            http_client,
            store,
            clock,
            credentials,
            openstack_clients: Mutex::new(HashMap::new()),
        }
    }

    fn identity_resolver(&self) -> HubicIdentityResolver {
        HubicIdentityResolver {
            http_client: self.http_client.clone(),
        }
    }

    fn openstack_client(&self, endpoint: &str) -> Arc<OpenStackClient> {
        // Cache of stateless clients; entries from before a poisoning panic
        // are still valid.
        let mut clients = self
            .openstack_clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        clients
            .entry(endpoint.to_string())
            .or_insert_with(|| {
                Arc::new(OpenStackClient::new(self.http_client.clone(), endpoint))
            })
            .clone()
    }

    /// Fetch fresh OpenStack credentials and merge them into the account.
    ///
    /// Refreshes the primary token first when needed. The endpoint URL from
    /// the grant is split into the base endpoint (scheme, host, port) and the
    /// account identifier (last path segment). Persists and returns the
    /// updated account.
    #[instrument(skip(self))]
    pub async fn openstack_credentials(&self, account_name: &str) -> Result<Account> {
        let mut account = self.credentials.refreshed_account(account_name).await?;

        let request = HttpRequest::new(
            HttpMethod::Get,
            format!("{}/account/credentials", API_BASE_URL),
        )
        .header("Authorization", account.auth_header()?);
        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(error::classify_response(response.status, &response.body));
        }
        let grant: HubicOpenStackCredentials = response.json().map_err(|e| {
            StorageError::Transport(format!("failed to parse credentials response: {}", e))
        })?;

        if let Some(token) = grant.token.filter(|t| !t.is_empty()) {
            account.secondary_token = Some(token);
        }
        if let Some(expires) = grant.expires.as_deref() {
            account.secondary_expires_at = parse_rfc3339(expires);
        }
        if let Some(endpoint) = grant.endpoint.as_deref() {
            let parsed = Url::parse(endpoint).map_err(|e| {
                StorageError::Transport(format!("malformed storage endpoint {}: {}", endpoint, e))
            })?;
            account.secondary_account = parsed
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(str::to_string);
            let mut base = parsed;
            base.set_path("/");
            base.set_query(None);
            base.set_fragment(None);
            account.secondary_endpoint = Some(base.to_string());
            debug!(endpoint = %account.secondary_endpoint.as_deref().unwrap_or(""), "storage endpoint resolved");
        }

        self.store.save(&account).await?;
        info!(account = %account_name, "OpenStack credentials renewed");
        Ok(account)
    }

    /// An account whose secondary tier is currently valid.
    ///
    /// With `refresh_primary` the primary token is refreshed through its
    /// expiry gate first; either way an expired secondary tier triggers
    /// exactly one credential derivation.
    pub async fn refreshed_secondary(
        &self,
        account_name: &str,
        refresh_primary: bool,
    ) -> Result<Account> {
        let account = if refresh_primary {
            self.credentials.refreshed_account(account_name).await?
        } else {
            self.credentials.account(account_name).await?
        };
        if account.is_secondary_token_expired(self.clock.now()) {
            return self.openstack_credentials(account_name).await;
        }
        Ok(account)
    }

    fn secondary_context(account: &Account) -> Result<(String, String, String)> {
        let missing = |what: &str| {
            StorageError::remote(
                RemoteReason::AccessTokenMissing,
                format!("account {} holds no OpenStack {}", account.account_name, what),
            )
        };
        let token = account.secondary_token.clone().ok_or_else(|| missing("token"))?;
        let endpoint = account
            .secondary_endpoint
            .clone()
            .ok_or_else(|| missing("endpoint"))?;
        let os_account = account
            .secondary_account
            .clone()
            .ok_or_else(|| missing("account identifier"))?;
        Ok((token, endpoint, os_account))
    }

    async fn send_object_request(
        &self,
        account: &Account,
        request: &ObjectRequest<'_>,
    ) -> Result<HttpResponse> {
        let (token, endpoint, os_account) = Self::secondary_context(account)?;
        let client = self.openstack_client(&endpoint);
        match request {
            ObjectRequest::Head { path } => {
                client
                    .head_object(&token, &os_account, OPENSTACK_CONTAINER, trim_slashes(path))
                    .await
            }
            ObjectRequest::Delete { path } => {
                client
                    .delete_object(&token, &os_account, OPENSTACK_CONTAINER, trim_slashes(path))
                    .await
            }
            ObjectRequest::List { prefix } => {
                client
                    .list_objects(&token, &os_account, OPENSTACK_CONTAINER, prefix)
                    .await
            }
        }
    }

    /// Issue an object-store request with the single 401 retry.
    ///
    /// A rejected secondary token is re-derived once (refreshing the primary
    /// token through its expiry gate on the way) and the request replayed;
    /// a second rejection is returned to the caller as-is.
    async fn object_call(
        &self,
        account_name: &str,
        request: ObjectRequest<'_>,
    ) -> Result<(Account, HttpResponse)> {
        let account = self.refreshed_secondary(account_name, false).await?;
        let response = self.send_object_request(&account, &request).await?;
        if response.status != 401 {
            return Ok((account, response));
        }

        warn!(account = %account_name, "object store rejected token, renewing credentials once");
        let account = self.openstack_credentials(account_name).await?;
        let response = self.send_object_request(&account, &request).await?;
        Ok((account, response))
    }

    /// OpenStack `X-Timestamp` header (epoch seconds, fractional) to millis.
    fn parse_x_timestamp(value: &str) -> Option<i64> {
        value
            .parse::<f64>()
            .ok()
            .map(|seconds| (seconds * 1000.0).round() as i64)
    }

    fn document_from_head(
        account_name: &str,
        path: &str,
        response: &HttpResponse,
    ) -> RemoteDocument {
        let size = response
            .header("Content-Length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let modified_at = response.header("X-Timestamp").and_then(Self::parse_x_timestamp);
        let version = response.header("Etag").map(str::to_string);
        RemoteDocument::file(account_name, path, size, modified_at, version)
    }
}

#[async_trait]
impl RemoteStorage for HubicStorage {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Hubic
    }

    fn authorize_url(&self, _mobile: bool, login_hint: Option<&str>) -> Result<String> {
        // HubiC serves a single authorization page for all form factors.
        self.credentials.authorize_url(login_hint)
    }

    async fn exchange_authorization_code(
        &self,
        response_parameters: &HashMap<String, String>,
    ) -> Result<Account> {
        self.credentials
            .exchange_authorization_code(response_parameters, &self.identity_resolver())
            .await
    }

    async fn account_name_from_token(&self, access_token: &str) -> Result<String> {
        self.identity_resolver()
            .account_name_from_token(access_token)
            .await
    }

    async fn refresh_token(&self, account_name: &str) -> Result<Account> {
        self.credentials.refresh(account_name).await
    }

    async fn revoke_token(&self, account_name: &str) -> Result<()> {
        // HubiC has no revocation endpoint; tokens lapse on their own.
        self.credentials.revoke(account_name).await
    }

    #[instrument(skip(self))]
    async fn refresh_quota(&self, account_name: &str) -> Result<Account> {
        let mut account = self.credentials.refreshed_account(account_name).await?;

        let request = HttpRequest::new(HttpMethod::Get, format!("{}/account/usage", API_BASE_URL))
            .header("Authorization", account.auth_header()?);
        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(error::classify_response(response.status, &response.body));
        }
        let usage: HubicAccountUsage = response.json().map_err(|e| {
            StorageError::Transport(format!("failed to parse usage response: {}", e))
        })?;

        account.quota_total = Some(usage.quota);
        account.quota_used = Some(usage.used);
        self.store.save(&account).await?;
        debug!(account = %account_name, used = usage.used, quota = usage.quota, "quota refreshed");
        Ok(account)
    }

    fn root_folder(&self, account_name: &str) -> RemoteDocument {
        RemoteDocument::root_folder(account_name)
    }

    fn app_folder(&self, account_name: &str) -> RemoteDocument {
        RemoteDocument::app_folder(account_name)
    }

    async fn document(&self, account_name: &str, path: &str) -> Result<RemoteDocument> {
        self.file(account_name, path).await
    }

    async fn folder(&self, account_name: &str, path: &str) -> Result<Option<RemoteDocument>> {
        let app_folder = self.app_folder(account_name);
        if trim_slashes(path) == app_folder.path {
            return Ok(Some(app_folder));
        }

        // A folder exists exactly when its marker entry does.
        let folder = RemoteDocument::virtual_folder(account_name, path);
        let marker = folder.child_path(FOLDER_METADATA_FILE_NAME);
        match self.file(account_name, &marker).await {
            Ok(_) => Ok(Some(folder)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn file(&self, account_name: &str, path: &str) -> Result<RemoteDocument> {
        let (_, response) = self
            .object_call(account_name, ObjectRequest::Head { path })
            .await?;
        if !response.is_success() {
            return Err(error::classify_response(response.status, &response.body));
        }
        Ok(Self::document_from_head(account_name, path, &response))
    }

    #[instrument(skip(self, listener))]
    async fn changes(
        &self,
        account_name: &str,
        last_change_id: Option<&str>,
        listener: Option<&dyn ProgressListener>,
    ) -> Result<RemoteChanges> {
        let (_, response) = self
            .object_call(
                account_name,
                ObjectRequest::List {
                    prefix: APP_FOLDER_NAME,
                },
            )
            .await?;
        if !response.is_success() {
            return Err(error::classify_response(response.status, &response.body));
        }
        let objects: Vec<OpenStackObject> = response.json().map_err(|e| {
            StorageError::Transport(format!("failed to parse listing response: {}", e))
        })?;

        let mut collector = ChangeCollector::new(account_name, last_change_id, listener);
        collector.start(objects.len())?;
        for object in objects {
            let modified_at = object.last_modified.as_deref().and_then(parse_last_modified);
            let document = RemoteDocument::file(
                account_name,
                &object.name,
                object.bytes,
                modified_at,
                object.hash,
            );
            collector.push(document)?;
        }

        let changes = collector.finish();
        debug!(count = changes.changes.len(), "change listing complete");
        Ok(changes)
    }

    async fn delete_file(&self, account_name: &str, path: &str) -> Result<()> {
        let (_, response) = self
            .object_call(account_name, ObjectRequest::Delete { path })
            .await?;
        if response.is_success() {
            return Ok(());
        }
        let err = error::classify_response(response.status, &response.body);
        if err.is_not_found() {
            // Deleting an absent file is success.
            debug!(path, "delete target already absent");
            return Ok(());
        }
        Err(err)
    }

    async fn delete_folder(&self, account_name: &str, path: &str) -> Result<()> {
        let folder = RemoteDocument::virtual_folder(account_name, path);
        self.delete_file(account_name, &folder.child_path(FOLDER_METADATA_FILE_NAME))
            .await
    }
}
