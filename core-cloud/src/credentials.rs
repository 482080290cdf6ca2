//! OAuth2 credential lifecycle: authorize URL, code exchange, refresh.
//!
//! The [`CredentialManager`] owns the primary token tier for one provider.
//! It talks to the provider's token endpoint through the abstract HTTP
//! client, resolves the account name through the provider's
//! [`IdentityResolver`], and persists every successful mutation through the
//! [`AccountStore`]. Expiry decisions are made against the injected
//! [`Clock`], never against wall-clock reads scattered through the code.
//!
//! # Refresh semantics
//!
//! `refreshed_account` is the expiry gate: it returns the stored account
//! untouched while `now < expiry` and performs exactly one refresh otherwise.
//! A provider answering a refresh with `invalid_grant` yields the
//! distinguished [`StorageError::Oauth`] variant and leaves the stored
//! account exactly as it was, so the caller can re-run authorization without
//! having lost anything.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::{AppKeyProvider, AppKeys, Clock, HttpClient, HttpMethod, HttpRequest};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::account::{Account, AccountStore, ProviderKind};
use crate::error::{self, RemoteReason, Result, StorageError};
use crate::oauth::{request_state_token, TokenResponse};

/// Resolves the stable account name behind a freshly issued access token.
///
/// Providers identify users differently (identity endpoint, token claims);
/// the manager only needs the resulting name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn account_name_from_token(&self, access_token: &str) -> Result<String>;
}

/// Static OAuth2 endpoint set for one provider.
#[derive(Debug, Clone)]
pub struct OauthEndpoints {
    /// User-facing authorization page
    pub authorize_url: String,
    /// Token endpoint, used for both code exchange and refresh
    pub token_url: String,
    /// Revocation endpoint, where the provider has one
    pub revoke_url: Option<String>,
    /// Space- or comma-delimited scope string, passed through verbatim
    pub scope: String,
}

/// Primary OAuth2 token lifecycle for one provider.
pub struct CredentialManager {
    provider: ProviderKind,
    endpoints: OauthEndpoints,
    http_client: Arc<dyn HttpClient>,
    app_keys: Arc<dyn AppKeyProvider>,
    store: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
}

impl CredentialManager {
    pub fn new(
        provider: ProviderKind,
        endpoints: OauthEndpoints,
        http_client: Arc<dyn HttpClient>,
        app_keys: Arc<dyn AppKeyProvider>,
        store: Arc<dyn AccountStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            endpoints,
            http_client,
            app_keys,
            store,
            clock,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    fn keys(&self) -> Result<AppKeys> {
        self.app_keys.app_keys(self.provider.as_str()).ok_or_else(|| {
            StorageError::Configuration(format!(
                "no app keys configured for provider {}",
                self.provider.as_str()
            ))
        })
    }

    /// Load a stored account or fail with `AccountNotFound`.
    pub async fn account(&self, account_name: &str) -> Result<Account> {
        self.store
            .load(self.provider, account_name)
            .await?
            .ok_or_else(|| {
                StorageError::remote(
                    RemoteReason::AccountNotFound,
                    format!("no stored account named {}", account_name),
                )
            })
    }

    /// Build the user-facing authorization URL.
    ///
    /// Embeds a freshly generated anti-forgery state token on every call.
    #[instrument(skip(self), fields(provider = %self.provider))]
    pub fn authorize_url(&self, login_hint: Option<&str>) -> Result<String> {
        let keys = self.keys()?;
        let mut url = Url::parse(&self.endpoints.authorize_url).map_err(|e| {
            StorageError::Configuration(format!(
                "invalid authorize URL {}: {}",
                self.endpoints.authorize_url, e
            ))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &keys.client_id);
            query.append_pair("redirect_uri", &keys.redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("scope", &self.endpoints.scope);
            query.append_pair("state", &request_state_token());
            if let Some(hint) = login_hint {
                query.append_pair("login_hint", hint);
            }
        }

        debug!("built authorization URL");
        Ok(url.to_string())
    }

    async fn token_request(&self, params: &HashMap<&str, &str>) -> Result<TokenResponse> {
        let body = serde_urlencoded::to_string(params).map_err(|e| {
            StorageError::Configuration(format!("failed to encode token request: {}", e))
        })?;
        let request =
            HttpRequest::new(HttpMethod::Post, self.endpoints.token_url.clone()).form(body);

        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(error::classify_response(response.status, &response.body));
        }
        response.json().map_err(|e| {
            StorageError::Transport(format!("failed to parse token response: {}", e))
        })
    }

    /// Exchange an authorization code for tokens and create the account.
    ///
    /// The account name is derived through the provider's identity resolver
    /// from the freshly issued access token, then the account is persisted
    /// and returned. An existing account with the same name is overwritten
    /// with the new tokens.
    #[instrument(skip_all, fields(provider = %self.provider))]
    pub async fn exchange_authorization_code(
        &self,
        response_parameters: &HashMap<String, String>,
        resolver: &dyn IdentityResolver,
    ) -> Result<Account> {
        let code = response_parameters.get("code").ok_or_else(|| {
            StorageError::remote(
                RemoteReason::Unknown,
                "authorization response carries no code",
            )
        })?;
        let keys = self.keys()?;

        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code.as_str());
        params.insert("redirect_uri", keys.redirect_uri.as_str());
        params.insert("client_id", keys.client_id.as_str());
        params.insert("client_secret", keys.client_secret.as_str());

        let grant = self.token_request(&params).await?;
        let access_token = grant
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                StorageError::remote(
                    RemoteReason::AccessTokenMissing,
                    "token endpoint returned no access token",
                )
            })?;

        let account_name = resolver.account_name_from_token(access_token).await?;

        let mut account = Account::new(self.provider, &account_name);
        account.apply_token_grant(&grant, self.clock.now());
        self.store.save(&account).await?;

        info!(account = %account_name, "authorization code exchanged, account created");
        Ok(account)
    }

    /// Refresh the primary access token, unconditionally.
    ///
    /// On success the grant is merged into the stored account (only non-empty
    /// returned fields overwrite) and persisted. An explicit `invalid_grant`
    /// from the provider maps to [`StorageError::Oauth`] and leaves the
    /// stored account untouched.
    #[instrument(skip(self), fields(provider = %self.provider))]
    pub async fn refresh(&self, account_name: &str) -> Result<Account> {
        let mut account = self.account(account_name).await?;
        let refresh_token = account.refresh_token.clone().ok_or_else(|| {
            StorageError::Oauth(crate::error::OauthReason::InvalidGrant)
        })?;
        let keys = self.keys()?;

        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token.as_str());
        params.insert("client_id", keys.client_id.as_str());
        params.insert("client_secret", keys.client_secret.as_str());

        let body = serde_urlencoded::to_string(&params).map_err(|e| {
            StorageError::Configuration(format!("failed to encode token request: {}", e))
        })?;
        let request =
            HttpRequest::new(HttpMethod::Post, self.endpoints.token_url.clone()).form(body);

        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            if error::is_invalid_grant(response.status, &response.body) {
                warn!(account = %account_name, "refresh token no longer accepted");
                return Err(StorageError::Oauth(crate::error::OauthReason::InvalidGrant));
            }
            return Err(error::classify_response(response.status, &response.body));
        }

        let grant: TokenResponse = response.json().map_err(|e| {
            StorageError::Transport(format!("failed to parse token response: {}", e))
        })?;

        account.apply_token_grant(&grant, self.clock.now());
        self.store.save(&account).await?;
        debug!(account = %account_name, "access token refreshed");
        Ok(account)
    }

    /// Return a stored account with a currently valid access token.
    ///
    /// The stored account is returned as-is while its expiry instant lies in
    /// the future; otherwise exactly one refresh is performed. Never loops.
    pub async fn refreshed_account(&self, account_name: &str) -> Result<Account> {
        let account = self.account(account_name).await?;
        if !account.is_access_token_expired(self.clock.now()) {
            return Ok(account);
        }
        self.refresh(account_name).await
    }

    /// Best-effort token revocation at the provider.
    ///
    /// Remote failure must never block local account removal, so every
    /// provider-side error is logged and swallowed. Providers without a
    /// revocation endpoint make this a no-op.
    #[instrument(skip(self), fields(provider = %self.provider))]
    pub async fn revoke(&self, account_name: &str) -> Result<()> {
        let revoke_url = match &self.endpoints.revoke_url {
            Some(url) => url.clone(),
            None => return Ok(()),
        };
        let account = self.account(account_name).await?;
        let token = match account.access_token {
            Some(token) => token,
            None => return Ok(()),
        };

        let mut params = HashMap::new();
        params.insert("token", token.as_str());
        let body = serde_urlencoded::to_string(&params).map_err(|e| {
            StorageError::Configuration(format!("failed to encode revoke request: {}", e))
        })?;
        let request = HttpRequest::new(HttpMethod::Post, revoke_url).form(body);

        match self.http_client.execute(request).await {
            Ok(response) if response.is_success() => {
                debug!(account = %account_name, "token revoked")
            }
            Ok(response) => {
                warn!(account = %account_name, status = response.status, "token revocation rejected, continuing")
            }
            Err(e) => warn!(account = %account_name, error = %e, "token revocation failed, continuing"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::MemoryAccountStore;
    use bridge_traits::{BridgeError, HttpResponse, StaticAppKeys};
    use bytes::Bytes;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    /// HTTP fake that pops scripted responses and records every request.
    #[derive(Default)]
    struct ScriptedHttpClient {
        responses: Mutex<Vec<HttpResponse>>,
        requests: Mutex<Vec<HttpRequest>>,
        calls: AtomicUsize,
    }

    impl ScriptedHttpClient {
        fn with_response(status: u16, body: &str) -> Self {
            let client = Self::default();
            client.enqueue(status, body);
            client
        }

        fn enqueue(&self, status: u16, body: &str) {
            let mut responses = self.responses.lock().unwrap();
            responses.insert(
                0,
                HttpResponse {
                    status,
                    headers: HashMap::new(),
                    body: Bytes::from(body.to_string()),
                },
            );
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_request_body(&self) -> String {
            let requests = self.requests.lock().unwrap();
            let body = requests.last().and_then(|r| r.body.clone()).unwrap();
            String::from_utf8(body.to_vec()).unwrap()
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedHttpClient {
        async fn execute(
            &self,
            request: HttpRequest,
        ) -> std::result::Result<HttpResponse, BridgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| BridgeError::OperationFailed("no scripted response".to_string()))
        }
    }

    struct FixedIdentity(&'static str);

    #[async_trait]
    impl IdentityResolver for FixedIdentity {
        async fn account_name_from_token(&self, _access_token: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn endpoints() -> OauthEndpoints {
        OauthEndpoints {
            authorize_url: "https://provider.test/oauth/auth".to_string(),
            token_url: "https://provider.test/oauth/token".to_string(),
            revoke_url: None,
            scope: "usage.r,account.r,credentials.r".to_string(),
        }
    }

    fn keys() -> Arc<StaticAppKeys> {
        Arc::new(StaticAppKeys::new().with_keys(
            "hubic",
            AppKeys {
                client_id: "cid".to_string(),
                client_secret: "s3cr3t-value".to_string(),
                redirect_uri: "http://localhost/callback".to_string(),
            },
        ))
    }

    fn manager(
        http: Arc<ScriptedHttpClient>,
        store: Arc<MemoryAccountStore>,
        now: DateTime<Utc>,
    ) -> CredentialManager {
        CredentialManager::new(
            ProviderKind::Hubic,
            endpoints(),
            http,
            keys(),
            store,
            Arc::new(FixedClock(now)),
        )
    }

    async fn store_with_account(
        access: &str,
        refresh: &str,
        expires_at: DateTime<Utc>,
    ) -> Arc<MemoryAccountStore> {
        let store = Arc::new(MemoryAccountStore::new());
        let mut account = Account::new(ProviderKind::Hubic, "user@example.com");
        account.access_token = Some(access.to_string());
        account.refresh_token = Some(refresh.to_string());
        account.token_expires_at = Some(expires_at);
        store.save(&account).await.unwrap();
        store
    }

    #[test]
    fn test_authorize_url_contains_required_parameters() {
        let http = Arc::new(ScriptedHttpClient::default());
        let manager = manager(http, Arc::new(MemoryAccountStore::new()), at(0));

        let url = manager.authorize_url(Some("user@example.com")).unwrap();
        assert!(url.starts_with("https://provider.test/oauth/auth?"));
        assert!(url.contains("client_id=cid"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("state="));
        assert!(url.contains("login_hint=user%40example.com"));
    }

    #[test]
    fn test_authorize_url_without_keys_is_configuration_error() {
        let manager = CredentialManager::new(
            ProviderKind::Hubic,
            endpoints(),
            Arc::new(ScriptedHttpClient::default()),
            Arc::new(StaticAppKeys::new()),
            Arc::new(MemoryAccountStore::new()),
            Arc::new(FixedClock(at(0))),
        );
        assert!(matches!(
            manager.authorize_url(None),
            Err(StorageError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_exchange_code_creates_and_persists_account() {
        let http = Arc::new(ScriptedHttpClient::with_response(
            200,
            r#"{"access_token":"a1","refresh_token":"r1","expires_in":3600}"#,
        ));
        let store = Arc::new(MemoryAccountStore::new());
        let manager = manager(http.clone(), store.clone(), at(100));

        let mut params = HashMap::new();
        params.insert("code".to_string(), "the-code".to_string());
        let account = manager
            .exchange_authorization_code(&params, &FixedIdentity("user@example.com"))
            .await
            .unwrap();

        assert_eq!(account.account_name, "user@example.com");
        assert_eq!(account.access_token.as_deref(), Some("a1"));
        assert_eq!(account.token_expires_at, Some(at(3700)));

        let body = http.last_request_body();
        assert!(body.contains("grant_type=authorization_code"));
        assert!(body.contains("code=the-code"));

        let stored = store
            .load(ProviderKind::Hubic, "user@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_exchange_with_stale_code_is_remote_error_not_reauth_signal() {
        // A one-time code that has already been spent comes back as
        // invalid_grant too, but only a dead refresh token means
        // re-authorization.
        let http = Arc::new(ScriptedHttpClient::with_response(
            400,
            r#"{"error":"invalid_grant","error_description":"code already used"}"#,
        ));
        let store = Arc::new(MemoryAccountStore::new());
        let manager = manager(http, store.clone(), at(0));

        let mut params = HashMap::new();
        params.insert("code".to_string(), "spent-code".to_string());
        let err = manager
            .exchange_authorization_code(&params, &FixedIdentity("user@example.com"))
            .await
            .unwrap_err();

        assert!(!err.is_invalid_grant());
        assert!(matches!(err, StorageError::Remote { .. }));
        // No account record came out of the failed exchange
        assert!(store
            .load(ProviderKind::Hubic, "user@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_exchange_code_resolves_name_from_issued_token() {
        let http = Arc::new(ScriptedHttpClient::with_response(
            200,
            r#"{"access_token":"issued-token","expires_in":60}"#,
        ));
        let store = Arc::new(MemoryAccountStore::new());
        let manager = manager(http, store, at(0));

        let mut resolver = MockIdentityResolver::new();
        resolver
            .expect_account_name_from_token()
            .withf(|token| token == "issued-token")
            .times(1)
            .returning(|_| Ok("resolved@example.com".to_string()));

        let mut params = HashMap::new();
        params.insert("code".to_string(), "c".to_string());
        let account = manager
            .exchange_authorization_code(&params, &resolver)
            .await
            .unwrap();
        assert_eq!(account.account_name, "resolved@example.com");
    }

    #[tokio::test]
    async fn test_refreshed_account_skips_refresh_while_token_is_valid() {
        let store = store_with_account("valid", "r1", at(1000)).await;
        let http = Arc::new(ScriptedHttpClient::default());
        let manager = manager(http.clone(), store, at(999));

        let account = manager.refreshed_account("user@example.com").await.unwrap();
        assert_eq!(account.access_token.as_deref(), Some("valid"));
        assert_eq!(http.call_count(), 0);
    }

    #[tokio::test]
    async fn test_refreshed_account_refreshes_exactly_once_when_expired() {
        let store = store_with_account("stale", "r1", at(1000)).await;
        let http = Arc::new(ScriptedHttpClient::with_response(
            200,
            r#"{"access_token":"fresh","expires_in":3600}"#,
        ));
        let manager = manager(http.clone(), store.clone(), at(1000));

        let account = manager.refreshed_account("user@example.com").await.unwrap();
        assert_eq!(account.access_token.as_deref(), Some("fresh"));
        assert_eq!(http.call_count(), 1);
        // Omitted refresh token survives the merge
        assert_eq!(account.refresh_token.as_deref(), Some("r1"));

        let stored = store
            .load(ProviderKind::Hubic, "user@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("fresh"));
        assert_eq!(stored.token_expires_at, Some(at(4600)));
    }

    #[tokio::test]
    async fn test_invalid_grant_leaves_stored_account_untouched() {
        let store = store_with_account("stale", "dead-refresh", at(1000)).await;
        let http = Arc::new(ScriptedHttpClient::with_response(
            400,
            r#"{"error":"invalid_grant","error_description":"revoked"}"#,
        ));
        let manager = manager(http, store.clone(), at(2000));

        let err = manager
            .refreshed_account("user@example.com")
            .await
            .unwrap_err();
        assert!(err.is_invalid_grant());

        let stored = store
            .load(ProviderKind::Hubic, "user@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("stale"));
        assert_eq!(stored.refresh_token.as_deref(), Some("dead-refresh"));
        assert_eq!(stored.token_expires_at, Some(at(1000)));
    }

    #[tokio::test]
    async fn test_refresh_server_error_is_classified_not_invalid_grant() {
        let store = store_with_account("stale", "r1", at(1000)).await;
        let http = Arc::new(ScriptedHttpClient::with_response(503, "overloaded"));
        let manager = manager(http, store, at(2000));

        let err = manager.refresh("user@example.com").await.unwrap_err();
        assert!(!err.is_invalid_grant());
        assert!(matches!(err, StorageError::Remote { .. }));
    }

    #[tokio::test]
    async fn test_unknown_account_is_account_not_found() {
        let http = Arc::new(ScriptedHttpClient::default());
        let manager = manager(http, Arc::new(MemoryAccountStore::new()), at(0));

        let err = manager.refreshed_account("nobody@example.com").await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Remote {
                reason: RemoteReason::AccountNotFound,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_revoke_without_endpoint_is_a_no_op() {
        let store = store_with_account("tok", "r1", at(1000)).await;
        let http = Arc::new(ScriptedHttpClient::default());
        let manager = manager(http.clone(), store, at(0));

        manager.revoke("user@example.com").await.unwrap();
        assert_eq!(http.call_count(), 0);
    }

    #[tokio::test]
    async fn test_revoke_swallows_remote_failure() {
        let store = store_with_account("tok", "r1", at(1000)).await;
        let http = Arc::new(ScriptedHttpClient::with_response(500, "boom"));
        let mut endpoints = endpoints();
        endpoints.revoke_url = Some("https://provider.test/oauth/revoke".to_string());
        let manager = CredentialManager::new(
            ProviderKind::Hubic,
            endpoints,
            http.clone(),
            keys(),
            store,
            Arc::new(FixedClock(at(0))),
        );

        manager.revoke("user@example.com").await.unwrap();
        assert_eq!(http.call_count(), 1);
    }
}
