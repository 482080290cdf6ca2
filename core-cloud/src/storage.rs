//! The polymorphic per-provider storage contract and its registry.
//!
//! Every provider variant implements [`RemoteStorage`]; callers select a
//! variant through the [`StorageRegistry`] by provider tag and drive the
//! whole account/document lifecycle through the trait without knowing which
//! provider is in play.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::ProgressListener;

use crate::account::{Account, ProviderKind};
use crate::changes::RemoteChanges;
use crate::document::RemoteDocument;
use crate::error::{Result, StorageError};

/// The fixed operation set every provider variant supports.
///
/// All document operations address documents by (account name, path). Errors
/// carry the classified taxonomy of [`crate::error::StorageError`]; the only
/// operations that swallow a remote error are the delete pair, which treat
/// an absent target as success.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// The provider this variant talks to.
    fn provider(&self) -> ProviderKind;

    /// User-facing authorization URL with a fresh anti-forgery state token.
    ///
    /// `mobile` selects the provider's mobile authorization page where one
    /// exists; providers without the distinction ignore it.
    fn authorize_url(&self, mobile: bool, login_hint: Option<&str>) -> Result<String>;

    /// Exchange the authorization-callback parameters for tokens and create
    /// the account.
    async fn exchange_authorization_code(
        &self,
        response_parameters: &HashMap<String, String>,
    ) -> Result<Account>;

    /// Stable account name behind an access token, from the provider's
    /// identity endpoint.
    async fn account_name_from_token(&self, access_token: &str) -> Result<String>;

    /// Refresh the primary access token, unconditionally, and persist.
    async fn refresh_token(&self, account_name: &str) -> Result<Account>;

    /// Best-effort revocation; remote failure never blocks local removal.
    async fn revoke_token(&self, account_name: &str) -> Result<()>;

    /// Read current quota from the provider and persist it on the account.
    async fn refresh_quota(&self, account_name: &str) -> Result<Account>;

    /// The account's root folder (empty path).
    fn root_folder(&self, account_name: &str) -> RemoteDocument;

    /// The fixed application folder under the root.
    fn app_folder(&self, account_name: &str) -> RemoteDocument;

    /// Current metadata of the document at `path`.
    async fn document(&self, account_name: &str, path: &str) -> Result<RemoteDocument>;

    /// The folder at `path`, or `None` when no such folder exists.
    ///
    /// Absence is an answer here, not an error.
    async fn folder(&self, account_name: &str, path: &str) -> Result<Option<RemoteDocument>>;

    /// Current metadata of the file at `path`.
    async fn file(&self, account_name: &str, path: &str) -> Result<RemoteDocument>;

    /// Changes under the application folder since `last_change_id`.
    ///
    /// `None` means full resync. The returned cursor feeds the next call.
    async fn changes(
        &self,
        account_name: &str,
        last_change_id: Option<&str>,
        listener: Option<&dyn ProgressListener>,
    ) -> Result<RemoteChanges>;

    /// Delete the file at `path`. Deleting an absent file succeeds.
    async fn delete_file(&self, account_name: &str, path: &str) -> Result<()>;

    /// Delete the folder at `path`. Deleting an absent folder succeeds.
    async fn delete_folder(&self, account_name: &str, path: &str) -> Result<()>;
}

/// Maps provider tags to their [`RemoteStorage`] variants.
#[derive(Default)]
pub struct StorageRegistry {
    storages: HashMap<ProviderKind, Arc<dyn RemoteStorage>>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider variant, replacing any previous one for the same
    /// provider.
    pub fn register(&mut self, storage: Arc<dyn RemoteStorage>) {
        self.storages.insert(storage.provider(), storage);
    }

    /// The variant for a provider, failing when none is registered.
    pub fn storage(&self, provider: ProviderKind) -> Result<Arc<dyn RemoteStorage>> {
        self.storages.get(&provider).cloned().ok_or_else(|| {
            StorageError::Configuration(format!(
                "no storage registered for provider {}",
                provider.as_str()
            ))
        })
    }

    /// Look a variant up by its stable tag string.
    pub fn storage_by_tag(&self, tag: &str) -> Result<Arc<dyn RemoteStorage>> {
        let provider = ProviderKind::parse(tag).ok_or_else(|| {
            StorageError::Configuration(format!("unknown provider tag {}", tag))
        })?;
        self.storage(provider)
    }

    /// Registered providers.
    pub fn providers(&self) -> Vec<ProviderKind> {
        self.storages.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullStorage;

    #[async_trait]
    impl RemoteStorage for NullStorage {
        fn provider(&self) -> ProviderKind {
            ProviderKind::Hubic
        }

        fn authorize_url(&self, _mobile: bool, _login_hint: Option<&str>) -> Result<String> {
            Ok("https://provider.test/auth".to_string())
        }

        async fn exchange_authorization_code(
            &self,
            _response_parameters: &HashMap<String, String>,
        ) -> Result<Account> {
            Err(StorageError::Configuration("not implemented".to_string()))
        }

        async fn account_name_from_token(&self, _access_token: &str) -> Result<String> {
            Ok("user@example.com".to_string())
        }

        async fn refresh_token(&self, _account_name: &str) -> Result<Account> {
            Err(StorageError::Configuration("not implemented".to_string()))
        }

        async fn revoke_token(&self, _account_name: &str) -> Result<()> {
            Ok(())
        }

        async fn refresh_quota(&self, _account_name: &str) -> Result<Account> {
            Err(StorageError::Configuration("not implemented".to_string()))
        }

        fn root_folder(&self, account_name: &str) -> RemoteDocument {
            RemoteDocument::root_folder(account_name)
        }

        fn app_folder(&self, account_name: &str) -> RemoteDocument {
            RemoteDocument::app_folder(account_name)
        }

        async fn document(&self, _account_name: &str, path: &str) -> Result<RemoteDocument> {
            Err(StorageError::not_found(path.to_string()))
        }

        async fn folder(
            &self,
            _account_name: &str,
            _path: &str,
        ) -> Result<Option<RemoteDocument>> {
            Ok(None)
        }

        async fn file(&self, _account_name: &str, path: &str) -> Result<RemoteDocument> {
            Err(StorageError::not_found(path.to_string()))
        }

        async fn changes(
            &self,
            _account_name: &str,
            last_change_id: Option<&str>,
            _listener: Option<&dyn ProgressListener>,
        ) -> Result<RemoteChanges> {
            Ok(RemoteChanges {
                changes: Vec::new(),
                last_change_id: last_change_id.map(str::to_string),
                full_resync: true,
            })
        }

        async fn delete_file(&self, _account_name: &str, _path: &str) -> Result<()> {
            Ok(())
        }

        async fn delete_folder(&self, _account_name: &str, _path: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_lookup_by_provider_and_tag() {
        let mut registry = StorageRegistry::new();
        registry.register(Arc::new(NullStorage));

        assert!(registry.storage(ProviderKind::Hubic).is_ok());
        assert!(registry.storage_by_tag("hubic").is_ok());
        assert_eq!(registry.providers(), vec![ProviderKind::Hubic]);
    }

    #[test]
    fn test_unknown_tag_is_configuration_error() {
        let registry = StorageRegistry::new();
        assert!(matches!(
            registry.storage_by_tag("dropbox"),
            Err(StorageError::Configuration(_))
        ));
        assert!(matches!(
            registry.storage(ProviderKind::Hubic),
            Err(StorageError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_trait_is_object_safe() {
        let storage: Arc<dyn RemoteStorage> = Arc::new(NullStorage);
        let root = storage.root_folder("acc");
        assert!(root.is_folder);
        assert!(storage.folder("acc", "x").await.unwrap().is_none());
    }
}
