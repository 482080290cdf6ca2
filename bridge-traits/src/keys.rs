//! App-Key Provisioning
//!
//! OAuth client credentials are provisioned outside the core (build-time
//! secrets, a config file, a platform keystore). The core only needs a
//! lookup it can fail on when a provider's keys are absent.

use std::collections::HashMap;

/// OAuth application credentials for one provider.
#[derive(Clone, PartialEq, Eq)]
pub struct AppKeys {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Redirect URI registered with the provider
    pub redirect_uri: String,
}

// Keep the secret out of logs
impl std::fmt::Debug for AppKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppKeys")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// App-key lookup capability.
///
/// Returns `None` when no keys are configured for the provider tag; the core
/// turns that into its configuration error.
pub trait AppKeyProvider: Send + Sync {
    fn app_keys(&self, provider: &str) -> Option<AppKeys>;
}

/// Map-backed [`AppKeyProvider`] for embedders and tests.
#[derive(Debug, Default)]
pub struct StaticAppKeys {
    keys: HashMap<String, AppKeys>,
}

impl StaticAppKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(mut self, provider: impl Into<String>, keys: AppKeys) -> Self {
        self.keys.insert(provider.into(), keys);
        self
    }
}

impl AppKeyProvider for StaticAppKeys {
    fn app_keys(&self, provider: &str) -> Option<AppKeys> {
        self.keys.get(provider).cloned()
    }
}
