//! Account records and the persistence contract.
//!
//! An [`Account`] is one authenticated connection to one provider for one
//! user identity. The record carries the primary OAuth2 tokens and, for
//! two-tier providers, the secondary credentials derived from them. Accounts
//! are mutated in place by successful refreshes and quota queries and
//! persisted through the external [`AccountStore`] after every mutation that
//! must survive a process restart.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use crate::error::{RemoteReason, Result, StorageError};
use crate::oauth::TokenResponse;

/// Supported cloud storage providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// HubiC (OVH) - OAuth2 plus an OpenStack-style object store tier
    Hubic,
}

impl ProviderKind {
    /// Stable identifier string, used as the registry and app-key lookup tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Hubic => "hubic",
        }
    }

    /// Human-readable display name
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Hubic => "HubiC",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hubic" => Some(ProviderKind::Hubic),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// One authenticated connection to one provider.
///
/// At most one live account exists per (provider, account-name) pair in the
/// store. The access token may be absent only before the first authorization
/// completes.
#[derive(Clone, Serialize, Deserialize)]
pub struct Account {
    /// Owning provider
    pub provider: ProviderKind,
    /// Stable user identifier at the provider (typically an email address)
    pub account_name: String,

    /// Primary OAuth2 access token
    pub access_token: Option<String>,
    /// Absolute instant the access token expires. Stored absolute rather
    /// than as a TTL so repeated checks do not compound clock skew.
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Primary OAuth2 refresh token
    pub refresh_token: Option<String>,

    /// Secondary-tier access token (e.g. OpenStack), where the provider has one
    pub secondary_token: Option<String>,
    /// Absolute expiry instant of the secondary token
    pub secondary_expires_at: Option<DateTime<Utc>>,
    /// Endpoint URL the secondary token is valid against
    pub secondary_endpoint: Option<String>,
    /// Provider-internal account identifier at the secondary endpoint
    pub secondary_account: Option<String>,

    /// Total quota in bytes, when known
    pub quota_total: Option<u64>,
    /// Used quota in bytes, when known
    pub quota_used: Option<u64>,
}

impl Account {
    /// Create an empty record for a (provider, account-name) pair.
    pub fn new(provider: ProviderKind, account_name: impl Into<String>) -> Self {
        Self {
            provider,
            account_name: account_name.into(),
            access_token: None,
            token_expires_at: None,
            refresh_token: None,
            secondary_token: None,
            secondary_expires_at: None,
            secondary_endpoint: None,
            secondary_account: None,
            quota_total: None,
            quota_used: None,
        }
    }

    /// `Authorization` header value for the primary token.
    pub fn auth_header(&self) -> Result<String> {
        let token = self.access_token.as_deref().ok_or_else(|| {
            StorageError::remote(
                RemoteReason::AccessTokenMissing,
                format!("account {} holds no access token", self.account_name),
            )
        })?;
        Ok(format!("Bearer {}", token))
    }

    /// Whether the primary access token must be refreshed before use.
    ///
    /// An account without a token or expiry instant counts as expired.
    pub fn is_access_token_expired(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_none() {
            return true;
        }
        match self.token_expires_at {
            Some(expires_at) => now >= expires_at,
            None => true,
        }
    }

    /// Whether the secondary-tier token must be re-derived before use.
    pub fn is_secondary_token_expired(&self, now: DateTime<Utc>) -> bool {
        if self.secondary_token.is_none() || self.secondary_endpoint.is_none() {
            return true;
        }
        match self.secondary_expires_at {
            Some(expires_at) => now >= expires_at,
            None => true,
        }
    }

    /// Merge a token grant into the record.
    ///
    /// Providers may omit unchanged fields on refresh, so only non-empty
    /// returned fields overwrite the stored ones.
    pub fn apply_token_grant(&mut self, grant: &TokenResponse, now: DateTime<Utc>) {
        if let Some(access_token) = grant
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
        {
            self.access_token = Some(access_token.to_string());
        }
        if let Some(expires_in) = grant.expires_in {
            self.token_expires_at = Some(now + Duration::seconds(expires_in));
        }
        if let Some(refresh_token) = grant
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
        {
            self.refresh_token = Some(refresh_token.to_string());
        }
    }
}

// Keep tokens out of logs
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("provider", &self.provider)
            .field("account_name", &self.account_name)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_expires_at", &self.token_expires_at)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("secondary_token", &self.secondary_token.as_ref().map(|_| "[REDACTED]"))
            .field("secondary_expires_at", &self.secondary_expires_at)
            .field("secondary_endpoint", &self.secondary_endpoint)
            .field("secondary_account", &self.secondary_account)
            .field("quota_total", &self.quota_total)
            .field("quota_used", &self.quota_used)
            .finish()
    }
}

/// External persistence for account records.
///
/// The core calls `save` after every successful token or quota mutation and
/// treats store unavailability as fatal to the operation: implementations map
/// their failures to [`StorageError::Store`], which is propagated, never
/// retried. Deletion of accounts is a collaborator concern; the core never
/// deletes.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn load(&self, provider: ProviderKind, account_name: &str) -> Result<Option<Account>>;

    async fn save(&self, account: &Account) -> Result<()>;

    async fn delete(&self, provider: ProviderKind, account_name: &str) -> Result<()>;
}

/// In-memory [`AccountStore`] for tests and embedders without persistence.
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<(ProviderKind, String), Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn load(&self, provider: ProviderKind, account_name: &str) -> Result<Option<Account>> {
        let accounts = self
            .accounts
            .read()
            .map_err(|_| StorageError::Store("account map poisoned".to_string()))?;
        Ok(accounts
            .get(&(provider, account_name.to_string()))
            .cloned())
    }

    async fn save(&self, account: &Account) -> Result<()> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| StorageError::Store("account map poisoned".to_string()))?;
        accounts.insert(
            (account.provider, account.account_name.clone()),
            account.clone(),
        );
        Ok(())
    }

    async fn delete(&self, provider: ProviderKind, account_name: &str) -> Result<()> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| StorageError::Store("account map poisoned".to_string()))?;
        accounts.remove(&(provider, account_name.to_string()));
        Ok(())
    }
}
