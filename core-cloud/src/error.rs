//! Error taxonomy and transport-boundary classifier.
//!
//! The taxonomy is a closed set: callers match on it to decide between
//! retrying (`Transport`), re-running the authorization flow
//! (`Oauth(InvalidGrant)`), ignoring (`Remote { NotFound }` in delete paths),
//! or surfacing the failure. Classification happens once, where the HTTP
//! response is first seen; everything above re-throws unchanged.

use serde::Deserialize;
use thiserror::Error;

/// Why a provider rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteReason {
    /// The addressed object does not exist.
    NotFound,
    /// The provider rejected the application's client credentials.
    AppKeysNotFound,
    /// An operation needed an access token the account does not hold yet.
    AccessTokenMissing,
    /// No stored account matches the given (provider, account-name) pair.
    AccountNotFound,
    /// The presented token was rejected (401-class).
    Unauthorized,
    /// Any other provider-level rejection.
    Unknown,
}

/// OAuth-protocol failures that change what the caller must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OauthReason {
    /// The refresh token itself is no longer valid; the caller must re-run
    /// the full authorization flow rather than retry.
    InvalidGrant,
}

#[derive(Error, Debug)]
pub enum StorageError {
    /// Missing app keys or malformed static configuration. Fatal, not
    /// retryable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O-level failure talking to the provider. The caller may retry with
    /// backoff; the core never retries itself.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The provider rejected the request.
    #[error("remote error ({reason:?}): {message}")]
    Remote {
        reason: RemoteReason,
        message: String,
    },

    /// OAuth-protocol failure requiring caller action.
    #[error("oauth error ({0:?})")]
    Oauth(OauthReason),

    /// The user or caller requested abort. Not a failure; must not be logged
    /// as one.
    #[error("operation cancelled")]
    Cancelled,

    /// The account store was unavailable. Fatal to the operation.
    #[error("account store error: {0}")]
    Store(String),
}

impl StorageError {
    pub fn remote(reason: RemoteReason, message: impl Into<String>) -> Self {
        StorageError::Remote {
            reason,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::remote(RemoteReason::NotFound, message)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::Remote {
                reason: RemoteReason::NotFound,
                ..
            }
        )
    }

    pub fn is_invalid_grant(&self) -> bool {
        matches!(self, StorageError::Oauth(OauthReason::InvalidGrant))
    }

    /// Only transport failures are safe to blindly retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Transport(_))
    }
}

impl From<bridge_traits::BridgeError> for StorageError {
    fn from(e: bridge_traits::BridgeError) -> Self {
        StorageError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// OAuth-style error payload most providers return on rejection.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

/// Map a non-2xx provider response to a typed error.
///
/// Inspects the provider's error payload shape first and falls back to
/// status-code classification when the payload is absent or unparseable.
/// Always yields a remote error; the `invalid_grant` signal is the refresh
/// path's concern and is detected there with [`is_invalid_grant`].
pub fn classify_response(status: u16, body: &[u8]) -> StorageError {
    if let Ok(parsed) = serde_json::from_slice::<ProviderErrorBody>(body) {
        if let Some(code) = parsed.error.as_deref() {
            let message = parsed
                .error_description
                .clone()
                .unwrap_or_else(|| code.to_string());
            if code == "invalid_client" {
                return StorageError::remote(RemoteReason::AppKeysNotFound, message);
            }
            let reason = match status {
                401 => RemoteReason::Unauthorized,
                404 => RemoteReason::NotFound,
                _ => RemoteReason::Unknown,
            };
            return StorageError::remote(reason, format!("{} (status {})", message, status));
        }
    }

    match status {
        401 => StorageError::remote(
            RemoteReason::Unauthorized,
            format!("request rejected with status {}", status),
        ),
        404 => StorageError::remote(
            RemoteReason::NotFound,
            format!("object not found (status {})", status),
        ),
        _ => StorageError::remote(
            RemoteReason::Unknown,
            format!("request failed with status {}", status),
        ),
    }
}

/// Whether a failed token response explicitly reports a dead refresh grant.
///
/// Gates the refresh path only: an `invalid_grant` on code exchange means a
/// stale authorization code, which is not a re-authorization signal.
pub fn is_invalid_grant(status: u16, body: &[u8]) -> bool {
    if !(400..500).contains(&status) {
        return false;
    }
    serde_json::from_slice::<ProviderErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .map(|code| code == "invalid_grant")
        .unwrap_or(false)
}
