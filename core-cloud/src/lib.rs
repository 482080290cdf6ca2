//! # Remote Storage Core
//!
//! Uniform document/account abstraction over heterogeneous cloud-storage
//! backends, so higher layers (encryption, local caching, UI) can synchronize
//! files without knowing which provider is in play.
//!
//! ## Overview
//!
//! The crate provides:
//!
//! - [`Account`](account::Account) - one authenticated connection to one
//!   provider, with primary OAuth2 tokens and an optional secondary credential
//!   tier, persisted through the [`AccountStore`](account::AccountStore)
//!   collaborator
//! - [`CredentialManager`](credentials::CredentialManager) - the OAuth2
//!   lifecycle: authorize URL, code exchange, refresh, expiry-gated
//!   `refreshed_account`
//! - [`RemoteDocument`](document::RemoteDocument) - files and (possibly
//!   virtual) folders in a provider namespace
//! - [`ChangeCollector`](changes::ChangeCollector) - turns a provider's
//!   recursive listing into a normalized, ordered change feed with progress
//!   reporting and cooperative cancellation
//! - [`RemoteStorage`](storage::RemoteStorage) - the polymorphic per-provider
//!   contract, with a [`StorageRegistry`](storage::StorageRegistry) mapping
//!   provider tags to variant instances
//! - [`StorageError`](error::StorageError) - the closed error taxonomy,
//!   classified once at the transport boundary and re-thrown unchanged above
//!
//! ## Error Handling
//!
//! Classification happens as close to the transport as possible
//! ([`error::classify_response`]); every higher component propagates the
//! classified error with `?`. The one deliberate exception: delete paths
//! swallow `Remote { NotFound }` to make deletion idempotent.

pub mod account;
pub mod changes;
pub mod credentials;
pub mod document;
pub mod error;
pub mod oauth;
pub mod storage;

pub use account::{Account, AccountStore, MemoryAccountStore, ProviderKind};
pub use changes::{ChangeCollector, RemoteChange, RemoteChangeKind, RemoteChanges};
pub use credentials::{CredentialManager, IdentityResolver, OauthEndpoints};
pub use document::RemoteDocument;
pub use oauth::{request_state_token, TokenResponse};
pub use error::{OauthReason, RemoteReason, Result, StorageError};
pub use storage::{RemoteStorage, StorageRegistry};

/// Name of the application folder under every account root.
pub const APP_FOLDER_NAME: &str = "CloudVault";

/// Conventionally named file standing in for a virtual folder.
///
/// Flat object stores have no real directories; a folder "exists" when this
/// marker entry exists under its path, and deleting the folder means deleting
/// the marker.
pub const FOLDER_METADATA_FILE_NAME: &str = ".metadata";
