//! # Host Bridge Traits
//!
//! Capability traits that the remote-storage core depends on but does not
//! implement itself.
//!
//! ## Overview
//!
//! This crate defines the contract between the storage core and its host:
//! the HTTP transport, app-key provisioning, progress/cancellation reporting,
//! and the time source. Each trait represents a capability the host must
//! provide; the core treats them as injected `Arc<dyn Trait>` dependencies
//! rather than ambient globals, which keeps every component independently
//! testable with fakes.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - execute a structured API call and get
//!   a structured response or a transport failure
//! - [`AppKeyProvider`](keys::AppKeyProvider) - client id/secret/redirect-uri
//!   lookup per provider
//! - [`ProgressListener`](progress::ProgressListener) - progress reporting,
//!   user-initiated pause, and cooperative cancellation
//! - [`Clock`](time::Clock) - time source for deterministic expiry testing
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Host
//! implementations should convert platform-specific errors to `BridgeError`
//! and include enough context to act on (URL, status, key name).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across
//! worker tasks; many accounts may sync concurrently on top of one transport.

pub mod error;
pub mod http;
pub mod keys;
pub mod progress;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use keys::{AppKeyProvider, AppKeys, StaticAppKeys};
pub use progress::ProgressListener;
pub use time::{Clock, SystemClock};
