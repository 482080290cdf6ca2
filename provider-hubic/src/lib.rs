//! # HubiC Provider
//!
//! [`RemoteStorage`](core_cloud::RemoteStorage) variant for HubiC (OVH).
//!
//! ## Overview
//!
//! HubiC pairs an OAuth2 front (identity, usage, credential derivation) with
//! an OpenStack object store holding the actual data. This crate provides:
//!
//! - [`HubicStorage`] - the storage variant, including the two-tier
//!   credential handling and the single 401 retry
//! - [`OpenStackClient`] - the minimal per-endpoint object-store client
//! - response types for both APIs
//!
//! The object store has no real directories; folders are implied by file
//! paths and materialized through marker entries.

pub mod openstack;
pub mod storage;
pub mod types;

pub use openstack::OpenStackClient;
pub use storage::HubicStorage;
