//! HubiC and OpenStack API response types.
//!
//! Data structures for deserializing HubiC REST API and OpenStack object
//! listing responses, plus the timestamp parsing both need.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

/// HubiC `/account` response, used to resolve the account name.
#[derive(Debug, Clone, Deserialize)]
pub struct HubicAccountInfo {
    /// Email address, the stable account identifier
    pub email: String,
}

/// HubiC `/account/usage` response.
#[derive(Debug, Clone, Deserialize)]
pub struct HubicAccountUsage {
    /// Bytes currently used
    pub used: u64,
    /// Total quota in bytes
    pub quota: u64,
}

/// HubiC `/account/credentials` response: the OpenStack credential grant.
#[derive(Debug, Clone, Deserialize)]
pub struct HubicOpenStackCredentials {
    /// OpenStack access token
    pub token: Option<String>,
    /// Full storage endpoint URL, account segment included
    pub endpoint: Option<String>,
    /// Expiry instant, RFC 3339 with offset
    pub expires: Option<String>,
}

/// One entry of an OpenStack container listing (`format=json`).
#[derive(Debug, Clone, Deserialize)]
pub struct OpenStackObject {
    /// Object path within the container
    pub name: String,
    /// Size in bytes
    #[serde(default)]
    pub bytes: u64,
    /// Content hash, used as the version tag
    pub hash: Option<String>,
    /// Modification time, naive UTC (`2016-01-15T16:41:49.390270`)
    pub last_modified: Option<String>,
}

/// Parse an RFC 3339 instant (HubiC credential expiry) to UTC.
pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an OpenStack `last_modified` value to epoch milliseconds.
///
/// The listing carries naive timestamps that are UTC by convention.
pub fn parse_last_modified(value: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().timestamp_millis())
}
