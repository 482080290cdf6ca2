//! OAuth2 wire types and CSRF-token generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use serde::Deserialize;

/// Token endpoint response, for both code exchange and refresh grants.
///
/// Every field is optional: providers routinely omit unchanged fields on
/// refresh, and the merge into the stored account only overwrites from
/// non-empty values.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, relative to the moment the response was received
    pub expires_in: Option<i64>,
    pub token_type: Option<String>,
}

/// Generate an anti-forgery state token for the authorization URL.
///
/// 16 random bytes, URL-safe base64 without padding.
pub fn request_state_token() -> String {
    let mut state_bytes = [0u8; 16];
    rand::thread_rng().fill(&mut state_bytes);
    URL_SAFE_NO_PAD.encode(state_bytes)
}
