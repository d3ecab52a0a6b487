//! Cookie-carried login state for the SSO redirect round trip.
//!
//! The state binds the callback to the initiation request: which team the
//! login targets, where to return afterwards, and the AuthnRequest ID used
//! for `InResponseTo` replay checks. It is single-use (the callback handler
//! deletes it on consumption) and expires after a short TTL so a
//! stale round trip forces a fresh login.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginState {
    /// Team the login was initiated for
    pub team_id: Uuid,
    pub team_slug: String,
    /// Where to redirect after authentication completes
    #[serde(default)]
    pub return_to: Option<String>,
    /// ID of the AuthnRequest issued at initiation
    pub request_id: String,
    pub created_at: DateTime<Utc>,
}

impl LoginState {
    pub fn new(
        team_id: Uuid,
        team_slug: impl Into<String>,
        return_to: Option<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            team_id,
            team_slug: team_slug.into(),
            return_to,
            request_id: request_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Check whether the state has outlived the configured TTL.
    pub fn is_expired(&self, ttl_secs: u64) -> bool {
        let age = Utc::now() - self.created_at;
        age > chrono::Duration::seconds(ttl_secs as i64)
    }

    /// Serialize into a cookie value (URL-safe base64 over JSON).
    pub fn encode(&self) -> String {
        // Serialization of a plain struct cannot fail
        let json = serde_json::to_vec(self).expect("LoginState serialization");
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a cookie value. Returns `None` for anything malformed;
    /// the caller treats that the same as an absent cookie.
    pub fn decode(value: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(value).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}
