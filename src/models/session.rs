use base64::Engine;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Prefix on every session token. Lets log scrubbers and secret scanners
/// recognize leaked tokens.
pub const SESSION_TOKEN_PREFIX: &str = "qg_sess_";

/// Maximum stored length for request metadata fields (user agent, IP).
const SESSION_META_MAX_LENGTH: usize = 512;

/// Generate a new session token.
///
/// Returns a tuple of (raw_token, token_hash) where:
/// - raw_token is handed to the client exactly once and never stored
/// - token_hash is the SHA-256 hex digest persisted in the sessions table
pub fn generate_session_token() -> (String, String) {
    // 32 random bytes (256 bits of entropy)
    let mut rng = rand::thread_rng();
    let mut random_bytes = [0u8; 32];
    rng.fill(&mut random_bytes);

    let random_part = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes);
    let raw_token = format!("{}{}", SESSION_TOKEN_PREFIX, random_part);
    let token_hash = hash_session_token(&raw_token);

    (raw_token, token_hash)
}

/// Hash a session token for storage, SHA-256 hex.
pub fn hash_session_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify a presented token against a stored hash in constant time.
///
/// Lookup is by exact hash match, but the comparison is still constant-time
/// so a backend that degrades to scans cannot leak hash prefixes through
/// timing.
pub fn verify_session_token(raw_token: &str, stored_hash: &str) -> bool {
    let computed = hash_session_token(raw_token);
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

/// Constant-time check that a presented token carries the session prefix.
///
/// Operates on bytes so an arbitrary (possibly non-ASCII) cookie value can
/// never panic on a char boundary.
pub fn has_token_prefix(token: &str) -> bool {
    let token = token.as_bytes();
    if token.len() < SESSION_TOKEN_PREFIX.len() {
        return false;
    }
    token[..SESSION_TOKEN_PREFIX.len()]
        .ct_eq(SESSION_TOKEN_PREFIX.as_bytes())
        .into()
}

/// Truncate a metadata string to a maximum byte length on a char boundary.
fn truncate_meta_field(value: String, max_len: usize) -> String {
    if value.len() <= max_len {
        return value;
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    value[..end].to_string()
}

/// An application session row. Only the token hash is persisted; the raw
/// token exists in the client cookie and in memory during creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub account_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Check if the session has expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Request metadata captured at session creation.
#[derive(Debug, Clone, Default)]
pub struct SessionMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl SessionMeta {
    /// Build metadata with string fields truncated to safe lengths.
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address,
            user_agent: user_agent.map(|s| truncate_meta_field(s, SESSION_META_MAX_LENGTH)),
        }
    }
}

/// A record of an IdP-backed login, keyed by (account, team, SessionIndex).
///
/// Tracked separately from application sessions so one IdP logout can fan
/// out to everything tied to that login, independent of local session
/// lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoSession {
    pub id: Uuid,
    pub account_id: Uuid,
    pub team_id: Uuid,
    pub idp_session_index: Option<String>,
    pub created_at: DateTime<Utc>,
}
