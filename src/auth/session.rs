//! Application session lifecycle.
//!
//! Sessions are bearer tokens: a random token handed to the client once,
//! with only its SHA-256 hash persisted. Validation is read-mostly and fails
//! closed: a storage error is "not authenticated", never a crash and never
//! a pass.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::AuthError;
use crate::{
    config::SessionConfig,
    db::SessionRepo,
    models::{Session, SessionMeta, generate_session_token, has_token_prefix,
             hash_session_token, verify_session_token},
};

pub struct SessionManager {
    sessions: Arc<dyn SessionRepo>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(sessions: Arc<dyn SessionRepo>, config: SessionConfig) -> Self {
        Self { sessions, config }
    }

    /// Create a session for an account.
    ///
    /// Returns the raw token exactly once; it is never retrievable again.
    pub async fn create_session(
        &self,
        account_id: Uuid,
        meta: SessionMeta,
    ) -> Result<(String, Session), AuthError> {
        let (raw_token, token_hash) = generate_session_token();
        let now = Utc::now();

        let session = Session {
            id: Uuid::new_v4(),
            account_id,
            token_hash,
            expires_at: now + chrono::Duration::seconds(self.config.duration_secs as i64),
            last_active_at: now,
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
            created_at: now,
        };

        self.sessions.create(&session).await?;

        tracing::debug!(
            session_id = %session.id,
            account_id = %account_id,
            expires_at = %session.expires_at,
            "Session created"
        );

        Ok((raw_token, session))
    }

    /// Validate a presented token.
    ///
    /// Returns `None` for unknown, expired, or malformed tokens AND for any
    /// storage failure. Expired rows are deleted opportunistically. On
    /// success the `last_active_at` touch is dispatched off the request path
    /// and its outcome only logged.
    pub async fn validate_session(&self, raw_token: &str) -> Option<Session> {
        if !has_token_prefix(raw_token) {
            return None;
        }

        let token_hash = hash_session_token(raw_token);

        let session = match self.sessions.get_by_token_hash(&token_hash).await {
            Ok(Some(session)) => session,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Session lookup failed; treating as invalid");
                return None;
            }
        };

        if session.is_expired() {
            let _ = self.sessions.delete_by_token_hash(&token_hash).await;
            return None;
        }

        // Lookup is by exact hash, but compare in constant time anyway so a
        // backend that degrades to scans cannot leak timing.
        if !verify_session_token(raw_token, &session.token_hash) {
            return None;
        }

        // Best-effort activity touch, rate-limited and off the request path.
        let now = Utc::now();
        let elapsed = (now - session.last_active_at).num_seconds();
        if elapsed >= self.config.touch_interval_secs as i64 {
            let sessions = Arc::clone(&self.sessions);
            let session_id = session.id;
            tokio::spawn(async move {
                if let Err(e) = sessions.touch_last_active(session_id, now).await {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %e,
                        "Failed to update session last_active_at"
                    );
                }
            });
        }

        Some(session)
    }

    /// Invalidate a single session by its raw token.
    pub async fn invalidate_session(&self, raw_token: &str) -> Result<u64, AuthError> {
        let token_hash = hash_session_token(raw_token);
        Ok(self.sessions.delete_by_token_hash(&token_hash).await?)
    }

    /// Invalidate every session for an account. Used on logout and security
    /// events (password reset, IdP-initiated logout).
    pub async fn invalidate_all_for_account(&self, account_id: Uuid) -> Result<u64, AuthError> {
        let count = self.sessions.delete_all_for_account(account_id).await?;
        if count > 0 {
            tracing::info!(account_id = %account_id, count, "Invalidated all sessions for account");
        }
        Ok(count)
    }

    /// Remove expired session rows. Called opportunistically; expiry is also
    /// enforced at validation time.
    pub async fn cleanup_expired(&self) -> Result<u64, AuthError> {
        Ok(self.sessions.delete_expired(Utc::now()).await?)
    }
}
