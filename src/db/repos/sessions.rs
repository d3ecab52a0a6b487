use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{db::error::DbResult, models::Session};

#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn create(&self, session: &Session) -> DbResult<()>;

    /// Exact-match lookup by token hash.
    async fn get_by_token_hash(&self, token_hash: &str) -> DbResult<Option<Session>>;

    /// Best-effort activity timestamp update; callers dispatch this off the
    /// request path and swallow errors.
    async fn touch_last_active(&self, id: Uuid, at: DateTime<Utc>) -> DbResult<()>;

    /// Hard-delete by token hash. Returns the number of rows removed.
    async fn delete_by_token_hash(&self, token_hash: &str) -> DbResult<u64>;

    /// Hard-delete every session for an account (security events, logout).
    async fn delete_all_for_account(&self, account_id: Uuid) -> DbResult<u64>;

    /// Remove sessions whose expiry is in the past.
    async fn delete_expired(&self, now: DateTime<Utc>) -> DbResult<u64>;
}
