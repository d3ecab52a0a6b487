use async_trait::async_trait;
use uuid::Uuid;

use crate::{db::error::DbResult, models::SsoSession};

#[async_trait]
pub trait SsoSessionRepo: Send + Sync {
    /// Append-only insert of an IdP-backed login record.
    async fn create(
        &self,
        account_id: Uuid,
        team_id: Uuid,
        idp_session_index: Option<&str>,
    ) -> DbResult<SsoSession>;

    async fn list_by_account(&self, account_id: Uuid) -> DbResult<Vec<SsoSession>>;

    async fn delete_all_for_account(&self, account_id: Uuid) -> DbResult<u64>;
}
