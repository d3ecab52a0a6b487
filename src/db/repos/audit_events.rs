use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{AuditEvent, CreateAuditEvent},
};

#[async_trait]
pub trait AuditEventRepo: Send + Sync {
    async fn create(&self, input: CreateAuditEvent) -> DbResult<AuditEvent>;

    /// Most-recent-first listing for a team.
    async fn list_by_team(&self, team_id: Uuid, limit: i64) -> DbResult<Vec<AuditEvent>>;
}
