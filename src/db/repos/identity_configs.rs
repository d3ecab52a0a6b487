use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{TeamIdentityConfig, UpsertTeamIdentityConfig},
};

#[async_trait]
pub trait IdentityConfigRepo: Send + Sync {
    async fn get_by_team(&self, team_id: Uuid) -> DbResult<Option<TeamIdentityConfig>>;

    /// Create or replace the team's configuration (one active config per
    /// team). The input has already passed `validator` checks.
    async fn upsert(
        &self,
        team_id: Uuid,
        input: UpsertTeamIdentityConfig,
    ) -> DbResult<TeamIdentityConfig>;

    /// Delete the team's configuration. `DbError::NotFound` when none exists.
    async fn delete(&self, team_id: Uuid) -> DbResult<()>;
}
