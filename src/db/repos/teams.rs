use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{CreateTeam, MembershipSource, Team, TeamMembership, TeamRole},
};

#[async_trait]
pub trait TeamRepo: Send + Sync {
    async fn create(&self, input: CreateTeam) -> DbResult<Team>;
    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Team>>;
    async fn get_by_slug(&self, slug: &str) -> DbResult<Option<Team>>;

    /// Add a membership row. Returns `DbError::Conflict` when the account is
    /// already a member (the `(team_id, account_id)` primary key).
    async fn add_member(
        &self,
        team_id: Uuid,
        account_id: Uuid,
        role: TeamRole,
        source: MembershipSource,
    ) -> DbResult<()>;

    async fn get_membership(
        &self,
        team_id: Uuid,
        account_id: Uuid,
    ) -> DbResult<Option<TeamMembership>>;

    async fn remove_member(&self, team_id: Uuid, account_id: Uuid) -> DbResult<()>;

    async fn list_members(&self, team_id: Uuid) -> DbResult<Vec<TeamMembership>>;
}
