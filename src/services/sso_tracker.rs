//! Tracks active IdP-backed logins.
//!
//! One row per federated login, keyed by (account, team, IdP SessionIndex).
//! The tracker exists so logout and SLO can fan out to everything tied to an
//! IdP login independently of local session lifecycle.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    db::{DbResult, SsoSessionRepo},
    models::SsoSession,
};

pub struct SsoSessionTracker {
    repo: Arc<dyn SsoSessionRepo>,
}

impl SsoSessionTracker {
    pub fn new(repo: Arc<dyn SsoSessionRepo>) -> Self {
        Self { repo }
    }

    /// Record a federated login. Append-only.
    pub async fn record(
        &self,
        account_id: Uuid,
        team_id: Uuid,
        idp_session_index: Option<&str>,
    ) -> DbResult<SsoSession> {
        self.repo.create(account_id, team_id, idp_session_index).await
    }

    /// All SSO sessions for an account, newest first. Logout uses this to
    /// locate the SessionIndex/team needed to build an SLO request.
    pub async fn find_by_account(&self, account_id: Uuid) -> DbResult<Vec<SsoSession>> {
        self.repo.list_by_account(account_id).await
    }

    /// Delete every SSO session for an account. Called on logout/SLO, in
    /// addition to (not instead of) application-session invalidation.
    pub async fn invalidate_all(&self, account_id: Uuid) -> DbResult<u64> {
        let count = self.repo.delete_all_for_account(account_id).await?;
        if count > 0 {
            tracing::debug!(account_id = %account_id, count, "Invalidated SSO sessions");
        }
        Ok(count)
    }
}
