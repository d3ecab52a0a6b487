//! Team-owner administration of identity provider configuration.
//!
//! All three operations require an authenticated session whose account holds
//! the `owner` role on the target team. Changes emit audit events.

use axum::{
    Json,
    extract::{Path, State},
};
use tower_cookies::Cookies;
use uuid::Uuid;
use validator::Validate;

use super::auth::current_session;
use crate::{
    AppState,
    auth::AuthError,
    models::{CreateAuditEvent, Team, TeamIdentityConfig, TeamRole, UpsertTeamIdentityConfig,
             actions},
};

/// Resolve the team and verify the caller owns it.
async fn require_team_owner(
    state: &AppState,
    cookies: &Cookies,
    team_slug: &str,
) -> Result<(Team, Uuid), AuthError> {
    let session = current_session(state, cookies).await?;

    let team = state
        .db
        .teams()
        .get_by_slug(team_slug)
        .await?
        .ok_or(AuthError::ConfigNotFound)?;

    let membership = state
        .db
        .teams()
        .get_membership(team.id, session.account_id)
        .await?
        .ok_or_else(|| AuthError::Forbidden("Not a member of this team".to_string()))?;

    if membership.role != TeamRole::Owner {
        return Err(AuthError::Forbidden(
            "Only team owners may manage SSO configuration".to_string(),
        ));
    }

    Ok((team, session.account_id))
}

/// Fetch the team's identity configuration.
pub async fn get_config(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    cookies: Cookies,
) -> Result<Json<TeamIdentityConfig>, AuthError> {
    let (team, _) = require_team_owner(&state, &cookies, &slug).await?;

    let config = state
        .identity_configs
        .get(team.id)
        .await?
        .ok_or(AuthError::ConfigNotFound)?;

    Ok(Json(config))
}

/// Create or replace the team's identity configuration.
pub async fn put_config(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    cookies: Cookies,
    Json(input): Json<UpsertTeamIdentityConfig>,
) -> Result<Json<TeamIdentityConfig>, AuthError> {
    let (team, actor) = require_team_owner(&state, &cookies, &slug).await?;

    input
        .validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    let config = state.identity_configs.upsert(team.id, input).await?;

    state.audit.record(CreateAuditEvent {
        actor_account_id: Some(actor),
        team_id: Some(team.id),
        details: serde_json::json!({
            "provider": config.provider.as_str(),
            "jit_provisioning": config.jit_provisioning,
            "require_sso": config.require_sso,
        }),
        ..CreateAuditEvent::new(actions::IDENTITY_CONFIG_UPDATED, "identity_config", config.id)
    });

    Ok(Json(config))
}

/// Delete the team's identity configuration.
pub async fn delete_config(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    cookies: Cookies,
) -> Result<axum::http::StatusCode, AuthError> {
    let (team, actor) = require_team_owner(&state, &cookies, &slug).await?;

    match state.identity_configs.delete(team.id).await {
        Ok(()) => {
            state.audit.record(CreateAuditEvent {
                actor_account_id: Some(actor),
                team_id: Some(team.id),
                ..CreateAuditEvent::new(actions::IDENTITY_CONFIG_DELETED, "identity_config", team.id)
            });
            Ok(axum::http::StatusCode::NO_CONTENT)
        }
        Err(crate::db::DbError::NotFound) => Err(AuthError::ConfigNotFound),
        Err(e) => Err(e.into()),
    }
}
