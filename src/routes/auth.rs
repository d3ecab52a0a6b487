//! Authentication routes for SAML 2.0 SSO.
//!
//! - `/auth/sso` - initiates login: loads the team's IdP config, sets the
//!   login-state cookie, redirects to the IdP with an AuthnRequest
//! - `/auth/sso/callback` - Assertion Consumer Service: consumes the state
//!   cookie, validates the SAML Response, resolves the identity, creates the
//!   session, sets the session cookie
//! - `/auth/sso/logout` - invalidates all sessions for the caller; redirects
//!   to the IdP SLO endpoint when one can be built
//! - `/auth/me` - returns the authenticated account
//! - `/saml/metadata` - SP metadata XML (public)

use axum::{
    Form, Json,
    extract::{Query, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_cookies::{
    Cookie, Cookies,
    cookie::{SameSite as CookieSameSite, time::Duration as CookieDuration},
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AuthError, LoginState},
    config::{SameSite, SessionConfig, StateCookieConfig},
    models::{CreateAuditEvent, Session, SessionMeta, actions},
};

/// Query parameters for the login endpoint.
#[derive(Debug, Deserialize)]
pub struct SsoLoginQuery {
    /// Team slug to authenticate against
    pub team: String,
    /// Path to redirect to after successful login
    #[serde(rename = "returnTo", default)]
    pub return_to: Option<String>,
}

/// Form data posted by the IdP (HTTP-POST binding).
#[derive(Debug, Deserialize)]
pub struct SamlCallbackForm {
    /// Base64-encoded SAML Response
    #[serde(rename = "SAMLResponse")]
    pub saml_response: String,
    /// RelayState echoed back by the IdP
    #[serde(rename = "RelayState", default)]
    pub relay_state: Option<String>,
}

/// Optional SLO parameters on the POST logout variant.
#[derive(Debug, Default, Deserialize)]
pub struct SloForm {
    #[serde(rename = "SAMLRequest", default)]
    pub saml_request: Option<String>,
    #[serde(rename = "SAMLResponse", default)]
    pub saml_response: Option<String>,
}

/// Response for the /auth/me endpoint.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub account_id: Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub plan: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_team_id: Option<Uuid>,
}

fn cookie_same_site(same_site: SameSite) -> CookieSameSite {
    match same_site {
        SameSite::Strict => CookieSameSite::Strict,
        SameSite::Lax => CookieSameSite::Lax,
        SameSite::None => CookieSameSite::None,
    }
}

/// Session cookie carrying the raw bearer token. The token appears nowhere
/// else.
fn build_session_cookie(config: &SessionConfig, token: String) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .secure(config.secure)
        .same_site(cookie_same_site(config.same_site))
        .max_age(CookieDuration::seconds(config.duration_secs as i64))
        .build()
}

/// Removal cookie with the same attributes as the login cookie.
fn build_session_removal_cookie(config: &SessionConfig) -> Cookie<'static> {
    Cookie::build(config.cookie_name.clone())
        .path("/")
        .http_only(true)
        .secure(config.secure)
        .same_site(cookie_same_site(config.same_site))
        .max_age(CookieDuration::ZERO)
        .build()
}

/// Login-state cookie. SameSite must be None: the IdP delivers the response
/// via a cross-origin POST, and Lax/Strict cookies are not attached to
/// those.
fn build_state_cookie(config: &StateCookieConfig, secure: bool, value: String) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(CookieSameSite::None)
        .max_age(CookieDuration::seconds(config.ttl_secs as i64))
        .build()
}

fn build_state_removal_cookie(config: &StateCookieConfig, secure: bool) -> Cookie<'static> {
    Cookie::build(config.cookie_name.clone())
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(CookieSameSite::None)
        .max_age(CookieDuration::ZERO)
        .build()
}

/// Only relative paths are allowed as post-login redirect targets.
fn sanitize_return_to(return_to: Option<String>) -> String {
    return_to
        .filter(|url| url.starts_with('/') && !url.starts_with("//"))
        .unwrap_or_else(|| "/".to_string())
}

/// Client IP from proxy headers, best-effort.
fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Resolve the caller's session from the session cookie. Used by every
/// authenticated endpoint; failures are uniformly `NotAuthenticated`.
pub(crate) async fn current_session(
    state: &AppState,
    cookies: &Cookies,
) -> Result<Session, AuthError> {
    let cookie = cookies
        .get(&state.config.auth.session.cookie_name)
        .ok_or(AuthError::NotAuthenticated)?;

    state
        .sessions
        .validate_session(cookie.value())
        .await
        .ok_or(AuthError::NotAuthenticated)
}

/// SP metadata XML for IdP auto-configuration. Public, no side effects.
pub async fn saml_metadata(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, "application/xml")],
        state.saml.sp_metadata(None),
    )
        .into_response()
}

/// Initiate SSO login for a team.
#[tracing::instrument(name = "auth.sso.login", skip(state, cookies))]
pub async fn sso_login(
    State(state): State<AppState>,
    Query(query): Query<SsoLoginQuery>,
    cookies: Cookies,
) -> Result<Redirect, AuthError> {
    let (config, team) = state
        .identity_configs
        .get_by_slug(&query.team)
        .await?
        .ok_or(AuthError::ConfigNotFound)?;

    let relay_state = Uuid::new_v4().to_string();
    let redirect = state
        .saml
        .build_authn_request(&config, &relay_state)
        .map_err(|e| {
            tracing::error!(team_id = %team.id, error = %e, "Failed to build AuthnRequest");
            AuthError::from(e)
        })?;

    let login_state = LoginState::new(team.id, &team.slug, query.return_to, &redirect.request_id);
    cookies.add(build_state_cookie(
        &state.config.auth.state,
        state.config.auth.session.secure,
        login_state.encode(),
    ));

    tracing::info!(team_id = %team.id, team_slug = %team.slug, "Initiating SSO login");

    Ok(Redirect::to(&redirect.url))
}

/// Assertion Consumer Service: the IdP posts the SAML Response here.
///
/// Side effects are committed in order account → membership → SSO session →
/// application session; a failure at any step leaves no partial session.
#[tracing::instrument(name = "auth.sso.callback", skip(state, headers, cookies, form))]
pub async fn sso_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    cookies: Cookies,
    Form(form): Form<SamlCallbackForm>,
) -> Result<Response, AuthError> {
    let ip_address = extract_client_ip(&headers);
    let user_agent = extract_user_agent(&headers);

    // The state cookie is single-use: read it, then delete it before any
    // validation so a replayed POST finds nothing.
    let login_state = cookies
        .get(&state.config.auth.state.cookie_name)
        .and_then(|c| LoginState::decode(c.value()))
        .ok_or(AuthError::StateExpired)?;
    cookies.add(build_state_removal_cookie(
        &state.config.auth.state,
        state.config.auth.session.secure,
    ));

    if login_state.is_expired(state.config.auth.state.ttl_secs) {
        return Err(AuthError::StateExpired);
    }

    let team_id = login_state.team_id;
    let config = state
        .identity_configs
        .get(team_id)
        .await?
        .ok_or(AuthError::ConfigNotFound)?;

    let audit_failure = |error: &dyn std::fmt::Display| {
        state.audit.record(CreateAuditEvent {
            team_id: Some(team_id),
            details: serde_json::json!({
                "provider": config.provider.as_str(),
                "error": error.to_string(),
            }),
            ip_address: ip_address.clone(),
            user_agent: user_agent.clone(),
            ..CreateAuditEvent::new(actions::SSO_LOGIN_FAILED, "session", Uuid::nil())
        });
    };

    let assertion = match state.saml.validate_response(
        &config,
        &form.saml_response,
        Some(&login_state.request_id),
    ) {
        Ok(assertion) => assertion,
        Err(e) => {
            tracing::warn!(team_id = %team_id, error = %e, "SAML response validation failed");
            audit_failure(&e);
            return Err(e.into());
        }
    };

    let resolution = match state.resolver.resolve(team_id, &config, &assertion).await {
        Ok(resolution) => resolution,
        Err(e) => {
            tracing::warn!(team_id = %team_id, error = %e, "Identity resolution failed");
            audit_failure(&e);
            return Err(e);
        }
    };

    state
        .sso_tracker
        .record(
            resolution.account.id,
            team_id,
            assertion.session_index.as_deref(),
        )
        .await?;

    let (raw_token, session) = state
        .sessions
        .create_session(
            resolution.account.id,
            SessionMeta::new(ip_address.clone(), user_agent.clone()),
        )
        .await?;

    cookies.add(build_session_cookie(&state.config.auth.session, raw_token));

    tracing::info!(
        session_id = %session.id,
        account_id = %resolution.account.id,
        team_id = %team_id,
        is_new_account = resolution.is_new_account,
        "SSO login succeeded"
    );

    state.audit.record(CreateAuditEvent {
        actor_account_id: Some(resolution.account.id),
        team_id: Some(team_id),
        details: serde_json::json!({
            "provider": config.provider.as_str(),
            "is_new_account": resolution.is_new_account,
            "role": resolution.role.as_str(),
        }),
        ip_address,
        user_agent,
        ..CreateAuditEvent::new(actions::SSO_LOGIN, "session", session.id)
    });

    let redirect_to = sanitize_return_to(login_state.return_to);
    Ok(Redirect::to(&redirect_to).into_response())
}

/// Logout (GET variant).
pub async fn sso_logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    cookies: Cookies,
) -> Result<Response, AuthError> {
    perform_logout(&state, &headers, &cookies, None).await
}

/// Logout (POST variant). Additionally acknowledges IdP-initiated SLO
/// messages; local invalidation happens either way.
pub async fn sso_logout_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    cookies: Cookies,
    form: Option<Form<SloForm>>,
) -> Result<Response, AuthError> {
    let slo = form.map(|Form(f)| f);
    perform_logout(&state, &headers, &cookies, slo).await
}

async fn perform_logout(
    state: &AppState,
    headers: &HeaderMap,
    cookies: &Cookies,
    slo: Option<SloForm>,
) -> Result<Response, AuthError> {
    let ip_address = extract_client_ip(headers);
    let user_agent = extract_user_agent(headers);

    if let Some(f) = &slo
        && (f.saml_request.is_some() || f.saml_response.is_some())
    {
        // IdP-initiated SLO: acknowledge by performing the local logout.
        tracing::info!("Acknowledging IdP-initiated single logout");
    }

    let mut idp_slo_redirect: Option<String> = None;

    if let Some(session_cookie) = cookies.get(&state.config.auth.session.cookie_name) {
        let raw_token = session_cookie.value().to_string();

        if let Some(session) = state.sessions.validate_session(&raw_token).await {
            let account_id = session.account_id;

            // Try to build an IdP SLO redirect from the most recent
            // federated login, before the records are gone.
            if let Ok(sso_sessions) = state.sso_tracker.find_by_account(account_id).await
                && let Some(latest) = sso_sessions.first()
                && let Ok(Some(config)) = state.identity_configs.get(latest.team_id).await
                && let Ok(Some(account)) = state.db.accounts().get_by_id(account_id).await
            {
                let name_id = account.sso_id.unwrap_or(account.email);
                match state.saml.build_logout_request(
                    &config,
                    &name_id,
                    latest.idp_session_index.as_deref(),
                    &Uuid::new_v4().to_string(),
                ) {
                    Ok(Some(url)) => idp_slo_redirect = Some(url),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(
                            account_id = %account_id,
                            error = %e,
                            "Failed to build SLO request; local logout only"
                        );
                    }
                }
            }

            let _ = state.sessions.invalidate_all_for_account(account_id).await;
            let _ = state.sso_tracker.invalidate_all(account_id).await;

            state.audit.record(CreateAuditEvent {
                actor_account_id: Some(account_id),
                ip_address,
                user_agent,
                ..CreateAuditEvent::new(actions::LOGOUT, "session", session.id)
            });
        }
    }

    cookies.add(build_session_removal_cookie(&state.config.auth.session));

    let target = idp_slo_redirect.unwrap_or_else(|| "/".to_string());
    Ok(Redirect::to(&target).into_response())
}

/// Current account for the presented session cookie.
pub async fn me(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Json<MeResponse>, AuthError> {
    let session = current_session(&state, &cookies).await?;

    let account = state
        .db
        .accounts()
        .get_by_id(session.account_id)
        .await?
        .ok_or(AuthError::NotAuthenticated)?;

    Ok(Json(MeResponse {
        account_id: account.id,
        email: account.email,
        name: account.name,
        plan: account.plan,
        sso_team_id: account.sso_team_id,
    }))
}
