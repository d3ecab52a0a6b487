pub mod auth;
pub mod health;
pub mod identity_config;

use axum::{
    Router,
    routing::{get, post},
};
use tower_cookies::CookieManagerLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Assemble the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/saml/metadata", get(auth::saml_metadata))
        .route("/auth/sso", get(auth::sso_login))
        .route("/auth/sso/callback", post(auth::sso_callback))
        .route(
            "/auth/sso/logout",
            get(auth::sso_logout).post(auth::sso_logout_post),
        )
        .route("/auth/me", get(auth::me))
        .route(
            "/api/teams/{slug}/identity-config",
            get(identity_config::get_config)
                .put(identity_config::put_config)
                .delete(identity_config::delete_config),
        )
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
