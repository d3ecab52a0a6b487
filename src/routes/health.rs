//! Health check endpoint for probes and monitoring.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// "healthy" or "unhealthy"
    pub status: &'static str,
    pub version: &'static str,
    pub database: bool,
}

/// Liveness + database connectivity.
pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.db.health_check().await.is_ok();

    let status = if database { "healthy" } else { "unhealthy" };
    let code = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(HealthStatus {
            status,
            version: env!("CARGO_PKG_VERSION"),
            database,
        }),
    )
}
