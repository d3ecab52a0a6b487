use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::saml::SamlError;

/// Errors surfaced by the authentication flow.
///
/// The `IntoResponse` impl is the recovery boundary: SAML and storage detail
/// is collapsed into generic client-safe messages here, with the specifics
/// logged at the site that raised them.
#[derive(Debug)]
pub enum AuthError {
    /// No SSO configuration exists for the requested team
    ConfigNotFound,

    /// The `sso_state` cookie is missing, malformed, or expired; the user
    /// must restart the login flow
    StateExpired,

    /// SAML response validation failed
    Saml(SamlError),

    /// JIT provisioning is disabled and the identity is unknown
    ProvisioningDisabled,

    /// JIT provisioning is disabled and the account has no team membership
    NotATeamMember,

    /// No valid session was presented
    NotAuthenticated,

    /// Authenticated but not allowed to perform the operation
    Forbidden(String),

    /// Request payload failed validation
    Validation(String),

    /// Storage failure. Always fail closed: storage trouble is never
    /// "authenticated".
    Storage(String),

    /// Internal error during authentication
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

fn body(code: &'static str, message: impl Into<String>) -> Json<ErrorBody> {
    Json(ErrorBody {
        error: ErrorDetail {
            code,
            message: message.into(),
        },
    })
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AuthError::ConfigNotFound => (
                StatusCode::NOT_FOUND,
                "sso_not_configured",
                "SSO is not configured for this team".to_string(),
            ),
            AuthError::StateExpired => (
                StatusCode::BAD_REQUEST,
                "state_expired",
                "Login state expired, please restart the sign-in flow".to_string(),
            ),
            AuthError::Saml(_) => (
                // Parser/crypto internals are never leaked to the client.
                StatusCode::BAD_REQUEST,
                "sso_login_failed",
                "SSO login failed, please try again".to_string(),
            ),
            AuthError::ProvisioningDisabled => (
                StatusCode::FORBIDDEN,
                "provisioning_disabled",
                "Account provisioning is disabled for this team".to_string(),
            ),
            AuthError::NotATeamMember => (
                StatusCode::FORBIDDEN,
                "not_a_team_member",
                "You are not a member of this team".to_string(),
            ),
            AuthError::NotAuthenticated => (
                StatusCode::UNAUTHORIZED,
                "not_authenticated",
                "Authentication required".to_string(),
            ),
            AuthError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            AuthError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            AuthError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "A storage error occurred".to_string(),
            ),
            AuthError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        (status, body(code, message)).into_response()
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::ConfigNotFound => write!(f, "SSO not configured for team"),
            AuthError::StateExpired => write!(f, "Login state missing or expired"),
            AuthError::Saml(e) => write!(f, "SAML validation failed: {}", e),
            AuthError::ProvisioningDisabled => write!(f, "JIT provisioning disabled"),
            AuthError::NotATeamMember => write!(f, "Not a team member"),
            AuthError::NotAuthenticated => write!(f, "Not authenticated"),
            AuthError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AuthError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AuthError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AuthError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<SamlError> for AuthError {
    fn from(e: SamlError) -> Self {
        AuthError::Saml(e)
    }
}

impl From<crate::db::DbError> for AuthError {
    fn from(e: crate::db::DbError) -> Self {
        AuthError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_not_found_is_404() {
        let response = AuthError::ConfigNotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_state_expired_is_400() {
        let response = AuthError::StateExpired.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_saml_failures_are_400_and_generic() {
        let err = AuthError::Saml(SamlError::InvalidSignature);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_provisioning_gates_are_403() {
        assert_eq!(
            AuthError::ProvisioningDisabled.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::NotATeamMember.into_response().status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_storage_errors_are_500() {
        let response = AuthError::Storage("db down".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
