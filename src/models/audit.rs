use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Audit event actions emitted by the identity core.
pub mod actions {
    /// Successful SSO login
    pub const SSO_LOGIN: &str = "auth.sso.login";
    /// Failed SSO login (validation or provisioning failure)
    pub const SSO_LOGIN_FAILED: &str = "auth.sso.login_failed";
    /// Logout (local or SLO)
    pub const LOGOUT: &str = "auth.logout";
    /// Account created via JIT or directory sync
    pub const ACCOUNT_PROVISIONED: &str = "account.provisioned";
    /// Existing account linked to an SSO identity by email match
    pub const ACCOUNT_SSO_LINKED: &str = "account.sso_linked";
    /// Team membership removed via directory sync
    pub const ACCOUNT_DEPROVISIONED: &str = "account.deprovisioned";
    /// Team identity configuration created or replaced
    pub const IDENTITY_CONFIG_UPDATED: &str = "identity_config.updated";
    /// Team identity configuration deleted
    pub const IDENTITY_CONFIG_DELETED: &str = "identity_config.deleted";
}

/// A persisted audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Action performed, e.g. "auth.sso.login"
    pub action: String,
    /// Affected resource kind, e.g. "session", "account", "identity_config"
    pub resource_type: String,
    pub resource_id: Uuid,
    /// Acting account, when one exists (None for anonymous/system)
    pub actor_account_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    /// Free-form context as JSON
    pub details: JsonValue,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Input for recording an audit event.
#[derive(Debug, Clone)]
pub struct CreateAuditEvent {
    pub action: String,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub actor_account_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub details: JsonValue,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl CreateAuditEvent {
    /// Convenience constructor for events without request context.
    pub fn new(action: &str, resource_type: &str, resource_id: Uuid) -> Self {
        Self {
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id,
            actor_account_id: None,
            team_id: None,
            details: serde_json::json!({}),
            ip_address: None,
            user_agent: None,
        }
    }
}
