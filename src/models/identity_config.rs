use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::SsoProvider;

/// Per-team identity provider configuration (0 or 1 per team).
///
/// The IdP certificate is the trust anchor for assertion validation:
/// signature checks fail closed when it is absent or unparsable. Only team
/// owners may mutate this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamIdentityConfig {
    pub id: Uuid,
    pub team_id: Uuid,
    pub provider: SsoProvider,
    /// IdP entity identifier (Issuer the IdP asserts)
    pub idp_entity_id: String,
    /// IdP Single Sign-On service URL
    pub idp_sso_url: String,
    /// IdP Single Logout service URL (optional)
    pub idp_slo_url: Option<String>,
    /// IdP X.509 signing certificate, PEM format
    pub idp_certificate: String,
    /// SAML attribute carrying the email address; NameID is used when unset
    pub email_attribute: Option<String>,
    /// SAML attribute carrying the given name
    pub first_name_attribute: Option<String>,
    /// SAML attribute carrying the family name
    pub last_name_attribute: Option<String>,
    /// SAML attribute carrying group memberships
    pub groups_attribute: Option<String>,
    /// Groups granted the `admin` role on JIT provisioning (exact match)
    pub admin_groups: Vec<String>,
    /// Whether non-SSO authentication is blocked for this team
    pub require_sso: bool,
    /// Whether unknown identities may be provisioned on first login
    pub jit_provisioning: bool,
    /// Whether an unknown NameID may be linked to an existing account by
    /// email match. Linking is an account-takeover vector when the IdP does
    /// not verify email ownership; teams can turn it off.
    pub allow_email_linking: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating or replacing a team's identity configuration.
///
/// `idp_entity_id`, `idp_sso_url`, and a non-empty certificate are required;
/// upsert replaces any existing config for the team.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpsertTeamIdentityConfig {
    #[serde(default)]
    pub provider: SsoProvider,

    #[validate(length(min = 1, max = 512))]
    pub idp_entity_id: String,

    #[validate(length(min = 1, max = 512), url)]
    pub idp_sso_url: String,

    #[validate(length(max = 512), url)]
    #[serde(default)]
    pub idp_slo_url: Option<String>,

    /// PEM-encoded X.509 certificate
    #[validate(length(min = 1))]
    pub idp_certificate: String,

    #[validate(length(max = 256))]
    #[serde(default)]
    pub email_attribute: Option<String>,

    #[validate(length(max = 256))]
    #[serde(default)]
    pub first_name_attribute: Option<String>,

    #[validate(length(max = 256))]
    #[serde(default)]
    pub last_name_attribute: Option<String>,

    #[validate(length(max = 256))]
    #[serde(default)]
    pub groups_attribute: Option<String>,

    #[serde(default)]
    pub admin_groups: Vec<String>,

    #[serde(default)]
    pub require_sso: bool,

    #[serde(default = "default_true")]
    pub jit_provisioning: bool,

    #[serde(default = "default_true")]
    pub allow_email_linking: bool,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> UpsertTeamIdentityConfig {
        UpsertTeamIdentityConfig {
            provider: SsoProvider::Okta,
            idp_entity_id: "https://idp.example.com/metadata".to_string(),
            idp_sso_url: "https://idp.example.com/sso".to_string(),
            idp_slo_url: None,
            idp_certificate: "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----"
                .to_string(),
            email_attribute: Some("email".to_string()),
            first_name_attribute: None,
            last_name_attribute: None,
            groups_attribute: Some("groups".to_string()),
            admin_groups: vec!["admins".to_string()],
            require_sso: false,
            jit_provisioning: true,
            allow_email_linking: true,
        }
    }

    #[test]
    fn test_valid_input_passes_validation() {
        assert!(base_input().validate().is_ok());
    }

    #[test]
    fn test_empty_certificate_rejected() {
        let mut input = base_input();
        input.idp_certificate = String::new();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_non_url_sso_endpoint_rejected() {
        let mut input = base_input();
        input.idp_sso_url = "not a url".to_string();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_defaults_from_json() {
        let input: UpsertTeamIdentityConfig = serde_json::from_str(
            r#"{
                "idp_entity_id": "https://idp.example.com",
                "idp_sso_url": "https://idp.example.com/sso",
                "idp_certificate": "PEM"
            }"#,
        )
        .unwrap();
        assert!(input.jit_provisioning);
        assert!(input.allow_email_linking);
        assert!(!input.require_sso);
        assert!(input.admin_groups.is_empty());
    }
}
