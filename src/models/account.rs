use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Identity provider behind a federated account.
///
/// Stored alongside `sso_id` so the `(sso_id, provider)` pair uniquely
/// identifies an external subject. `Generic` covers any SAML 2.0 IdP that
/// isn't one of the named vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SsoProvider {
    Okta,
    Azure,
    Google,
    #[default]
    Generic,
}

impl SsoProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Okta => "okta",
            Self::Azure => "azure",
            Self::Google => "google",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for SsoProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SsoProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "okta" => Ok(Self::Okta),
            "azure" => Ok(Self::Azure),
            "google" => Ok(Self::Google),
            "generic" => Ok(Self::Generic),
            _ => Err(format!("Invalid SSO provider: {}", s)),
        }
    }
}

/// An account on the platform.
///
/// Created on first successful login (local or federated) or via directory
/// sync, refreshed on re-login, never auto-deleted. `email` is stored
/// lowercased and is unique; `(sso_id, sso_provider)` is unique when both
/// are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    /// Lowercased, unique
    pub email: String,
    pub name: Option<String>,
    /// External NameID asserted by the IdP
    pub sso_id: Option<String>,
    pub sso_provider: Option<SsoProvider>,
    /// Last team this account authenticated into via SSO
    pub sso_team_id: Option<Uuid>,
    pub plan: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAccount {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub sso_id: Option<String>,
    pub sso_provider: Option<SsoProvider>,
    pub sso_team_id: Option<Uuid>,
}

/// Partial update applied on re-login or directory sync.
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateAccount {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub sso_id: Option<String>,
    pub sso_provider: Option<SsoProvider>,
    pub sso_team_id: Option<Uuid>,
}

/// A user record pushed by a directory-sync collaborator (SCIM).
///
/// Carries the same identity fields an assertion would, minus the protocol
/// envelope.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ExternalUser {
    /// Stable identifier at the directory (maps to `sso_id`)
    #[validate(length(min = 1, max = 255))]
    pub external_id: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 255))]
    pub name: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sso_provider_round_trip() {
        for provider in [
            SsoProvider::Okta,
            SsoProvider::Azure,
            SsoProvider::Google,
            SsoProvider::Generic,
        ] {
            let parsed: SsoProvider = provider.as_str().parse().unwrap();
            assert_eq!(parsed, provider);
        }
    }

    #[test]
    fn test_sso_provider_parse_is_case_insensitive() {
        assert_eq!("OKTA".parse::<SsoProvider>().unwrap(), SsoProvider::Okta);
        assert!("saml".parse::<SsoProvider>().is_err());
    }
}
