use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Role of an account within a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Owner,
    Admin,
    #[default]
    Member,
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }
}

impl fmt::Display for TeamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TeamRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            _ => Err(format!("Invalid team role: {}", s)),
        }
    }
}

/// Source of a team membership (how it was created).
///
/// JIT-created memberships may be revisited on later logins; manual and SCIM
/// memberships are preserved across identity changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipSource {
    /// Created manually via the admin API or UI
    #[default]
    Manual,
    /// Created via JIT provisioning (SSO login)
    Jit,
    /// Created via directory sync (SCIM push)
    Scim,
}

impl MembershipSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Jit => "jit",
            Self::Scim => "scim",
        }
    }
}

impl fmt::Display for MembershipSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MembershipSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "jit" => Ok(Self::Jit),
            "scim" => Ok(Self::Scim),
            _ => Err(format!("Invalid membership source: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTeam {
    #[validate(length(min = 1, max = 64))]
    pub slug: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMembership {
    pub team_id: Uuid,
    pub account_id: Uuid,
    pub role: TeamRole,
    pub source: MembershipSource,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_role_round_trip() {
        for role in [TeamRole::Owner, TeamRole::Admin, TeamRole::Member] {
            assert_eq!(role.as_str().parse::<TeamRole>().unwrap(), role);
        }
        assert!("superuser".parse::<TeamRole>().is_err());
    }

    #[test]
    fn test_membership_source_round_trip() {
        for source in [
            MembershipSource::Manual,
            MembershipSource::Jit,
            MembershipSource::Scim,
        ] {
            assert_eq!(
                source.as_str().parse::<MembershipSource>().unwrap(),
                source
            );
        }
    }
}
