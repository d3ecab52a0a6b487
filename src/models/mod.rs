mod account;
mod audit;
mod identity_config;
mod session;
mod team;

pub use account::{Account, CreateAccount, ExternalUser, SsoProvider, UpdateAccount};
pub use audit::{AuditEvent, CreateAuditEvent, actions};
pub use identity_config::{TeamIdentityConfig, UpsertTeamIdentityConfig};
pub use session::{
    SESSION_TOKEN_PREFIX, Session, SessionMeta, SsoSession, generate_session_token,
    has_token_prefix, hash_session_token, verify_session_token,
};
pub use team::{CreateTeam, MembershipSource, Team, TeamMembership, TeamRole};
