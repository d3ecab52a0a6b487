mod accounts;
mod audit_events;
mod identity_configs;
mod sessions;
mod sso_sessions;
mod teams;

pub use accounts::AccountRepo;
pub use audit_events::AuditEventRepo;
pub use identity_configs::IdentityConfigRepo;
pub use sessions::SessionRepo;
pub use sso_sessions::SsoSessionRepo;
pub use teams::TeamRepo;
