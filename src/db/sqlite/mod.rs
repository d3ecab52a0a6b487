mod accounts;
mod audit_events;
mod common;
mod identity_configs;
mod sessions;
mod sso_sessions;
mod teams;

pub use accounts::SqliteAccountRepo;
pub use audit_events::SqliteAuditEventRepo;
pub use identity_configs::SqliteIdentityConfigRepo;
pub use sessions::SqliteSessionRepo;
pub use sso_sessions::SqliteSsoSessionRepo;
pub use teams::SqliteTeamRepo;
