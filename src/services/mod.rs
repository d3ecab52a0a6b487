pub mod audit;
pub mod config_store;
pub mod resolver;
pub mod sso_tracker;

pub use audit::{AuditSink, DbAuditSink, SharedAuditSink};
pub use config_store::TeamIdentityConfigStore;
pub use resolver::{IdentityResolver, Resolution, map_groups_to_role};
pub use sso_tracker::SsoSessionTracker;
