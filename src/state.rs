use std::sync::Arc;

use crate::{
    auth::{SamlServiceProvider, ServiceProvider, SessionManager},
    config::AppConfig,
    db::DbPool,
    services::{
        DbAuditSink, IdentityResolver, SharedAuditSink, SsoSessionTracker,
        TeamIdentityConfigStore,
    },
};

/// Shared application state handed to every handler.
///
/// Everything here is an `Arc` over an immutable service; handlers never
/// hold locks across await points.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DbPool>,
    pub sessions: Arc<SessionManager>,
    pub identity_configs: Arc<TeamIdentityConfigStore>,
    pub resolver: Arc<IdentityResolver>,
    pub sso_tracker: Arc<SsoSessionTracker>,
    pub saml: Arc<dyn ServiceProvider>,
    pub audit: SharedAuditSink,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool) -> Self {
        let db = Arc::new(db);
        let audit: SharedAuditSink = Arc::new(DbAuditSink::new(db.audit_events()));

        let sessions = Arc::new(SessionManager::new(
            db.sessions(),
            config.auth.session.clone(),
        ));
        let identity_configs = Arc::new(TeamIdentityConfigStore::new(
            db.teams(),
            db.identity_configs(),
            config.auth.config_cache_capacity,
        ));
        let resolver = Arc::new(IdentityResolver::new(
            db.accounts(),
            db.teams(),
            db.identity_configs(),
            Arc::clone(&audit),
        ));
        let sso_tracker = Arc::new(SsoSessionTracker::new(db.sso_sessions()));
        let saml: Arc<dyn ServiceProvider> = Arc::new(SamlServiceProvider::from_config(&config));

        Self {
            config: Arc::new(config),
            db,
            sessions,
            identity_configs,
            resolver,
            sso_tracker,
            saml,
            audit,
        }
    }
}
