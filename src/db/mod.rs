mod error;
pub mod repos;
pub mod sqlite;

use std::sync::Arc;

pub use error::{DbError, DbResult};
pub use repos::*;

use crate::config::DatabaseConfig;

/// Cached repository trait objects, created once at startup.
struct CachedRepos {
    accounts: Arc<dyn AccountRepo>,
    teams: Arc<dyn TeamRepo>,
    identity_configs: Arc<dyn IdentityConfigRepo>,
    sessions: Arc<dyn SessionRepo>,
    sso_sessions: Arc<dyn SsoSessionRepo>,
    audit_events: Arc<dyn AuditEventRepo>,
}

/// SQLite-backed database pool.
///
/// Repositories are cached at construction time to avoid allocation on each
/// access. All cross-reference between entities goes through opaque UUIDs,
/// never embedded object graphs.
pub struct DbPool {
    pool: sqlx::SqlitePool,
    repos: CachedRepos,
}

impl DbPool {
    /// Create a DbPool from an existing SQLite pool.
    /// Primarily useful for testing.
    pub fn from_sqlite(pool: sqlx::SqlitePool) -> Self {
        let repos = CachedRepos {
            accounts: Arc::new(sqlite::SqliteAccountRepo::new(pool.clone())),
            teams: Arc::new(sqlite::SqliteTeamRepo::new(pool.clone())),
            identity_configs: Arc::new(sqlite::SqliteIdentityConfigRepo::new(pool.clone())),
            sessions: Arc::new(sqlite::SqliteSessionRepo::new(pool.clone())),
            sso_sessions: Arc::new(sqlite::SqliteSsoSessionRepo::new(pool.clone())),
            audit_events: Arc::new(sqlite::SqliteAuditEventRepo::new(pool.clone())),
        };
        DbPool { pool, repos }
    }

    /// Create a database pool from configuration.
    pub async fn from_config(config: &DatabaseConfig) -> DbResult<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(
                sqlx::sqlite::SqliteConnectOptions::new()
                    .filename(&config.path)
                    .create_if_missing(config.create_if_missing)
                    .journal_mode(if config.wal_mode {
                        sqlx::sqlite::SqliteJournalMode::Wal
                    } else {
                        sqlx::sqlite::SqliteJournalMode::Delete
                    })
                    .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms)),
            )
            .await?;

        Ok(Self::from_sqlite(pool))
    }

    /// Run database migrations using sqlx's migration runner.
    /// This automatically creates and manages a _sqlx_migrations table.
    pub async fn run_migrations(&self) -> DbResult<()> {
        tracing::info!("Running SQLite migrations");
        sqlx::migrate!("./migrations_sqlx/sqlite")
            .run(&self.pool)
            .await?;
        tracing::info!("SQLite migrations completed successfully");
        Ok(())
    }

    /// Get account repository
    pub fn accounts(&self) -> Arc<dyn AccountRepo> {
        Arc::clone(&self.repos.accounts)
    }

    /// Get team repository
    pub fn teams(&self) -> Arc<dyn TeamRepo> {
        Arc::clone(&self.repos.teams)
    }

    /// Get team identity configuration repository
    pub fn identity_configs(&self) -> Arc<dyn IdentityConfigRepo> {
        Arc::clone(&self.repos.identity_configs)
    }

    /// Get session repository
    pub fn sessions(&self) -> Arc<dyn SessionRepo> {
        Arc::clone(&self.repos.sessions)
    }

    /// Get SSO session repository
    pub fn sso_sessions(&self) -> Arc<dyn SsoSessionRepo> {
        Arc::clone(&self.repos.sso_sessions)
    }

    /// Get audit event repository
    pub fn audit_events(&self) -> Arc<dyn AuditEventRepo> {
        Arc::clone(&self.repos.audit_events)
    }

    /// Get a reference to the underlying pool for database-specific
    /// operations.
    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }

    /// Health check for database connectivity
    pub async fn health_check(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
