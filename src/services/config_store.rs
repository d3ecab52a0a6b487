//! Team identity configuration store with a bounded read-through cache.
//!
//! The login initiation path hits the config on every request, so reads go
//! through an in-process cache keyed by team ID. The cache is explicit and
//! bounded to a configured capacity, and every write path (`upsert`,
//! `delete`) invalidates the entry. There is no TTL and no unbounded
//! process-lifetime map.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{DbError, DbResult, IdentityConfigRepo, TeamRepo},
    models::{Team, TeamIdentityConfig, UpsertTeamIdentityConfig},
};

pub struct TeamIdentityConfigStore {
    teams: Arc<dyn TeamRepo>,
    configs: Arc<dyn IdentityConfigRepo>,
    cache: RwLock<HashMap<Uuid, TeamIdentityConfig>>,
    capacity: usize,
}

impl TeamIdentityConfigStore {
    pub fn new(
        teams: Arc<dyn TeamRepo>,
        configs: Arc<dyn IdentityConfigRepo>,
        capacity: usize,
    ) -> Self {
        Self {
            teams,
            configs,
            cache: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Get the identity configuration for a team.
    pub async fn get(&self, team_id: Uuid) -> DbResult<Option<TeamIdentityConfig>> {
        {
            let cache = self.cache.read().await;
            if let Some(config) = cache.get(&team_id) {
                return Ok(Some(config.clone()));
            }
        }

        let config = self.configs.get_by_team(team_id).await?;

        if let Some(config) = &config {
            let mut cache = self.cache.write().await;
            if cache.len() >= self.capacity && !cache.contains_key(&team_id) {
                // At capacity: drop an arbitrary entry rather than grow
                if let Some(evict) = cache.keys().next().copied() {
                    cache.remove(&evict);
                }
            }
            cache.insert(team_id, config.clone());
        }

        Ok(config)
    }

    /// Resolve a team by slug and return its identity configuration.
    ///
    /// Returns `None` when the team is unknown OR the team has no SSO
    /// configured; the caller maps both to the same 404.
    pub async fn get_by_slug(
        &self,
        team_slug: &str,
    ) -> DbResult<Option<(TeamIdentityConfig, Team)>> {
        let Some(team) = self.teams.get_by_slug(team_slug).await? else {
            return Ok(None);
        };

        match self.get(team.id).await? {
            Some(config) => Ok(Some((config, team))),
            None => Ok(None),
        }
    }

    /// Create or replace the team's configuration and invalidate the cache.
    ///
    /// Rejects inputs missing the entity ID, SSO URL, or certificate
    /// regardless of which surface called it.
    pub async fn upsert(
        &self,
        team_id: Uuid,
        input: UpsertTeamIdentityConfig,
    ) -> DbResult<TeamIdentityConfig> {
        input
            .validate()
            .map_err(|e| DbError::Validation(e.to_string()))?;

        let config = self.configs.upsert(team_id, input).await?;

        let mut cache = self.cache.write().await;
        cache.remove(&team_id);

        tracing::info!(team_id = %team_id, provider = %config.provider, "Team identity config updated");
        Ok(config)
    }

    /// Delete the team's configuration and invalidate the cache.
    pub async fn delete(&self, team_id: Uuid) -> DbResult<()> {
        self.configs.delete(team_id).await?;

        let mut cache = self.cache.write().await;
        cache.remove(&team_id);

        tracing::info!(team_id = %team_id, "Team identity config deleted");
        Ok(())
    }

    #[cfg(test)]
    async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{
            DbError,
            sqlite::{
                SqliteIdentityConfigRepo, SqliteTeamRepo,
                test_util::{create_test_pool, create_test_team},
            },
        },
        models::SsoProvider,
    };

    fn make_input(sso_url: &str) -> UpsertTeamIdentityConfig {
        UpsertTeamIdentityConfig {
            provider: SsoProvider::Okta,
            idp_entity_id: "https://idp.example.com".to_string(),
            idp_sso_url: sso_url.to_string(),
            idp_slo_url: None,
            idp_certificate: "PEM".to_string(),
            email_attribute: None,
            first_name_attribute: None,
            last_name_attribute: None,
            groups_attribute: None,
            admin_groups: vec![],
            require_sso: false,
            jit_provisioning: true,
            allow_email_linking: true,
        }
    }

    async fn setup(capacity: usize) -> (TeamIdentityConfigStore, sqlx::SqlitePool) {
        let pool = create_test_pool().await;
        let store = TeamIdentityConfigStore::new(
            Arc::new(SqliteTeamRepo::new(pool.clone())),
            Arc::new(SqliteIdentityConfigRepo::new(pool.clone())),
            capacity,
        );
        (store, pool)
    }

    #[tokio::test]
    async fn test_get_reads_through_and_caches() {
        let (store, pool) = setup(16).await;
        let team_id = create_test_team(&pool, "acme").await;

        assert!(store.get(team_id).await.unwrap().is_none());
        assert_eq!(store.cached_len().await, 0);

        store.upsert(team_id, make_input("https://idp.example.com/sso")).await.unwrap();

        let config = store.get(team_id).await.unwrap().expect("Should exist");
        assert_eq!(config.idp_sso_url, "https://idp.example.com/sso");
        assert_eq!(store.cached_len().await, 1);

        // Served from cache even if the row changes behind the store's back
        let repo = SqliteIdentityConfigRepo::new(pool);
        repo.upsert(team_id, make_input("https://sneaky.example.com/sso"))
            .await
            .unwrap();
        let cached = store.get(team_id).await.unwrap().unwrap();
        assert_eq!(cached.idp_sso_url, "https://idp.example.com/sso");
    }

    #[tokio::test]
    async fn test_upsert_invalidates_cache() {
        let (store, pool) = setup(16).await;
        let team_id = create_test_team(&pool, "acme").await;

        store.upsert(team_id, make_input("https://first.example.com/sso")).await.unwrap();
        store.get(team_id).await.unwrap();

        store.upsert(team_id, make_input("https://second.example.com/sso")).await.unwrap();
        let config = store.get(team_id).await.unwrap().unwrap();
        assert_eq!(config.idp_sso_url, "https://second.example.com/sso");
    }

    #[tokio::test]
    async fn test_delete_invalidates_cache() {
        let (store, pool) = setup(16).await;
        let team_id = create_test_team(&pool, "acme").await;

        store.upsert(team_id, make_input("https://idp.example.com/sso")).await.unwrap();
        store.get(team_id).await.unwrap();

        store.delete(team_id).await.unwrap();
        assert!(store.get(team_id).await.unwrap().is_none());
        assert!(matches!(store.delete(team_id).await, Err(DbError::NotFound)));
    }

    #[tokio::test]
    async fn test_cache_is_bounded() {
        let (store, pool) = setup(2).await;

        for slug in ["one", "two", "three"] {
            let team_id = create_test_team(&pool, slug).await;
            store.upsert(team_id, make_input("https://idp.example.com/sso")).await.unwrap();
            store.get(team_id).await.unwrap();
        }

        assert!(store.cached_len().await <= 2);
    }

    #[tokio::test]
    async fn test_get_by_slug() {
        let (store, pool) = setup(16).await;
        let team_id = create_test_team(&pool, "acme").await;

        // Team exists but SSO unconfigured
        assert!(store.get_by_slug("acme").await.unwrap().is_none());
        // Unknown team
        assert!(store.get_by_slug("ghost").await.unwrap().is_none());

        store.upsert(team_id, make_input("https://idp.example.com/sso")).await.unwrap();
        let (config, team) = store.get_by_slug("acme").await.unwrap().expect("Should exist");
        assert_eq!(config.team_id, team_id);
        assert_eq!(team.slug, "acme");
    }
}
