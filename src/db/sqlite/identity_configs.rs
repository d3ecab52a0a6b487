use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::IdentityConfigRepo,
    },
    models::{SsoProvider, TeamIdentityConfig, UpsertTeamIdentityConfig},
};

pub struct SqliteIdentityConfigRepo {
    pool: SqlitePool,
}

impl SqliteIdentityConfigRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_config(row: &sqlx::sqlite::SqliteRow) -> DbResult<TeamIdentityConfig> {
        let provider: String = row.get("provider");
        let provider = provider
            .parse::<SsoProvider>()
            .map_err(|e| DbError::Internal(format!("Invalid provider in database: {}", e)))?;

        let admin_groups_json: Option<String> = row.get("admin_groups");
        let admin_groups: Vec<String> = admin_groups_json
            .map(|json| serde_json::from_str(&json).unwrap_or_default())
            .unwrap_or_default();

        Ok(TeamIdentityConfig {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            team_id: parse_uuid(&row.get::<String, _>("team_id"))?,
            provider,
            idp_entity_id: row.get("idp_entity_id"),
            idp_sso_url: row.get("idp_sso_url"),
            idp_slo_url: row.get("idp_slo_url"),
            idp_certificate: row.get("idp_certificate"),
            email_attribute: row.get("email_attribute"),
            first_name_attribute: row.get("first_name_attribute"),
            last_name_attribute: row.get("last_name_attribute"),
            groups_attribute: row.get("groups_attribute"),
            admin_groups,
            require_sso: row.get::<i32, _>("require_sso") != 0,
            jit_provisioning: row.get::<i32, _>("jit_provisioning") != 0,
            allow_email_linking: row.get::<i32, _>("allow_email_linking") != 0,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

const CONFIG_COLUMNS: &str = "id, team_id, provider, idp_entity_id, idp_sso_url, idp_slo_url, \
     idp_certificate, email_attribute, first_name_attribute, last_name_attribute, \
     groups_attribute, admin_groups, require_sso, jit_provisioning, allow_email_linking, \
     created_at, updated_at";

#[async_trait]
impl IdentityConfigRepo for SqliteIdentityConfigRepo {
    async fn get_by_team(&self, team_id: Uuid) -> DbResult<Option<TeamIdentityConfig>> {
        let result = sqlx::query(&format!(
            "SELECT {} FROM team_identity_configs WHERE team_id = ?",
            CONFIG_COLUMNS
        ))
        .bind(team_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Ok(Some(Self::parse_config(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert(
        &self,
        team_id: Uuid,
        input: UpsertTeamIdentityConfig,
    ) -> DbResult<TeamIdentityConfig> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        let admin_groups_json = if input.admin_groups.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&input.admin_groups)?)
        };

        // One config per team: the team_id unique constraint turns a second
        // insert into a row replacement. created_at survives the replacement,
        // the row id does not.
        sqlx::query(
            r#"
            INSERT INTO team_identity_configs (
                id, team_id, provider, idp_entity_id, idp_sso_url, idp_slo_url,
                idp_certificate, email_attribute, first_name_attribute, last_name_attribute,
                groups_attribute, admin_groups, require_sso, jit_provisioning,
                allow_email_linking, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(team_id) DO UPDATE SET
                provider = excluded.provider,
                idp_entity_id = excluded.idp_entity_id,
                idp_sso_url = excluded.idp_sso_url,
                idp_slo_url = excluded.idp_slo_url,
                idp_certificate = excluded.idp_certificate,
                email_attribute = excluded.email_attribute,
                first_name_attribute = excluded.first_name_attribute,
                last_name_attribute = excluded.last_name_attribute,
                groups_attribute = excluded.groups_attribute,
                admin_groups = excluded.admin_groups,
                require_sso = excluded.require_sso,
                jit_provisioning = excluded.jit_provisioning,
                allow_email_linking = excluded.allow_email_linking,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id.to_string())
        .bind(team_id.to_string())
        .bind(input.provider.to_string())
        .bind(&input.idp_entity_id)
        .bind(&input.idp_sso_url)
        .bind(&input.idp_slo_url)
        .bind(&input.idp_certificate)
        .bind(&input.email_attribute)
        .bind(&input.first_name_attribute)
        .bind(&input.last_name_attribute)
        .bind(&input.groups_attribute)
        .bind(&admin_groups_json)
        .bind(input.require_sso as i32)
        .bind(input.jit_provisioning as i32)
        .bind(input.allow_email_linking as i32)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_by_team(team_id).await?.ok_or(DbError::NotFound)
    }

    async fn delete(&self, team_id: Uuid) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM team_identity_configs WHERE team_id = ?")
            .bind(team_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::test_util::{create_test_pool, create_test_team};

    fn make_input() -> UpsertTeamIdentityConfig {
        UpsertTeamIdentityConfig {
            provider: SsoProvider::Okta,
            idp_entity_id: "https://idp.example.com/metadata".to_string(),
            idp_sso_url: "https://idp.example.com/sso".to_string(),
            idp_slo_url: Some("https://idp.example.com/slo".to_string()),
            idp_certificate: "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----"
                .to_string(),
            email_attribute: Some("email".to_string()),
            first_name_attribute: Some("firstName".to_string()),
            last_name_attribute: Some("lastName".to_string()),
            groups_attribute: Some("groups".to_string()),
            admin_groups: vec!["doc-admins".to_string()],
            require_sso: false,
            jit_provisioning: true,
            allow_email_linking: true,
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_config() {
        let pool = create_test_pool().await;
        let team_id = create_test_team(&pool, "acme").await;
        let repo = SqliteIdentityConfigRepo::new(pool);

        let config = repo.upsert(team_id, make_input()).await.unwrap();

        assert_eq!(config.team_id, team_id);
        assert_eq!(config.provider, SsoProvider::Okta);
        assert_eq!(config.admin_groups, vec!["doc-admins"]);
        assert!(config.jit_provisioning);
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing() {
        let pool = create_test_pool().await;
        let team_id = create_test_team(&pool, "acme").await;
        let repo = SqliteIdentityConfigRepo::new(pool);

        repo.upsert(team_id, make_input()).await.unwrap();

        let mut replacement = make_input();
        replacement.idp_sso_url = "https://other-idp.example.com/sso".to_string();
        replacement.jit_provisioning = false;
        repo.upsert(team_id, replacement).await.unwrap();

        let config = repo
            .get_by_team(team_id)
            .await
            .unwrap()
            .expect("Should exist");
        assert_eq!(config.idp_sso_url, "https://other-idp.example.com/sso");
        assert!(!config.jit_provisioning);
    }

    #[tokio::test]
    async fn test_get_by_team_absent() {
        let pool = create_test_pool().await;
        let repo = SqliteIdentityConfigRepo::new(pool);

        assert!(repo.get_by_team(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let pool = create_test_pool().await;
        let team_id = create_test_team(&pool, "acme").await;
        let repo = SqliteIdentityConfigRepo::new(pool);

        repo.upsert(team_id, make_input()).await.unwrap();
        repo.delete(team_id).await.unwrap();

        assert!(repo.get_by_team(team_id).await.unwrap().is_none());
        assert!(matches!(repo.delete(team_id).await, Err(DbError::NotFound)));
    }

    #[tokio::test]
    async fn test_empty_admin_groups_round_trips() {
        let pool = create_test_pool().await;
        let team_id = create_test_team(&pool, "acme").await;
        let repo = SqliteIdentityConfigRepo::new(pool);

        let mut input = make_input();
        input.admin_groups = vec![];
        let config = repo.upsert(team_id, input).await.unwrap();
        assert!(config.admin_groups.is_empty());
    }
}
