use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{error::DbResult, repos::SsoSessionRepo},
    models::SsoSession,
};

pub struct SqliteSsoSessionRepo {
    pool: SqlitePool,
}

impl SqliteSsoSessionRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_sso_session(row: &sqlx::sqlite::SqliteRow) -> DbResult<SsoSession> {
        Ok(SsoSession {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            account_id: parse_uuid(&row.get::<String, _>("account_id"))?,
            team_id: parse_uuid(&row.get::<String, _>("team_id"))?,
            idp_session_index: row.get("idp_session_index"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl SsoSessionRepo for SqliteSsoSessionRepo {
    async fn create(
        &self,
        account_id: Uuid,
        team_id: Uuid,
        idp_session_index: Option<&str>,
    ) -> DbResult<SsoSession> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO sso_sessions (id, account_id, team_id, idp_session_index, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(account_id.to_string())
        .bind(team_id.to_string())
        .bind(idp_session_index)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(SsoSession {
            id,
            account_id,
            team_id,
            idp_session_index: idp_session_index.map(String::from),
            created_at: now,
        })
    }

    async fn list_by_account(&self, account_id: Uuid) -> DbResult<Vec<SsoSession>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, team_id, idp_session_index, created_at
            FROM sso_sessions
            WHERE account_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_sso_session).collect()
    }

    async fn delete_all_for_account(&self, account_id: Uuid) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM sso_sessions WHERE account_id = ?")
            .bind(account_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
