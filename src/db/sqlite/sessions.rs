use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{error::DbResult, repos::SessionRepo},
    models::Session,
};

pub struct SqliteSessionRepo {
    pool: SqlitePool,
}

impl SqliteSessionRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_session(row: &sqlx::sqlite::SqliteRow) -> DbResult<Session> {
        Ok(Session {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            account_id: parse_uuid(&row.get::<String, _>("account_id"))?,
            token_hash: row.get("token_hash"),
            expires_at: row.get("expires_at"),
            last_active_at: row.get("last_active_at"),
            ip_address: row.get("ip_address"),
            user_agent: row.get("user_agent"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl SessionRepo for SqliteSessionRepo {
    async fn create(&self, session: &Session) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, account_id, token_hash, expires_at, last_active_at,
                                  ip_address, user_agent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.id.to_string())
        .bind(session.account_id.to_string())
        .bind(&session.token_hash)
        .bind(session.expires_at)
        .bind(session.last_active_at)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_token_hash(&self, token_hash: &str) -> DbResult<Option<Session>> {
        let result = sqlx::query(
            r#"
            SELECT id, account_id, token_hash, expires_at, last_active_at,
                   ip_address, user_agent, created_at
            FROM sessions
            WHERE token_hash = ?
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Ok(Some(Self::parse_session(&row)?)),
            None => Ok(None),
        }
    }

    async fn touch_last_active(&self, id: Uuid, at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE sessions SET last_active_at = ? WHERE id = ?")
            .bind(at)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_by_token_hash(&self, token_hash: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_all_for_account(&self, account_id: Uuid) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE account_id = ?")
            .bind(account_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
