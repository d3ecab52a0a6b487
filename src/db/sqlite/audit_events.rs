use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{error::DbResult, repos::AuditEventRepo},
    models::{AuditEvent, CreateAuditEvent},
};

pub struct SqliteAuditEventRepo {
    pool: SqlitePool,
}

impl SqliteAuditEventRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_event(row: &sqlx::sqlite::SqliteRow) -> DbResult<AuditEvent> {
        let actor: Option<String> = row.get("actor_account_id");
        let actor_account_id = actor.map(|s| parse_uuid(&s)).transpose()?;
        let team: Option<String> = row.get("team_id");
        let team_id = team.map(|s| parse_uuid(&s)).transpose()?;
        let details: String = row.get("details");

        Ok(AuditEvent {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            timestamp: row.get("timestamp"),
            action: row.get("action"),
            resource_type: row.get("resource_type"),
            resource_id: parse_uuid(&row.get::<String, _>("resource_id"))?,
            actor_account_id,
            team_id,
            details: serde_json::from_str(&details).unwrap_or(serde_json::Value::Null),
            ip_address: row.get("ip_address"),
            user_agent: row.get("user_agent"),
        })
    }
}

#[async_trait]
impl AuditEventRepo for SqliteAuditEventRepo {
    async fn create(&self, input: CreateAuditEvent) -> DbResult<AuditEvent> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let details = serde_json::to_string(&input.details)?;

        sqlx::query(
            r#"
            INSERT INTO audit_events (id, timestamp, action, resource_type, resource_id,
                                      actor_account_id, team_id, details, ip_address, user_agent)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(now)
        .bind(&input.action)
        .bind(&input.resource_type)
        .bind(input.resource_id.to_string())
        .bind(input.actor_account_id.map(|a| a.to_string()))
        .bind(input.team_id.map(|t| t.to_string()))
        .bind(&details)
        .bind(&input.ip_address)
        .bind(&input.user_agent)
        .execute(&self.pool)
        .await?;

        Ok(AuditEvent {
            id,
            timestamp: now,
            action: input.action,
            resource_type: input.resource_type,
            resource_id: input.resource_id,
            actor_account_id: input.actor_account_id,
            team_id: input.team_id,
            details: input.details,
            ip_address: input.ip_address,
            user_agent: input.user_agent,
        })
    }

    async fn list_by_team(&self, team_id: Uuid, limit: i64) -> DbResult<Vec<AuditEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, timestamp, action, resource_type, resource_id,
                   actor_account_id, team_id, details, ip_address, user_agent
            FROM audit_events
            WHERE team_id = ?
            ORDER BY timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(team_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_event).collect()
    }
}
