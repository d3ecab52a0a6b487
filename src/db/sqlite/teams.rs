use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::TeamRepo,
    },
    models::{CreateTeam, MembershipSource, Team, TeamMembership, TeamRole},
};

pub struct SqliteTeamRepo {
    pool: SqlitePool,
}

impl SqliteTeamRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_team(row: &sqlx::sqlite::SqliteRow) -> DbResult<Team> {
        Ok(Team {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            slug: row.get("slug"),
            name: row.get("name"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn parse_membership(row: &sqlx::sqlite::SqliteRow) -> DbResult<TeamMembership> {
        let role: String = row.get("role");
        let source: String = row.get("source");
        Ok(TeamMembership {
            team_id: parse_uuid(&row.get::<String, _>("team_id"))?,
            account_id: parse_uuid(&row.get::<String, _>("account_id"))?,
            role: role
                .parse::<TeamRole>()
                .map_err(|e| DbError::Internal(format!("Invalid role in database: {}", e)))?,
            source: source
                .parse::<MembershipSource>()
                .map_err(|e| DbError::Internal(format!("Invalid source in database: {}", e)))?,
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl TeamRepo for SqliteTeamRepo {
    async fn create(&self, input: CreateTeam) -> DbResult<Team> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        sqlx::query(
            "INSERT INTO teams (id, slug, name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&input.slug)
        .bind(&input.name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(format!("Team slug '{}' already exists", input.slug))
            }
            _ => DbError::from(e),
        })?;

        Ok(Team {
            id,
            slug: input.slug,
            name: input.name,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Team>> {
        let result =
            sqlx::query("SELECT id, slug, name, created_at, updated_at FROM teams WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        match result {
            Some(row) => Ok(Some(Self::parse_team(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_by_slug(&self, slug: &str) -> DbResult<Option<Team>> {
        let result =
            sqlx::query("SELECT id, slug, name, created_at, updated_at FROM teams WHERE slug = ?")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;

        match result {
            Some(row) => Ok(Some(Self::parse_team(&row)?)),
            None => Ok(None),
        }
    }

    async fn add_member(
        &self,
        team_id: Uuid,
        account_id: Uuid,
        role: TeamRole,
        source: MembershipSource,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO team_memberships (team_id, account_id, role, source, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(team_id.to_string())
        .bind(account_id.to_string())
        .bind(role.to_string())
        .bind(source.to_string())
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict("Account is already a member of this team".into())
            }
            _ => DbError::from(e),
        })?;

        Ok(())
    }

    async fn get_membership(
        &self,
        team_id: Uuid,
        account_id: Uuid,
    ) -> DbResult<Option<TeamMembership>> {
        let result = sqlx::query(
            r#"
            SELECT team_id, account_id, role, source, created_at
            FROM team_memberships
            WHERE team_id = ? AND account_id = ?
            "#,
        )
        .bind(team_id.to_string())
        .bind(account_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Ok(Some(Self::parse_membership(&row)?)),
            None => Ok(None),
        }
    }

    async fn remove_member(&self, team_id: Uuid, account_id: Uuid) -> DbResult<()> {
        let result =
            sqlx::query("DELETE FROM team_memberships WHERE team_id = ? AND account_id = ?")
                .bind(team_id.to_string())
                .bind(account_id.to_string())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }

    async fn list_members(&self, team_id: Uuid) -> DbResult<Vec<TeamMembership>> {
        let rows = sqlx::query(
            r#"
            SELECT team_id, account_id, role, source, created_at
            FROM team_memberships
            WHERE team_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(team_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_membership).collect()
    }
}
