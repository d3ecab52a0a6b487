use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::AccountRepo,
    },
    models::{Account, CreateAccount, SsoProvider, UpdateAccount},
};

pub struct SqliteAccountRepo {
    pool: SqlitePool,
}

impl SqliteAccountRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Parse an Account from a database row.
    fn parse_account(row: &sqlx::sqlite::SqliteRow) -> DbResult<Account> {
        let sso_provider: Option<String> = row.get("sso_provider");
        let sso_provider = sso_provider
            .map(|s| {
                s.parse::<SsoProvider>()
                    .map_err(|e| DbError::Internal(format!("Invalid provider in database: {}", e)))
            })
            .transpose()?;

        let sso_team_id: Option<String> = row.get("sso_team_id");
        let sso_team_id = sso_team_id.map(|s| parse_uuid(&s)).transpose()?;

        Ok(Account {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            email: row.get("email"),
            name: row.get("name"),
            sso_id: row.get("sso_id"),
            sso_provider,
            sso_team_id,
            plan: row.get("plan"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

const ACCOUNT_COLUMNS: &str =
    "id, email, name, sso_id, sso_provider, sso_team_id, plan, created_at, updated_at";

#[async_trait]
impl AccountRepo for SqliteAccountRepo {
    async fn create(&self, input: CreateAccount) -> DbResult<Account> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let email = input.email.to_lowercase();

        sqlx::query(
            r#"
            INSERT INTO accounts (id, email, name, sso_id, sso_provider, sso_team_id, plan, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 'free', ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&email)
        .bind(&input.name)
        .bind(&input.sso_id)
        .bind(input.sso_provider.map(|p| p.to_string()))
        .bind(input.sso_team_id.map(|t| t.to_string()))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict("Account with this email or SSO identity already exists".into())
            }
            _ => DbError::from(e),
        })?;

        Ok(Account {
            id,
            email,
            name: input.name,
            sso_id: input.sso_id,
            sso_provider: input.sso_provider,
            sso_team_id: input.sso_team_id,
            plan: "free".to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Account>> {
        let result = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE id = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Ok(Some(Self::parse_account(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_by_email(&self, email: &str) -> DbResult<Option<Account>> {
        let result = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE email = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Ok(Some(Self::parse_account(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_by_sso_identity(
        &self,
        sso_id: &str,
        provider: SsoProvider,
    ) -> DbResult<Option<Account>> {
        let result = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE sso_id = ? AND sso_provider = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(sso_id)
        .bind(provider.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Ok(Some(Self::parse_account(&row)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, id: Uuid, input: UpdateAccount) -> DbResult<Account> {
        let now = chrono::Utc::now();
        let existing = self.get_by_id(id).await?.ok_or(DbError::NotFound)?;

        let email = input
            .email
            .map(|e| e.to_lowercase())
            .unwrap_or(existing.email);
        let name = input.name.or(existing.name);
        let sso_id = input.sso_id.or(existing.sso_id);
        let sso_provider = input.sso_provider.or(existing.sso_provider);
        let sso_team_id = input.sso_team_id.or(existing.sso_team_id);

        sqlx::query(
            r#"
            UPDATE accounts
            SET email = ?, name = ?, sso_id = ?, sso_provider = ?, sso_team_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&email)
        .bind(&name)
        .bind(&sso_id)
        .bind(sso_provider.map(|p| p.to_string()))
        .bind(sso_team_id.map(|t| t.to_string()))
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict("Account with this email or SSO identity already exists".into())
            }
            _ => DbError::from(e),
        })?;

        Ok(Account {
            id,
            email,
            name,
            sso_id,
            sso_provider,
            sso_team_id,
            plan: existing.plan,
            created_at: existing.created_at,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::test_util::{create_test_pool, create_test_team};

    fn make_input(email: &str) -> CreateAccount {
        CreateAccount {
            email: email.to_string(),
            name: Some("Test User".to_string()),
            sso_id: None,
            sso_provider: None,
            sso_team_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_lowercases_email() {
        let pool = create_test_pool().await;
        let repo = SqliteAccountRepo::new(pool);

        let account = repo
            .create(make_input("Alice@Example.COM"))
            .await
            .expect("Failed to create account");

        assert_eq!(account.email, "alice@example.com");
        assert_eq!(account.plan, "free");
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let pool = create_test_pool().await;
        let repo = SqliteAccountRepo::new(pool);

        repo.create(make_input("alice@example.com")).await.unwrap();
        let result = repo.create(make_input("ALICE@example.com")).await;
        assert!(matches!(result, Err(DbError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_duplicate_sso_identity_conflicts() {
        let pool = create_test_pool().await;
        let repo = SqliteAccountRepo::new(pool);

        let mut input = make_input("alice@example.com");
        input.sso_id = Some("idp-user-1".to_string());
        input.sso_provider = Some(SsoProvider::Okta);
        repo.create(input).await.unwrap();

        let mut other = make_input("bob@example.com");
        other.sso_id = Some("idp-user-1".to_string());
        other.sso_provider = Some(SsoProvider::Okta);
        let result = repo.create(other).await;
        assert!(matches!(result, Err(DbError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_same_sso_id_different_provider_allowed() {
        let pool = create_test_pool().await;
        let repo = SqliteAccountRepo::new(pool);

        let mut input = make_input("alice@example.com");
        input.sso_id = Some("idp-user-1".to_string());
        input.sso_provider = Some(SsoProvider::Okta);
        repo.create(input).await.unwrap();

        let mut other = make_input("bob@example.com");
        other.sso_id = Some("idp-user-1".to_string());
        other.sso_provider = Some(SsoProvider::Azure);
        assert!(repo.create(other).await.is_ok());
    }

    #[tokio::test]
    async fn test_get_by_email_is_case_insensitive() {
        let pool = create_test_pool().await;
        let repo = SqliteAccountRepo::new(pool);

        let created = repo.create(make_input("alice@example.com")).await.unwrap();
        let found = repo
            .get_by_email("Alice@Example.com")
            .await
            .unwrap()
            .expect("Should find account");
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn test_get_by_sso_identity() {
        let pool = create_test_pool().await;
        let repo = SqliteAccountRepo::new(pool);

        let mut input = make_input("alice@example.com");
        input.sso_id = Some("idp-user-1".to_string());
        input.sso_provider = Some(SsoProvider::Okta);
        let created = repo.create(input).await.unwrap();

        let found = repo
            .get_by_sso_identity("idp-user-1", SsoProvider::Okta)
            .await
            .unwrap()
            .expect("Should find account");
        assert_eq!(found.id, created.id);

        // Wrong provider finds nothing
        let missing = repo
            .get_by_sso_identity("idp-user-1", SsoProvider::Google)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_update_links_sso_identity() {
        let pool = create_test_pool().await;
        let team_id = create_test_team(&pool, "acme").await;
        let repo = SqliteAccountRepo::new(pool);

        let created = repo.create(make_input("alice@example.com")).await.unwrap();
        assert!(created.sso_id.is_none());

        let updated = repo
            .update(
                created.id,
                UpdateAccount {
                    sso_id: Some("idp-user-1".to_string()),
                    sso_provider: Some(SsoProvider::Okta),
                    sso_team_id: Some(team_id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.sso_id.as_deref(), Some("idp-user-1"));
        assert_eq!(updated.sso_provider, Some(SsoProvider::Okta));
        assert_eq!(updated.sso_team_id, Some(team_id));
        // Untouched fields survive
        assert_eq!(updated.email, "alice@example.com");
        assert_eq!(updated.name.as_deref(), Some("Test User"));
    }

    #[tokio::test]
    async fn test_update_not_found() {
        let pool = create_test_pool().await;
        let repo = SqliteAccountRepo::new(pool);

        let result = repo.update(Uuid::new_v4(), UpdateAccount::default()).await;
        assert!(matches!(result, Err(DbError::NotFound)));
    }
}
