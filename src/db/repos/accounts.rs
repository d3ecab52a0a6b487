use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{Account, CreateAccount, SsoProvider, UpdateAccount},
};

#[async_trait]
pub trait AccountRepo: Send + Sync {
    /// Create an account. Returns `DbError::Conflict` when the email or the
    /// `(sso_id, sso_provider)` pair already exists; callers performing JIT
    /// provisioning retry that case as a lookup.
    async fn create(&self, input: CreateAccount) -> DbResult<Account>;

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Account>>;

    /// Case-insensitive email lookup (emails are stored lowercased).
    async fn get_by_email(&self, email: &str) -> DbResult<Option<Account>>;

    /// Lookup by the external identity pair asserted by an IdP.
    async fn get_by_sso_identity(
        &self,
        sso_id: &str,
        provider: SsoProvider,
    ) -> DbResult<Option<Account>>;

    /// Apply a partial update; `None` fields are left untouched.
    async fn update(&self, id: Uuid, input: UpdateAccount) -> DbResult<Account>;
}
