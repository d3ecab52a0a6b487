//! Identity resolution and JIT provisioning.
//!
//! Maps a validated external identity onto an internal account without
//! creating duplicates: match by `(sso_id, provider)`, else by email, else
//! create. Concurrent logins for the same new identity are expected (two
//! browser tabs finishing SSO at once); the unique constraints on email and
//! on the SSO identity pair are the arbiter, and a losing insert is retried
//! once as a lookup rather than surfaced as an error.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    auth::{AuthError, IdentityAssertion},
    db::{AccountRepo, DbError, IdentityConfigRepo, TeamRepo},
    models::{
        Account, CreateAccount, CreateAuditEvent, ExternalUser, MembershipSource, SsoProvider,
        TeamIdentityConfig, TeamRole, UpdateAccount, actions,
    },
    services::audit::SharedAuditSink,
};

/// Outcome of resolving an assertion to an account.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub account: Account,
    pub is_new_account: bool,
    pub role: TeamRole,
}

/// Map asserted groups to a team role.
///
/// `admin` iff the intersection with the configured admin groups is
/// non-empty. Matching is case-sensitive and exact; empty or missing groups
/// yield `member`.
pub fn map_groups_to_role(groups: &[String], admin_groups: &[String]) -> TeamRole {
    if groups.iter().any(|g| admin_groups.iter().any(|a| a == g)) {
        TeamRole::Admin
    } else {
        TeamRole::Member
    }
}

pub struct IdentityResolver {
    accounts: Arc<dyn AccountRepo>,
    teams: Arc<dyn TeamRepo>,
    configs: Arc<dyn IdentityConfigRepo>,
    audit: SharedAuditSink,
}

impl IdentityResolver {
    pub fn new(
        accounts: Arc<dyn AccountRepo>,
        teams: Arc<dyn TeamRepo>,
        configs: Arc<dyn IdentityConfigRepo>,
        audit: SharedAuditSink,
    ) -> Self {
        Self {
            accounts,
            teams,
            configs,
            audit,
        }
    }

    /// Resolve a validated assertion to an account and team membership.
    ///
    /// Idempotent for a given `(name_id, provider)`; safe under concurrent
    /// invocation for the same identity.
    pub async fn resolve(
        &self,
        team_id: Uuid,
        config: &TeamIdentityConfig,
        assertion: &IdentityAssertion,
    ) -> Result<Resolution, AuthError> {
        let display_name = join_name(assertion.first_name.as_deref(), assertion.last_name.as_deref());

        let (account, is_new_account) = self
            .resolve_account(
                team_id,
                config.provider,
                &assertion.name_id,
                &assertion.email,
                display_name,
                config.jit_provisioning,
                config.allow_email_linking,
            )
            .await?;

        let role = self
            .ensure_membership(
                team_id,
                &account,
                map_groups_to_role(&assertion.groups, &config.admin_groups),
                config.jit_provisioning,
                MembershipSource::Jit,
            )
            .await?;

        Ok(Resolution {
            account,
            is_new_account,
            role,
        })
    }

    /// Match-or-create an account for an external identity.
    #[allow(clippy::too_many_arguments)]
    async fn resolve_account(
        &self,
        team_id: Uuid,
        provider: SsoProvider,
        name_id: &str,
        email: &str,
        display_name: Option<String>,
        jit_provisioning: bool,
        allow_email_linking: bool,
    ) -> Result<(Account, bool), AuthError> {
        // 1. Exact external identity match
        if let Some(account) = self.accounts.get_by_sso_identity(name_id, provider).await? {
            let account = self
                .refresh_attributes(account, email, display_name, team_id)
                .await?;
            return Ok((account, false));
        }

        // 2. Email match: links the asserted identity onto a pre-existing
        //    account. Gated per team because an IdP that does not verify
        //    email ownership can otherwise take over local accounts.
        if allow_email_linking
            && let Some(account) = self.accounts.get_by_email(email).await?
        {
            match self
                .accounts
                .update(
                    account.id,
                    UpdateAccount {
                        sso_id: Some(name_id.to_string()),
                        sso_provider: Some(provider),
                        sso_team_id: Some(team_id),
                        name: display_name,
                        ..Default::default()
                    },
                )
                .await
            {
                Ok(account) => {
                    tracing::info!(
                        account_id = %account.id,
                        provider = %provider,
                        "Linked existing account to SSO identity by email match"
                    );
                    self.audit.record(CreateAuditEvent {
                        team_id: Some(team_id),
                        actor_account_id: Some(account.id),
                        details: serde_json::json!({ "provider": provider.as_str() }),
                        ..CreateAuditEvent::new(actions::ACCOUNT_SSO_LINKED, "account", account.id)
                    });
                    return Ok((account, false));
                }
                // Another login claimed this identity pair first
                Err(DbError::Conflict(_)) => {
                    if let Some(account) =
                        self.accounts.get_by_sso_identity(name_id, provider).await?
                    {
                        return Ok((account, false));
                    }
                    return Err(AuthError::Storage(
                        "SSO identity conflict could not be resolved".to_string(),
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }

        // 3. Unknown identity: create, gated by the JIT flag
        if !jit_provisioning {
            return Err(AuthError::ProvisioningDisabled);
        }

        match self
            .accounts
            .create(CreateAccount {
                email: email.to_string(),
                name: display_name,
                sso_id: Some(name_id.to_string()),
                sso_provider: Some(provider),
                sso_team_id: Some(team_id),
            })
            .await
        {
            Ok(account) => {
                tracing::info!(
                    account_id = %account.id,
                    provider = %provider,
                    "Provisioned new account from SSO login"
                );
                self.audit.record(CreateAuditEvent {
                    team_id: Some(team_id),
                    actor_account_id: Some(account.id),
                    details: serde_json::json!({ "provider": provider.as_str() }),
                    ..CreateAuditEvent::new(actions::ACCOUNT_PROVISIONED, "account", account.id)
                });
                Ok((account, true))
            }
            // Lost the creation race to a concurrent login: retry once as a
            // lookup before giving up.
            Err(DbError::Conflict(_)) => {
                if let Some(account) = self.accounts.get_by_sso_identity(name_id, provider).await? {
                    return Ok((account, false));
                }
                if allow_email_linking
                    && let Some(account) = self.accounts.get_by_email(email).await?
                {
                    return Ok((account, false));
                }
                Err(AuthError::Storage(
                    "Account creation conflicted but no matching account was found".to_string(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Refresh email/name/team on an already-linked account.
    ///
    /// An email collision here (the IdP now asserts an address owned by a
    /// different account) keeps the old address rather than failing login.
    async fn refresh_attributes(
        &self,
        account: Account,
        email: &str,
        display_name: Option<String>,
        team_id: Uuid,
    ) -> Result<Account, AuthError> {
        let update = UpdateAccount {
            email: Some(email.to_string()),
            name: display_name.clone(),
            sso_team_id: Some(team_id),
            ..Default::default()
        };

        match self.accounts.update(account.id, update).await {
            Ok(account) => Ok(account),
            Err(DbError::Conflict(_)) => {
                tracing::warn!(
                    account_id = %account.id,
                    "Asserted email belongs to a different account; keeping existing address"
                );
                let update = UpdateAccount {
                    name: display_name,
                    sso_team_id: Some(team_id),
                    ..Default::default()
                };
                Ok(self.accounts.update(account.id, update).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ensure a membership row exists; create one when JIT allows it.
    ///
    /// An existing membership always wins; JIT never downgrades or upgrades
    /// a role that was granted earlier.
    async fn ensure_membership(
        &self,
        team_id: Uuid,
        account: &Account,
        jit_role: TeamRole,
        jit_provisioning: bool,
        source: MembershipSource,
    ) -> Result<TeamRole, AuthError> {
        if let Some(membership) = self.teams.get_membership(team_id, account.id).await? {
            return Ok(membership.role);
        }

        if !jit_provisioning {
            return Err(AuthError::NotATeamMember);
        }

        match self
            .teams
            .add_member(team_id, account.id, jit_role, source)
            .await
        {
            Ok(()) => Ok(jit_role),
            // Concurrent login created the membership first
            Err(DbError::Conflict(_)) => {
                let membership = self
                    .teams
                    .get_membership(team_id, account.id)
                    .await?
                    .ok_or_else(|| {
                        AuthError::Storage(
                            "Membership creation conflicted but no row was found".to_string(),
                        )
                    })?;
                Ok(membership.role)
            }
            Err(e) => Err(e.into()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Directory-sync collaborator interface (SCIM façade)
    // ─────────────────────────────────────────────────────────────────────

    /// Provision or update an account from a directory push.
    ///
    /// Same uniqueness semantics as SSO resolution. The directory explicitly
    /// asserted the user, so the JIT gate does not apply; the team's
    /// identity config (when present) supplies the provider and admin-group
    /// mapping.
    pub async fn provision_or_update_account(
        &self,
        team_id: Uuid,
        external: &ExternalUser,
    ) -> Result<Account, AuthError> {
        let config = self.configs.get_by_team(team_id).await?;
        let provider = config.as_ref().map(|c| c.provider).unwrap_or_default();
        let admin_groups = config.map(|c| c.admin_groups).unwrap_or_default();

        let (account, _) = self
            .resolve_account(
                team_id,
                provider,
                &external.external_id,
                &external.email,
                external.name.clone(),
                true,
                true,
            )
            .await?;

        self.ensure_membership(
            team_id,
            &account,
            map_groups_to_role(&external.groups, &admin_groups),
            true,
            MembershipSource::Scim,
        )
        .await?;

        Ok(account)
    }

    /// Remove a directory-synced user's team membership. The account itself
    /// is never deleted. Idempotent: deprovisioning a non-member is a no-op.
    pub async fn deprovision_account(
        &self,
        team_id: Uuid,
        account_id: Uuid,
    ) -> Result<(), AuthError> {
        match self.teams.remove_member(team_id, account_id).await {
            Ok(()) => {
                self.audit.record(CreateAuditEvent {
                    team_id: Some(team_id),
                    ..CreateAuditEvent::new(actions::ACCOUNT_DEPROVISIONED, "account", account_id)
                });
                Ok(())
            }
            Err(DbError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn join_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    match (first, last) {
        (Some(f), Some(l)) => Some(format!("{} {}", f, l)),
        (Some(f), None) => Some(f.to_string()),
        (None, Some(l)) => Some(l.to_string()),
        (None, None) => None,
    }
}
