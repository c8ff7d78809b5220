//! `SeaORM` implementation of the `AccountLifecycle` trait.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::{Store, WriteOutcome};
use crate::domain::{
    AccessSnapshot, Account, AccountId, ActiveAccount, Role, is_plausible_email, normalize_email,
};
use crate::services::identity_service::{IdentityError, IdentityProvider};
use crate::services::lifecycle_service::{AccountLifecycle, LifecycleError};
use crate::services::notify::{EmailRelay, pending_account_email};

pub struct SeaOrmAccountLifecycle {
    store: Store,
    identity: Arc<dyn IdentityProvider>,
    relay: Arc<dyn EmailRelay>,
    approval_recipients: Vec<String>,
}

impl SeaOrmAccountLifecycle {
    #[must_use]
    pub fn new(
        store: Store,
        identity: Arc<dyn IdentityProvider>,
        relay: Arc<dyn EmailRelay>,
        approval_recipients: Vec<String>,
    ) -> Self {
        Self {
            store,
            identity,
            relay,
            approval_recipients,
        }
    }

    async fn notify_pending(&self, account: &Account) {
        if self.approval_recipients.is_empty() {
            return;
        }

        let message = pending_account_email(account, &self.approval_recipients);
        if let Err(e) = self.relay.send(message).await {
            warn!(account_id = %account.id, error = %e, "Failed to relay pending-account notice");
        }
    }

    /// Creates the profile for fresh credentials, undoing the credentials if
    /// the profile cannot be written.
    async fn create_profile_or_undo(
        &self,
        account_id: &AccountId,
        email: &str,
        full_name: Option<String>,
    ) -> Result<Account, LifecycleError> {
        match self
            .store
            .insert_profile(account_id.as_str(), email, full_name)
            .await
        {
            Ok(account) => Ok(account),
            Err(e) => {
                if let Err(undo) = self.identity.delete_identity(account_id).await {
                    error!(
                        account_id = %account_id,
                        error = %undo,
                        "Failed to remove credentials after profile insert failure"
                    );
                }
                Err(LifecycleError::TransactionFailed(e.to_string()))
            }
        }
    }
}

fn validate_email(email: &str) -> Result<(), LifecycleError> {
    if is_plausible_email(email) {
        Ok(())
    } else {
        Err(LifecycleError::Validation("Invalid email address".to_string()))
    }
}

fn clean_name(full_name: Option<String>) -> Option<String> {
    full_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

fn outcome_label(outcome: WriteOutcome) -> &'static str {
    match outcome {
        WriteOutcome::Applied => "applied",
        WriteOutcome::NotAuthorized => "forbidden",
        WriteOutcome::NotFound => "not_found",
        WriteOutcome::AlreadyHasRole => "already_has_role",
        WriteOutcome::HasRole => "has_role",
    }
}

fn into_result(operation: &'static str, outcome: WriteOutcome) -> Result<(), LifecycleError> {
    metrics::counter!(
        "account_lifecycle_operations_total",
        "operation" => operation,
        "result" => outcome_label(outcome)
    )
    .increment(1);

    match outcome {
        WriteOutcome::Applied => Ok(()),
        WriteOutcome::NotAuthorized => Err(LifecycleError::Forbidden),
        WriteOutcome::NotFound => Err(LifecycleError::NotFound),
        WriteOutcome::AlreadyHasRole => Err(LifecycleError::AlreadyHasRole),
        WriteOutcome::HasRole => Err(LifecycleError::InvalidState(
            "Account holds a role; revoke it before deleting the account".to_string(),
        )),
    }
}

fn map_identity_error(err: IdentityError) -> LifecycleError {
    match err {
        IdentityError::EmailTaken => LifecycleError::DuplicateAccount,
        IdentityError::Validation(msg) => LifecycleError::Validation(msg),
        other => LifecycleError::Store(other.to_string()),
    }
}

#[async_trait]
impl AccountLifecycle for SeaOrmAccountLifecycle {
    async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: Option<String>,
    ) -> Result<Account, LifecycleError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        let full_name = clean_name(full_name);

        if self.store.get_profile_by_email(&email).await?.is_some() {
            return Err(LifecycleError::DuplicateAccount);
        }

        let account_id = self
            .identity
            .sign_up(&email, password, full_name.clone())
            .await
            .map_err(map_identity_error)?;

        let account = self
            .create_profile_or_undo(&account_id, &email, full_name)
            .await?;

        info!(account_id = %account.id, "Account registered, awaiting approval");
        metrics::counter!("account_registrations_total").increment(1);

        self.notify_pending(&account).await;
        Ok(account)
    }

    async fn approve_and_assign(
        &self,
        target: &AccountId,
        role: Role,
        approver: &AccountId,
    ) -> Result<(), LifecycleError> {
        let outcome = self
            .store
            .approve_and_assign(target.as_str(), role, approver.as_str())
            .await?;

        into_result("approve", outcome)?;
        info!(account_id = %target, role = %role, approved_by = %approver, "Account approved");
        Ok(())
    }

    async fn change_role(
        &self,
        target: &AccountId,
        new_role: Role,
        approver: &AccountId,
    ) -> Result<(), LifecycleError> {
        if target == approver {
            return Err(LifecycleError::SelfModification);
        }

        let outcome = self
            .store
            .change_role(target.as_str(), new_role, approver.as_str())
            .await?;

        into_result("change_role", outcome)?;
        info!(account_id = %target, role = %new_role, changed_by = %approver, "Role changed");
        Ok(())
    }

    async fn revoke_role(
        &self,
        target: &AccountId,
        approver: &AccountId,
    ) -> Result<(), LifecycleError> {
        if target == approver {
            return Err(LifecycleError::SelfModification);
        }

        let outcome = self
            .store
            .revoke_role(target.as_str(), approver.as_str())
            .await?;

        into_result("revoke", outcome)?;
        info!(account_id = %target, revoked_by = %approver, "Role revoked");
        Ok(())
    }

    async fn reject(
        &self,
        target: &AccountId,
        approver: &AccountId,
    ) -> Result<(), LifecycleError> {
        let outcome = self
            .store
            .reject_profile(target.as_str(), approver.as_str())
            .await?;

        into_result("reject", outcome)?;

        // Frees the email for a fresh registration. A leftover identity can
        // only ever reach `profile_not_found`, so failure here is not fatal.
        if let Err(e) = self.identity.delete_identity(target).await {
            error!(account_id = %target, error = %e, "Failed to remove credentials of rejected account");
        }

        info!(account_id = %target, rejected_by = %approver, "Pending account rejected");
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<Account>, LifecycleError> {
        Ok(self.store.list_pending_profiles().await?)
    }

    async fn list_active(&self) -> Result<Vec<ActiveAccount>, LifecycleError> {
        Ok(self.store.list_active_accounts().await?)
    }

    async fn find_account(&self, id: &AccountId) -> Result<Option<Account>, LifecycleError> {
        Ok(self.store.get_profile(id.as_str()).await?)
    }

    async fn find_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Account>, LifecycleError> {
        Ok(self
            .store
            .get_profile_by_email(&normalize_email(email))
            .await?)
    }

    async fn role_of(&self, id: &AccountId) -> Result<Option<Role>, LifecycleError> {
        Ok(self.store.get_role(id.as_str()).await?)
    }

    async fn access_snapshot(
        &self,
        id: &AccountId,
    ) -> Result<Option<AccessSnapshot>, LifecycleError> {
        let Some(account) = self.store.get_profile(id.as_str()).await? else {
            return Ok(None);
        };
        let role = self.store.get_role(id.as_str()).await?;
        Ok(Some(AccessSnapshot { account, role }))
    }

    async fn bootstrap_super_admin(
        &self,
        email: &str,
        password: &str,
        full_name: Option<String>,
    ) -> Result<Account, LifecycleError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        let full_name = clean_name(full_name);

        let existing = self.store.list_active_accounts().await?;
        if existing.iter().any(|a| a.role == Role::SuperAdmin) {
            return Err(LifecycleError::InvalidState(
                "A super administrator already exists".to_string(),
            ));
        }

        // An existing registration keeps its password; the operator must know it.
        let account_id = match self.store.get_identity_by_email(&email).await? {
            Some(_) => {
                let identity = self
                    .store
                    .verify_identity_password(&email, password)
                    .await?
                    .ok_or_else(|| {
                        LifecycleError::Validation(
                            "Password does not match the existing credentials for this email"
                                .to_string(),
                        )
                    })?;
                AccountId::new(identity.id)
            }
            None => self
                .identity
                .sign_up(&email, password, full_name.clone())
                .await
                .map_err(map_identity_error)?,
        };

        if self.store.get_profile(account_id.as_str()).await?.is_none() {
            self.create_profile_or_undo(&account_id, &email, full_name)
                .await?;
        }

        match self.store.bootstrap_super_admin(account_id.as_str()).await? {
            WriteOutcome::Applied => {}
            WriteOutcome::AlreadyHasRole => {
                return Err(LifecycleError::InvalidState(
                    "Account already holds a role".to_string(),
                ));
            }
            WriteOutcome::NotAuthorized => {
                return Err(LifecycleError::InvalidState(
                    "A super administrator already exists".to_string(),
                ));
            }
            WriteOutcome::NotFound | WriteOutcome::HasRole => {
                return Err(LifecycleError::NotFound);
            }
        }

        info!(account_id = %account_id, "Super administrator bootstrapped");

        self.store
            .get_profile(account_id.as_str())
            .await?
            .ok_or(LifecycleError::NotFound)
    }
}
