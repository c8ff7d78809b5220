//! Domain service for the staff account lifecycle.
//!
//! Registration, approval with role assignment, role changes, revocation and
//! rejection. This is the only component that writes `is_approved` or role
//! assignments.

use thiserror::Error;

use crate::domain::{AccessSnapshot, Account, AccountId, ActiveAccount, Role};

/// Errors specific to lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("An account is already registered with this email")]
    DuplicateAccount,

    #[error("Utilisateur non trouvé")]
    NotFound,

    #[error("This account already has a role")]
    AlreadyHasRole,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Only a super administrator can manage accounts")]
    Forbidden,

    #[error("You cannot modify your own role")]
    SelfModification,

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<sea_orm::DbErr> for LifecycleError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<anyhow::Error> for LifecycleError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(err.to_string())
    }
}

#[async_trait::async_trait]
pub trait AccountLifecycle: Send + Sync {
    /// Creates credentials and a pending profile.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::DuplicateAccount`] if the email is taken and
    /// [`LifecycleError::TransactionFailed`] if the profile could not be
    /// written (the credentials are removed again).
    async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: Option<String>,
    ) -> Result<Account, LifecycleError>;

    /// Grants `role` and marks the account approved in one transaction.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::AlreadyHasRole`] when the target already holds a
    /// role, including when a concurrent approval won the race.
    async fn approve_and_assign(
        &self,
        target: &AccountId,
        role: Role,
        approver: &AccountId,
    ) -> Result<(), LifecycleError>;

    async fn change_role(
        &self,
        target: &AccountId,
        new_role: Role,
        approver: &AccountId,
    ) -> Result<(), LifecycleError>;

    /// Deletes the role assignment; `is_approved` is left untouched.
    async fn revoke_role(
        &self,
        target: &AccountId,
        approver: &AccountId,
    ) -> Result<(), LifecycleError>;

    /// Deletes a pending account outright.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::InvalidState`] if the account holds a role.
    async fn reject(&self, target: &AccountId, approver: &AccountId)
    -> Result<(), LifecycleError>;

    /// Accounts with `is_approved = false`, newest first.
    async fn list_pending(&self) -> Result<Vec<Account>, LifecycleError>;

    /// Accounts holding a role, newest first.
    async fn list_active(&self) -> Result<Vec<ActiveAccount>, LifecycleError>;

    async fn find_account(&self, id: &AccountId) -> Result<Option<Account>, LifecycleError>;

    async fn find_account_by_email(&self, email: &str)
    -> Result<Option<Account>, LifecycleError>;

    async fn role_of(&self, id: &AccountId) -> Result<Option<Role>, LifecycleError>;

    /// Fresh profile + role read. `None` when the profile does not exist.
    async fn access_snapshot(
        &self,
        id: &AccountId,
    ) -> Result<Option<AccessSnapshot>, LifecycleError>;

    /// Creates (or promotes) the first super administrator.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::InvalidState`] once a super administrator exists.
    async fn bootstrap_super_admin(
        &self,
        email: &str,
        password: &str,
        full_name: Option<String>,
    ) -> Result<Account, LifecycleError>;
}
