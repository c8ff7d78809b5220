//! Operations a super administrator performs from the approval console.

use std::sync::Arc;
use thiserror::Error;

use crate::domain::{Account, AccountId, ActiveAccount, Role};
use crate::services::lifecycle_service::{AccountLifecycle, LifecycleError};

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Revoking a role must be confirmed")]
    ConfirmationRequired,

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

pub struct ApprovalConsole {
    lifecycle: Arc<dyn AccountLifecycle>,
}

impl ApprovalConsole {
    #[must_use]
    pub fn new(lifecycle: Arc<dyn AccountLifecycle>) -> Self {
        Self { lifecycle }
    }

    /// Promotes an existing account found by email. Accounts are never
    /// created here; registration is self-service.
    pub async fn promote_by_email(
        &self,
        email: &str,
        role: Role,
        approver: &AccountId,
    ) -> Result<Account, ConsoleError> {
        let account = self
            .lifecycle
            .find_account_by_email(email)
            .await?
            .ok_or(LifecycleError::NotFound)?;

        if self.lifecycle.role_of(&account.id).await?.is_some() {
            return Err(LifecycleError::AlreadyHasRole.into());
        }

        self.lifecycle
            .approve_and_assign(&account.id, role, approver)
            .await?;

        Ok(self
            .lifecycle
            .find_account(&account.id)
            .await?
            .ok_or(LifecycleError::NotFound)?)
    }

    pub async fn pending(&self) -> Result<Vec<Account>, ConsoleError> {
        Ok(self.lifecycle.list_pending().await?)
    }

    pub async fn active(&self) -> Result<Vec<ActiveAccount>, ConsoleError> {
        Ok(self.lifecycle.list_active().await?)
    }

    pub async fn approve(
        &self,
        target: &AccountId,
        role: Role,
        approver: &AccountId,
    ) -> Result<(), ConsoleError> {
        Ok(self
            .lifecycle
            .approve_and_assign(target, role, approver)
            .await?)
    }

    pub async fn reject(&self, target: &AccountId, approver: &AccountId) -> Result<(), ConsoleError> {
        Ok(self.lifecycle.reject(target, approver).await?)
    }

    pub async fn change_role(
        &self,
        target: &AccountId,
        role: Role,
        approver: &AccountId,
    ) -> Result<(), ConsoleError> {
        Ok(self.lifecycle.change_role(target, role, approver).await?)
    }

    /// Destructive from the console's point of view; the account can be
    /// approved again afterwards.
    pub async fn revoke(
        &self,
        target: &AccountId,
        approver: &AccountId,
        confirmed: bool,
    ) -> Result<(), ConsoleError> {
        if !confirmed {
            return Err(ConsoleError::ConfirmationRequired);
        }
        Ok(self.lifecycle.revoke_role(target, approver).await?)
    }
}
