//! Identity provider: credentials and bearer sessions.
//!
//! Separate from the profile store but keyed by the same account id.

use serde::Serialize;
use thiserror::Error;

use crate::domain::AccountId;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// Unknown email and wrong password are deliberately the same variant.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for IdentityError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for IdentityError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Session established by a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedSession {
    pub access_token: String,
    pub account_id: AccountId,
    pub expires_at: String,
}

#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authenticates and opens a new session.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidCredentials`] for an unknown email or a
    /// wrong password alike.
    async fn sign_in(&self, email: &str, password: &str) -> Result<IssuedSession, IdentityError>;

    /// Creates credentials and returns the new account id.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<String>,
    ) -> Result<AccountId, IdentityError>;

    /// Invalidates a session token. Unknown tokens are not an error.
    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError>;

    async fn update_password(
        &self,
        account_id: &AccountId,
        new_password: &str,
    ) -> Result<(), IdentityError>;

    /// Resolves a live session token to its account.
    async fn resolve_session(&self, access_token: &str)
    -> Result<Option<AccountId>, IdentityError>;

    /// Removes credentials. Used to undo a sign-up whose profile could not be
    /// written.
    async fn delete_identity(&self, account_id: &AccountId) -> Result<(), IdentityError>;
}
