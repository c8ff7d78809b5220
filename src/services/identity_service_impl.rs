//! `SeaORM` implementation of the `IdentityProvider` trait.

use async_trait::async_trait;
use tokio::task;

use crate::config::SecurityConfig;
use crate::db::{Store, is_unique_violation_in};
use crate::db::repositories::identity::hash_password;
use crate::domain::AccountId;
use crate::services::identity_service::{IdentityError, IdentityProvider, IssuedSession};

pub struct SeaOrmIdentityProvider {
    store: Store,
    security: SecurityConfig,
}

impl SeaOrmIdentityProvider {
    #[must_use]
    pub const fn new(store: Store, security: SecurityConfig) -> Self {
        Self { store, security }
    }

    fn validate_password(&self, password: &str) -> Result<(), IdentityError> {
        if password.chars().count() < self.security.min_password_length {
            return Err(IdentityError::Validation(format!(
                "Password must be at least {} characters",
                self.security.min_password_length
            )));
        }
        Ok(())
    }

    async fn hash(&self, password: &str) -> Result<String, IdentityError> {
        let password = password.to_string();
        let security = self.security.clone();
        let hash = task::spawn_blocking(move || hash_password(&password, &security))
            .await
            .map_err(|e| IdentityError::Internal(format!("Password hashing task panicked: {e}")))??;
        Ok(hash)
    }
}

#[async_trait]
impl IdentityProvider for SeaOrmIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<IssuedSession, IdentityError> {
        let identity = self
            .store
            .verify_identity_password(email, password)
            .await?
            .ok_or(IdentityError::InvalidCredentials)?;

        let expires_at = (chrono::Utc::now()
            + chrono::Duration::minutes(self.security.session_ttl_minutes))
        .to_rfc3339_opts(chrono::SecondsFormat::Micros, true);

        let session = self.store.create_session(&identity.id, expires_at).await?;

        Ok(IssuedSession {
            access_token: session.token,
            account_id: AccountId::new(session.account_id),
            expires_at: session.expires_at,
        })
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<String>,
    ) -> Result<AccountId, IdentityError> {
        self.validate_password(password)?;

        if self.store.get_identity_by_email(email).await?.is_some() {
            return Err(IdentityError::EmailTaken);
        }

        let password_hash = self.hash(password).await?;
        let account_id = AccountId::generate();

        match self
            .store
            .create_identity(account_id.as_str(), email, password_hash, full_name)
            .await
        {
            Ok(_) => Ok(account_id),
            // Lost a race against another sign-up with the same email.
            Err(e) if is_unique_violation_in(&e) => Err(IdentityError::EmailTaken),
            Err(e) => Err(e.into()),
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        self.store.delete_session(access_token).await?;
        Ok(())
    }

    async fn update_password(
        &self,
        account_id: &AccountId,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        self.validate_password(new_password)?;
        let password_hash = self.hash(new_password).await?;
        self.store
            .update_identity_password_hash(account_id.as_str(), password_hash)
            .await?;
        Ok(())
    }

    async fn resolve_session(
        &self,
        access_token: &str,
    ) -> Result<Option<AccountId>, IdentityError> {
        let session = self.store.get_live_session(access_token).await?;
        Ok(session.map(|s| AccountId::new(s.account_id)))
    }

    async fn delete_identity(&self, account_id: &AccountId) -> Result<(), IdentityError> {
        self.store.delete_identity(account_id.as_str()).await?;
        Ok(())
    }
}
