use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use tokio::task;

use crate::config::SecurityConfig;
use crate::domain::now_timestamp;
use crate::entities::{auth_sessions, identities, prelude::*};

/// Identity data returned from repository (without the password hash)
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub created_at: String,
}

impl From<identities::Model> for Identity {
    fn from(model: identities::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            full_name: model.full_name,
            created_at: model.created_at,
        }
    }
}

pub struct IdentityRepository {
    conn: DatabaseConnection,
}

impl IdentityRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let identity = Identities::find()
            .filter(identities::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query identity by email")?;

        Ok(identity.map(Identity::from))
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Identity>> {
        let identity = Identities::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query identity by ID")?;

        Ok(identity.map(Identity::from))
    }

    /// Inserts a new identity. The caller hashes the password.
    /// A duplicate email surfaces as a unique-constraint `DbErr` inside the
    /// returned error.
    pub async fn create(
        &self,
        id: &str,
        email: &str,
        password_hash: String,
        full_name: Option<String>,
    ) -> Result<Identity> {
        let now = now_timestamp();

        let model = identities::ActiveModel {
            id: Set(id.to_string()),
            email: Set(email.to_string()),
            password_hash: Set(password_hash),
            full_name: Set(full_name),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert identity")?;

        Ok(Identity::from(model))
    }

    /// Removes an identity and every session it holds.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        AuthSessions::delete_many()
            .filter(auth_sessions::Column::AccountId.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to delete sessions for identity")?;

        let result = Identities::delete_by_id(id.to_string())
            .exec(&self.conn)
            .await
            .context("Failed to delete identity")?;

        Ok(result.rows_affected > 0)
    }

    /// Verify password for an email address.
    /// Returns the identity only when the password matches.
    ///
    /// Argon2 runs on the blocking pool. Unknown emails still pay for one
    /// verification against a dummy hash so both failure paths cost the same.
    pub async fn verify_password(&self, email: &str, password: &str) -> Result<Option<Identity>> {
        let identity = Identities::find()
            .filter(identities::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query identity for password verification")?;

        let password = password.to_string();

        let Some(model) = identity else {
            // Timing parity only; the outcome is always a miss.
            let _ = task::spawn_blocking(move || verify_password_hash(&password, DUMMY_HASH)).await;
            return Ok(None);
        };

        let stored_hash = model.password_hash.clone();
        let is_valid = task::spawn_blocking(move || verify_password_hash(&password, &stored_hash))
            .await
            .context("Password verification task panicked")??;

        Ok(is_valid.then(|| Identity::from(model)))
    }

    pub async fn update_password_hash(&self, id: &str, new_hash: String) -> Result<()> {
        let identity = Identities::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query identity for password update")?
            .ok_or_else(|| anyhow::anyhow!("Identity not found: {id}"))?;

        let mut active: identities::ActiveModel = identity.into();
        active.password_hash = Set(new_hash);
        active.updated_at = Set(now_timestamp());
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn create_session(
        &self,
        account_id: &str,
        expires_at: String,
    ) -> Result<auth_sessions::Model> {
        let session = auth_sessions::ActiveModel {
            token: Set(generate_session_token()),
            account_id: Set(account_id.to_string()),
            created_at: Set(now_timestamp()),
            expires_at: Set(expires_at),
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert session")?;

        Ok(session)
    }

    /// Returns the session only while it has not expired.
    pub async fn get_live_session(&self, token: &str) -> Result<Option<auth_sessions::Model>> {
        let session = AuthSessions::find_by_id(token.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query session")?;

        let now = now_timestamp();
        Ok(session.filter(|s| s.expires_at > now))
    }

    pub async fn delete_session(&self, token: &str) -> Result<bool> {
        let result = AuthSessions::delete_by_id(token.to_string())
            .exec(&self.conn)
            .await
            .context("Failed to delete session")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn prune_expired_sessions(&self) -> Result<u64> {
        let result = AuthSessions::delete_many()
            .filter(auth_sessions::Column::ExpiresAt.lte(now_timestamp()))
            .exec(&self.conn)
            .await
            .context("Failed to prune expired sessions")?;

        Ok(result.rows_affected)
    }
}

/// Hash a password using Argon2id with the configured params.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Params are read back from the PHC string, so hashes made with older
/// settings still verify.
pub fn verify_password_hash(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Argon2id hash of a string nobody knows.
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=8192,t=3,p=1$c3RhZmZkZXNrZHVtbXk$2m0cGdJ2q5Gq2v9bQ4m6f8cI4o1u0aYb9m3cQyZr0kE";

/// Generate a random session token (64 character hex string)
#[must_use]
pub fn generate_session_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> SecurityConfig {
        SecurityConfig {
            argon2_memory_cost_kib: 1024,
            argon2_time_cost: 1,
            ..SecurityConfig::default()
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse", &fast_params()).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password_hash("correct horse", &hash).unwrap());
        assert!(!verify_password_hash("wrong horse", &hash).unwrap());
    }

    #[test]
    fn test_session_token_shape() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
