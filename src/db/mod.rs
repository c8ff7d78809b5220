use anyhow::Result;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, SqlErr, Statement,
};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::access::WriteOutcome;
pub use repositories::identity::Identity;

use crate::domain::{Account, ActiveAccount, Role};
use crate::entities::auth_sessions;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:").trim_start_matches("//");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn identity_repo(&self) -> repositories::identity::IdentityRepository {
        repositories::identity::IdentityRepository::new(self.conn.clone())
    }

    fn access_repo(&self) -> repositories::access::AccessRepository {
        repositories::access::AccessRepository::new(self.conn.clone())
    }

    // ========== Identity Repository Methods ==========

    pub async fn get_identity_by_email(&self, email: &str) -> Result<Option<Identity>> {
        self.identity_repo().get_by_email(email).await
    }

    pub async fn get_identity(&self, id: &str) -> Result<Option<Identity>> {
        self.identity_repo().get_by_id(id).await
    }

    pub async fn create_identity(
        &self,
        id: &str,
        email: &str,
        password_hash: String,
        full_name: Option<String>,
    ) -> Result<Identity> {
        self.identity_repo()
            .create(id, email, password_hash, full_name)
            .await
    }

    pub async fn delete_identity(&self, id: &str) -> Result<bool> {
        self.identity_repo().delete(id).await
    }

    pub async fn verify_identity_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Identity>> {
        self.identity_repo().verify_password(email, password).await
    }

    pub async fn update_identity_password_hash(&self, id: &str, new_hash: String) -> Result<()> {
        self.identity_repo().update_password_hash(id, new_hash).await
    }

    pub async fn create_session(
        &self,
        account_id: &str,
        expires_at: String,
    ) -> Result<auth_sessions::Model> {
        self.identity_repo()
            .create_session(account_id, expires_at)
            .await
    }

    pub async fn get_live_session(&self, token: &str) -> Result<Option<auth_sessions::Model>> {
        self.identity_repo().get_live_session(token).await
    }

    pub async fn delete_session(&self, token: &str) -> Result<bool> {
        self.identity_repo().delete_session(token).await
    }

    pub async fn prune_expired_sessions(&self) -> Result<u64> {
        self.identity_repo().prune_expired_sessions().await
    }

    // ========== Access Repository Methods ==========

    pub async fn insert_profile(
        &self,
        id: &str,
        email: &str,
        full_name: Option<String>,
    ) -> Result<Account> {
        self.access_repo().insert_profile(id, email, full_name).await
    }

    pub async fn get_profile(&self, id: &str) -> Result<Option<Account>> {
        self.access_repo().get_profile(id).await
    }

    pub async fn get_profile_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.access_repo().get_profile_by_email(email).await
    }

    pub async fn get_role(&self, id: &str) -> Result<Option<Role>> {
        self.access_repo().get_role(id).await
    }

    pub async fn list_pending_profiles(&self) -> Result<Vec<Account>> {
        self.access_repo().list_pending().await
    }

    pub async fn list_active_accounts(&self) -> Result<Vec<ActiveAccount>> {
        self.access_repo().list_active().await
    }

    pub async fn approve_and_assign(
        &self,
        target: &str,
        role: Role,
        approver: &str,
    ) -> Result<WriteOutcome> {
        self.access_repo()
            .approve_and_assign(target, role, approver)
            .await
    }

    pub async fn change_role(&self, target: &str, role: Role, approver: &str) -> Result<WriteOutcome> {
        self.access_repo().change_role(target, role, approver).await
    }

    pub async fn revoke_role(&self, target: &str, approver: &str) -> Result<WriteOutcome> {
        self.access_repo().revoke_role(target, approver).await
    }

    pub async fn reject_profile(&self, target: &str, approver: &str) -> Result<WriteOutcome> {
        self.access_repo().reject(target, approver).await
    }

    pub async fn bootstrap_super_admin(&self, target: &str) -> Result<WriteOutcome> {
        self.access_repo().bootstrap_super_admin(target).await
    }
}

/// Unique-index collision, as reported by the driver.
#[must_use]
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        || err.to_string().contains("UNIQUE constraint failed")
}

#[must_use]
pub fn is_foreign_key_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::ForeignKeyConstraintViolation(_)))
        || err.to_string().contains("FOREIGN KEY constraint failed")
}

/// Looks for a unique-index collision anywhere in an `anyhow` chain.
#[must_use]
pub fn is_unique_violation_in(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<DbErr>())
        .any(is_unique_violation)
}
