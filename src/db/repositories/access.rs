//! Profiles and role assignments.
//!
//! Every mutation runs in one transaction whose first statement is the write,
//! so concurrent writers queue on the database write lock instead of racing on
//! stale reads. The approver's `super_admin` role is re-read inside the same
//! transaction before commit.

use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
    sea_query::{Expr, Query},
};

use crate::db::{is_foreign_key_violation, is_unique_violation};
use crate::domain::{Account, AccountId, ActiveAccount, Role, now_timestamp};
use crate::entities::{prelude::*, profiles, user_roles};

/// Result of a guarded write, decided inside the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// Approver does not hold `super_admin`; nothing was written.
    NotAuthorized,
    NotFound,
    AlreadyHasRole,
    /// Target holds a role, so it is no longer a pending account.
    HasRole,
}

impl From<profiles::Model> for Account {
    fn from(model: profiles::Model) -> Self {
        Self {
            id: AccountId::new(model.id),
            email: model.email,
            full_name: model.full_name,
            is_approved: model.is_approved,
            approved_at: model.approved_at,
            approved_by: model.approved_by.map(AccountId::new),
            created_at: model.created_at,
        }
    }
}

pub struct AccessRepository {
    conn: DatabaseConnection,
}

impl AccessRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert_profile(
        &self,
        id: &str,
        email: &str,
        full_name: Option<String>,
    ) -> Result<Account> {
        let model = profiles::ActiveModel {
            id: Set(id.to_string()),
            email: Set(email.to_string()),
            full_name: Set(full_name),
            is_approved: Set(false),
            approved_at: Set(None),
            approved_by: Set(None),
            created_at: Set(now_timestamp()),
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert profile")?;

        Ok(Account::from(model))
    }

    pub async fn get_profile(&self, id: &str) -> Result<Option<Account>> {
        let profile = Profiles::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query profile by ID")?;

        Ok(profile.map(Account::from))
    }

    pub async fn get_profile_by_email(&self, email: &str) -> Result<Option<Account>> {
        let profile = Profiles::find()
            .filter(profiles::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query profile by email")?;

        Ok(profile.map(Account::from))
    }

    pub async fn get_role(&self, id: &str) -> Result<Option<Role>> {
        let assignment = UserRoles::find()
            .filter(user_roles::Column::UserId.eq(id))
            .one(&self.conn)
            .await
            .context("Failed to query role assignment")?;

        Ok(assignment.map(|a| a.role))
    }

    pub async fn list_pending(&self) -> Result<Vec<Account>> {
        let rows = Profiles::find()
            .filter(profiles::Column::IsApproved.eq(false))
            .order_by_desc(profiles::Column::CreatedAt)
            .all(&self.conn)
            .await
            .context("Failed to list pending profiles")?;

        Ok(rows.into_iter().map(Account::from).collect())
    }

    pub async fn list_active(&self) -> Result<Vec<ActiveAccount>> {
        let rows = UserRoles::find()
            .find_also_related(Profiles)
            .order_by_desc(profiles::Column::CreatedAt)
            .all(&self.conn)
            .await
            .context("Failed to list active accounts")?;

        Ok(rows
            .into_iter()
            .filter_map(|(assignment, profile)| {
                profile.map(|p| ActiveAccount {
                    account: Account::from(p),
                    role: assignment.role,
                    role_assigned_at: assignment.created_at,
                })
            })
            .collect())
    }

    pub async fn approve_and_assign(
        &self,
        target: &str,
        role: Role,
        approver: &str,
    ) -> Result<WriteOutcome> {
        let txn = self.conn.begin().await?;
        let now = now_timestamp();

        let inserted = UserRoles::insert(user_roles::ActiveModel {
            user_id: Set(target.to_string()),
            role: Set(role),
            created_at: Set(now.clone()),
            ..Default::default()
        })
        .exec(&txn)
        .await;

        if !is_super_admin(&txn, approver).await? {
            txn.rollback().await?;
            return Ok(WriteOutcome::NotAuthorized);
        }

        match inserted {
            Ok(_) => {}
            Err(err) => {
                txn.rollback().await?;
                return classify_insert_error(err);
            }
        }

        let updated = Profiles::update_many()
            .col_expr(profiles::Column::IsApproved, Expr::value(true))
            .col_expr(profiles::Column::ApprovedAt, Expr::value(now))
            .col_expr(profiles::Column::ApprovedBy, Expr::value(approver.to_string()))
            .filter(profiles::Column::Id.eq(target))
            .exec(&txn)
            .await?;

        if updated.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(WriteOutcome::NotFound);
        }

        txn.commit()
            .await
            .context("Failed to commit approval")?;
        Ok(WriteOutcome::Applied)
    }

    pub async fn change_role(&self, target: &str, role: Role, approver: &str) -> Result<WriteOutcome> {
        let txn = self.conn.begin().await?;

        let updated = UserRoles::update_many()
            .col_expr(user_roles::Column::Role, Expr::value(role))
            .filter(user_roles::Column::UserId.eq(target))
            .exec(&txn)
            .await?;

        if !is_super_admin(&txn, approver).await? {
            txn.rollback().await?;
            return Ok(WriteOutcome::NotAuthorized);
        }

        if updated.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(WriteOutcome::NotFound);
        }

        txn.commit()
            .await
            .context("Failed to commit role change")?;
        Ok(WriteOutcome::Applied)
    }

    /// Deletes the role assignment. `is_approved` is left as it is.
    pub async fn revoke_role(&self, target: &str, approver: &str) -> Result<WriteOutcome> {
        let txn = self.conn.begin().await?;

        let deleted = UserRoles::delete_many()
            .filter(user_roles::Column::UserId.eq(target))
            .exec(&txn)
            .await?;

        if !is_super_admin(&txn, approver).await? {
            txn.rollback().await?;
            return Ok(WriteOutcome::NotAuthorized);
        }

        if deleted.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(WriteOutcome::NotFound);
        }

        txn.commit()
            .await
            .context("Failed to commit role revocation")?;
        Ok(WriteOutcome::Applied)
    }

    /// Deletes a profile that holds no role.
    pub async fn reject(&self, target: &str, approver: &str) -> Result<WriteOutcome> {
        let txn = self.conn.begin().await?;

        let deleted = Profiles::delete_many()
            .filter(profiles::Column::Id.eq(target))
            .filter(
                profiles::Column::Id.not_in_subquery(
                    Query::select()
                        .column(user_roles::Column::UserId)
                        .from(UserRoles)
                        .to_owned(),
                ),
            )
            .exec(&txn)
            .await?;

        if !is_super_admin(&txn, approver).await? {
            txn.rollback().await?;
            return Ok(WriteOutcome::NotAuthorized);
        }

        if deleted.rows_affected == 0 {
            let exists = Profiles::find_by_id(target.to_string()).one(&txn).await?;
            txn.rollback().await?;
            return Ok(if exists.is_some() {
                WriteOutcome::HasRole
            } else {
                WriteOutcome::NotFound
            });
        }

        txn.commit()
            .await
            .context("Failed to commit rejection")?;
        Ok(WriteOutcome::Applied)
    }

    /// Grants `super_admin` to an existing profile, but only while nobody
    /// holds that role yet. `approved_by` is the account itself.
    pub async fn bootstrap_super_admin(&self, target: &str) -> Result<WriteOutcome> {
        let txn = self.conn.begin().await?;
        let now = now_timestamp();

        let inserted = UserRoles::insert(user_roles::ActiveModel {
            user_id: Set(target.to_string()),
            role: Set(Role::SuperAdmin),
            created_at: Set(now.clone()),
            ..Default::default()
        })
        .exec(&txn)
        .await;

        if let Err(err) = inserted {
            txn.rollback().await?;
            return classify_insert_error(err);
        }

        let super_admins = UserRoles::find()
            .filter(user_roles::Column::Role.eq(Role::SuperAdmin))
            .all(&txn)
            .await?;

        if super_admins.len() > 1 {
            txn.rollback().await?;
            return Ok(WriteOutcome::NotAuthorized);
        }

        Profiles::update_many()
            .col_expr(profiles::Column::IsApproved, Expr::value(true))
            .col_expr(profiles::Column::ApprovedAt, Expr::value(now))
            .col_expr(profiles::Column::ApprovedBy, Expr::value(target.to_string()))
            .filter(profiles::Column::Id.eq(target))
            .exec(&txn)
            .await?;

        txn.commit()
            .await
            .context("Failed to commit bootstrap")?;
        Ok(WriteOutcome::Applied)
    }
}

async fn is_super_admin(txn: &DatabaseTransaction, account_id: &str) -> Result<bool, DbErr> {
    let assignment = UserRoles::find()
        .filter(user_roles::Column::UserId.eq(account_id))
        .one(txn)
        .await?;

    Ok(assignment.is_some_and(|a| a.role.can_manage_accounts()))
}

fn classify_insert_error(err: DbErr) -> Result<WriteOutcome> {
    if is_unique_violation(&err) {
        Ok(WriteOutcome::AlreadyHasRole)
    } else if is_foreign_key_violation(&err) {
        Ok(WriteOutcome::NotFound)
    } else {
        Err(anyhow::Error::new(err).context("Failed to insert role assignment"))
    }
}
