//! Domain types for staff accounts and their privileges.
//!
//! Accounts are keyed by an opaque identifier issued by the identity provider.
//! Privilege is a closed set of roles; an account holds zero or one of them.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque account identifier shared by the identity provider and the profile
/// store.
///
/// # Examples
///
/// ```rust
/// use staffdesk::domain::AccountId;
///
/// let id = AccountId::new("2f1c");
/// assert_eq!(id.as_str(), "2f1c");
/// assert_eq!(id.to_string(), "2f1c");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier, used at sign-up.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Privilege level granted to an approved account.
///
/// The set is closed: every authorization decision matches on it exhaustively.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[sea_orm(string_value = "super_admin")]
    SuperAdmin,
    #[sea_orm(string_value = "admin")]
    Admin,
    #[sea_orm(string_value = "editor")]
    Editor,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Editor => "editor",
        }
    }

    /// Only super administrators may touch role assignments.
    #[must_use]
    pub const fn can_manage_accounts(self) -> bool {
        match self {
            Self::SuperAdmin => true,
            Self::Admin | Self::Editor => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "super_admin" => Ok(Self::SuperAdmin),
            "admin" => Ok(Self::Admin),
            "editor" => Ok(Self::Editor),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

/// A registered staff account as seen by the backoffice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    pub full_name: Option<String>,
    pub is_approved: bool,
    pub approved_at: Option<String>,
    pub approved_by: Option<AccountId>,
    pub created_at: String,
}

/// An account joined with its role assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveAccount {
    #[serde(flatten)]
    pub account: Account,
    pub role: Role,
    pub role_assigned_at: String,
}

/// Fresh read of everything needed to gate one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSnapshot {
    pub account: Account,
    pub role: Option<Role>,
}

impl AccessSnapshot {
    /// Privilege comes from holding a role, never from `is_approved` alone:
    /// a revoked account keeps `is_approved = true` but has no role.
    #[must_use]
    pub const fn privileged_role(&self) -> Option<Role> {
        self.role
    }
}

/// Current UTC time as RFC 3339 with fixed microsecond precision so that
/// lexical order matches chronological order.
#[must_use]
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Emails are compared case-insensitively.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Shape check only; deliverability is the mail provider's problem.
#[must_use]
pub fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && email.len() <= 254
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [Role::SuperAdmin, Role::Admin, Role::Editor] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("owner".parse::<Role>().is_err());
        assert_eq!(" Admin ".parse::<Role>().unwrap(), Role::Admin);
    }

    #[test]
    fn test_role_serde_uses_snake_case() {
        let json = serde_json::to_string(&Role::SuperAdmin).unwrap();
        assert_eq!(json, "\"super_admin\"");
        let role: Role = serde_json::from_str("\"editor\"").unwrap();
        assert_eq!(role, Role::Editor);
    }

    #[test]
    fn test_only_super_admin_manages_accounts() {
        assert!(Role::SuperAdmin.can_manage_accounts());
        assert!(!Role::Admin.can_manage_accounts());
        assert!(!Role::Editor.can_manage_accounts());
    }

    #[test]
    fn test_plausible_email() {
        assert!(is_plausible_email("dr.martin@hopital.example.org"));
        assert!(!is_plausible_email("bob"));
        assert!(!is_plausible_email("@x.com"));
        assert!(!is_plausible_email("bob@x"));
        assert!(!is_plausible_email("bob@x.com."));
        assert!(!is_plausible_email("b ob@x.com"));
        assert!(!is_plausible_email("a@b@c.com"));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Bob@X.com "), "bob@x.com");
    }

    #[test]
    fn test_timestamps_sort_chronologically() {
        let a = now_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = now_timestamp();
        assert!(a < b);
        assert_eq!(a.len(), b.len());
    }
}
