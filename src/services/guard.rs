//! Advisory route guard.
//!
//! Tells a client which screen to show. It is not the security boundary: the
//! privileged API routes re-read the role from the store on every request.

use serde::Serialize;

use crate::domain::{AccessSnapshot, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GuardDecision {
    /// No session, or the session's account no longer exists.
    SignIn,
    PendingApproval,
    Authorized { role: Role },
}

#[must_use]
pub fn evaluate(snapshot: Option<&AccessSnapshot>) -> GuardDecision {
    let Some(snapshot) = snapshot else {
        return GuardDecision::SignIn;
    };

    match snapshot.privileged_role() {
        Some(Role::SuperAdmin) => GuardDecision::Authorized {
            role: Role::SuperAdmin,
        },
        Some(role @ (Role::Admin | Role::Editor)) if snapshot.account.is_approved => {
            GuardDecision::Authorized { role }
        }
        Some(Role::Admin | Role::Editor) | None => GuardDecision::PendingApproval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Account, AccountId};

    fn snapshot(is_approved: bool, role: Option<Role>) -> AccessSnapshot {
        AccessSnapshot {
            account: Account {
                id: AccountId::new("acc"),
                email: "a@x.com".to_string(),
                full_name: None,
                is_approved,
                approved_at: None,
                approved_by: None,
                created_at: "2026-01-01T00:00:00.000000Z".to_string(),
            },
            role,
        }
    }

    #[test]
    fn test_no_session_goes_to_sign_in() {
        assert_eq!(evaluate(None), GuardDecision::SignIn);
    }

    #[test]
    fn test_pending_and_revoked_accounts_wait() {
        assert_eq!(
            evaluate(Some(&snapshot(false, None))),
            GuardDecision::PendingApproval
        );
        assert_eq!(
            evaluate(Some(&snapshot(true, None))),
            GuardDecision::PendingApproval
        );
    }

    #[test]
    fn test_roles_are_authorized() {
        assert_eq!(
            evaluate(Some(&snapshot(true, Some(Role::Editor)))),
            GuardDecision::Authorized { role: Role::Editor }
        );
        assert_eq!(
            evaluate(Some(&snapshot(false, Some(Role::SuperAdmin)))),
            GuardDecision::Authorized {
                role: Role::SuperAdmin
            }
        );
        assert_eq!(
            evaluate(Some(&snapshot(false, Some(Role::Admin)))),
            GuardDecision::PendingApproval
        );
    }

    #[test]
    fn test_serialized_status_tag() {
        let json = serde_json::to_value(GuardDecision::Authorized { role: Role::Admin }).unwrap();
        assert_eq!(json, serde_json::json!({"status": "authorized", "role": "admin"}));
    }
}
