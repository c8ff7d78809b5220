use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use staffdesk::config::{Config, HousekeepingConfig};
use staffdesk::db::Store;
use staffdesk::domain::{Account, AccountId, Role};
use staffdesk::entities::{
    auth_sessions,
    prelude::{AuthSessions, UserRoles},
    user_roles,
};
use staffdesk::housekeeping::Housekeeper;
use staffdesk::services::{
    ConsoleError, DenialReason, Eligibility, EligibilityResponse, EmailMessage, EmailRelay,
    LifecycleError, RelayError,
};
use staffdesk::state::SharedState;

#[derive(Default)]
struct RecordingRelay {
    sent: Mutex<Vec<EmailMessage>>,
}

#[async_trait::async_trait]
impl EmailRelay for RecordingRelay {
    async fn send(&self, message: EmailMessage) -> Result<(), RelayError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

struct Harness {
    state: SharedState,
    relay: Arc<RecordingRelay>,
    root: Account,
    _tmp_dir: TempDir,
}

async fn empty_harness() -> (SharedState, Arc<RecordingRelay>, TempDir) {
    let tmp_dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.general.database_path =
        format!("sqlite:{}", tmp_dir.path().join("staffdesk.db").display());
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config.notifications.approval_recipients = vec!["direction@hopital.example.org".to_string()];

    let store = Store::with_pool_options(&config.general.database_path, 5, 1)
        .await
        .expect("Failed to open test database");

    let relay = Arc::new(RecordingRelay::default());
    let state = SharedState::with_relay(config, store, relay.clone());

    (state, relay, tmp_dir)
}

async fn harness() -> Harness {
    let (state, relay, tmp_dir) = empty_harness().await;

    let root = state
        .lifecycle
        .bootstrap_super_admin("root@hopital.example.org", "root-password", Some("Root".into()))
        .await
        .expect("Failed to bootstrap super admin");

    Harness {
        state,
        relay,
        root,
        _tmp_dir: tmp_dir,
    }
}

async fn register(h: &Harness, email: &str) -> Account {
    h.state
        .lifecycle
        .register(email, "password123", Some("Staff Member".into()))
        .await
        .expect("Registration failed")
}

async fn role_rows(h: &Harness, account: &AccountId) -> Vec<user_roles::Model> {
    UserRoles::find()
        .filter(user_roles::Column::UserId.eq(account.as_str()))
        .all(&h.state.store.conn)
        .await
        .unwrap()
}

async fn session_count(h: &Harness, account: &AccountId) -> u64 {
    AuthSessions::find()
        .filter(auth_sessions::Column::AccountId.eq(account.as_str()))
        .count(&h.state.store.conn)
        .await
        .unwrap()
}

fn denial(outcome: &Eligibility) -> Option<DenialReason> {
    match outcome {
        Eligibility::Denied(reason) => Some(*reason),
        Eligibility::Granted { .. } => None,
    }
}

#[tokio::test]
async fn test_registration_creates_pending_account() {
    let h = harness().await;
    let bob = register(&h, "  Bob@Example.org ").await;

    assert_eq!(bob.email, "bob@example.org");
    assert!(!bob.is_approved);
    assert!(bob.approved_at.is_none());
    assert_eq!(h.state.lifecycle.role_of(&bob.id).await.unwrap(), None);

    let pending = h.state.lifecycle.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, bob.id);

    let sent = h.relay.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Nouveau compte en attente d'approbation");
    assert!(sent[0].html.contains("bob@example.org"));
}

#[tokio::test]
async fn test_duplicate_registration_is_rejected() {
    let h = harness().await;
    register(&h, "bob@example.org").await;

    let err = h
        .state
        .lifecycle
        .register("BOB@example.org", "password123", None)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::DuplicateAccount));
}

#[tokio::test]
async fn test_registration_validates_input() {
    let h = harness().await;

    let err = h
        .state
        .lifecycle
        .register("not-an-email", "password123", None)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));

    let err = h
        .state
        .lifecycle
        .register("short@example.org", "short", None)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));
    assert!(
        h.state
            .store
            .get_identity_by_email("short@example.org")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_pending_list_is_newest_first() {
    let h = harness().await;
    let first = register(&h, "first@example.org").await;
    let second = register(&h, "second@example.org").await;

    let pending = h.state.lifecycle.list_pending().await.unwrap();
    let ids: Vec<_> = pending.iter().map(|a| a.id.clone()).collect();
    assert_eq!(ids, vec![second.id, first.id]);
}

#[tokio::test]
async fn test_approval_makes_account_eligible() {
    let h = harness().await;
    let bob = register(&h, "bob@example.org").await;

    h.state
        .lifecycle
        .approve_and_assign(&bob.id, Role::Editor, &h.root.id)
        .await
        .unwrap();

    let account = h.state.lifecycle.find_account(&bob.id).await.unwrap().unwrap();
    assert!(account.is_approved);
    assert_eq!(account.approved_by, Some(h.root.id.clone()));
    assert!(account.approved_at.is_some());

    let outcome = h
        .state
        .gate
        .check_eligibility("bob@example.org", "password123")
        .await;
    match outcome {
        Eligibility::Granted { role, session } => {
            assert_eq!(role, Role::Editor);
            assert_eq!(session.account_id, bob.id);
            let resolved = h
                .state
                .identity
                .resolve_session(&session.access_token)
                .await
                .unwrap();
            assert_eq!(resolved, Some(bob.id.clone()));
        }
        Eligibility::Denied(reason) => panic!("expected access, got {reason:?}"),
    }

    let active = h.state.lifecycle.list_active().await.unwrap();
    assert!(active.iter().any(|a| a.account.id == bob.id && a.role == Role::Editor));
}

#[tokio::test]
async fn test_account_holds_at_most_one_role() {
    let h = harness().await;
    let bob = register(&h, "bob@example.org").await;

    h.state
        .lifecycle
        .approve_and_assign(&bob.id, Role::Editor, &h.root.id)
        .await
        .unwrap();

    let err = h
        .state
        .lifecycle
        .approve_and_assign(&bob.id, Role::Admin, &h.root.id)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::AlreadyHasRole));

    let rows = role_rows(&h, &bob.id).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].role, Role::Editor);
    assert_eq!(rows[0].user_id, bob.id.as_str());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_approvals_leave_one_role() {
    let h = harness().await;
    let bob = register(&h, "bob@example.org").await;

    let first = {
        let lifecycle = h.state.lifecycle.clone();
        let (target, approver) = (bob.id.clone(), h.root.id.clone());
        tokio::spawn(async move {
            lifecycle
                .approve_and_assign(&target, Role::Editor, &approver)
                .await
        })
    };
    let second = {
        let lifecycle = h.state.lifecycle.clone();
        let (target, approver) = (bob.id.clone(), h.root.id.clone());
        tokio::spawn(async move {
            lifecycle
                .approve_and_assign(&target, Role::Admin, &approver)
                .await
        })
    };

    let (first, second) = tokio::join!(first, second);
    let results = [first.unwrap(), second.unwrap()];

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let losers = results
        .iter()
        .filter(|r| matches!(r, Err(LifecycleError::AlreadyHasRole)))
        .count();
    assert_eq!(successes, 1, "results: {results:?}");
    assert_eq!(losers, 1, "results: {results:?}");

    let rows = role_rows(&h, &bob.id).await;
    assert_eq!(rows.len(), 1);
    let winner = if results[0].is_ok() { Role::Editor } else { Role::Admin };
    assert_eq!(rows[0].role, winner);
}

#[tokio::test]
async fn test_revocation_returns_account_to_pending() {
    let h = harness().await;
    let bob = register(&h, "bob@example.org").await;
    h.state
        .lifecycle
        .approve_and_assign(&bob.id, Role::Admin, &h.root.id)
        .await
        .unwrap();

    h.state.lifecycle.revoke_role(&bob.id, &h.root.id).await.unwrap();

    let account = h.state.lifecycle.find_account(&bob.id).await.unwrap().unwrap();
    assert!(account.is_approved, "revoke keeps the approval flag");
    assert_eq!(h.state.lifecycle.role_of(&bob.id).await.unwrap(), None);

    let outcome = h
        .state
        .gate
        .check_eligibility("bob@example.org", "password123")
        .await;
    assert_eq!(denial(&outcome), Some(DenialReason::PendingApproval));

    let active = h.state.lifecycle.list_active().await.unwrap();
    assert!(active.iter().all(|a| a.account.id != bob.id));

    // Re-approval is allowed after revocation.
    h.state
        .lifecycle
        .approve_and_assign(&bob.id, Role::Editor, &h.root.id)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rejection_is_not_repeatable() {
    let h = harness().await;
    let bob = register(&h, "bob@example.org").await;

    h.state.lifecycle.reject(&bob.id, &h.root.id).await.unwrap();
    assert!(h.state.lifecycle.find_account(&bob.id).await.unwrap().is_none());

    let err = h.state.lifecycle.reject(&bob.id, &h.root.id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound));
    assert_eq!(err.to_string(), "Utilisateur non trouvé");

    let outcome = h
        .state
        .gate
        .check_eligibility("bob@example.org", "password123")
        .await;
    assert_eq!(denial(&outcome), Some(DenialReason::InvalidCredentials));
    assert_eq!(session_count(&h, &bob.id).await, 0);
}

#[tokio::test]
async fn test_rejected_email_can_register_again() {
    let h = harness().await;
    let bob = register(&h, "bob@example.org").await;
    h.state.lifecycle.reject(&bob.id, &h.root.id).await.unwrap();

    assert!(h.state.store.get_identity(bob.id.as_str()).await.unwrap().is_none());

    let again = h
        .state
        .lifecycle
        .register("bob@example.org", "another-password", None)
        .await
        .expect("rejected email should be free again");
    assert_ne!(again.id, bob.id);
    assert!(!again.is_approved);

    let outcome = h
        .state
        .gate
        .check_eligibility("bob@example.org", "password123")
        .await;
    assert_eq!(denial(&outcome), Some(DenialReason::InvalidCredentials));

    let outcome = h
        .state
        .gate
        .check_eligibility("bob@example.org", "another-password")
        .await;
    assert_eq!(denial(&outcome), Some(DenialReason::PendingApproval));
}

#[tokio::test]
async fn test_rejecting_active_account_is_refused() {
    let h = harness().await;
    let bob = register(&h, "bob@example.org").await;
    h.state
        .lifecycle
        .approve_and_assign(&bob.id, Role::Editor, &h.root.id)
        .await
        .unwrap();

    let err = h.state.lifecycle.reject(&bob.id, &h.root.id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidState(_)));
    assert!(h.state.lifecycle.find_account(&bob.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_super_admin_cannot_modify_own_role() {
    let h = harness().await;

    let err = h
        .state
        .lifecycle
        .change_role(&h.root.id, Role::Editor, &h.root.id)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::SelfModification));

    let err = h
        .state
        .lifecycle
        .revoke_role(&h.root.id, &h.root.id)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::SelfModification));

    assert_eq!(
        h.state.lifecycle.role_of(&h.root.id).await.unwrap(),
        Some(Role::SuperAdmin)
    );
}

#[tokio::test]
async fn test_only_super_admin_can_approve() {
    let h = harness().await;
    let editor = register(&h, "editor@example.org").await;
    let bob = register(&h, "bob@example.org").await;
    h.state
        .lifecycle
        .approve_and_assign(&editor.id, Role::Admin, &h.root.id)
        .await
        .unwrap();

    let err = h
        .state
        .lifecycle
        .approve_and_assign(&bob.id, Role::Editor, &editor.id)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Forbidden));

    let account = h.state.lifecycle.find_account(&bob.id).await.unwrap().unwrap();
    assert!(!account.is_approved);
    assert_eq!(h.state.lifecycle.role_of(&bob.id).await.unwrap(), None);

    let err = h.state.lifecycle.reject(&bob.id, &editor.id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Forbidden));
    assert!(h.state.lifecycle.find_account(&bob.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_change_role_of_other_account() {
    let h = harness().await;
    let bob = register(&h, "bob@example.org").await;
    h.state
        .lifecycle
        .approve_and_assign(&bob.id, Role::Editor, &h.root.id)
        .await
        .unwrap();

    h.state
        .lifecycle
        .change_role(&bob.id, Role::Admin, &h.root.id)
        .await
        .unwrap();
    assert_eq!(
        h.state.lifecycle.role_of(&bob.id).await.unwrap(),
        Some(Role::Admin)
    );

    let pending = register(&h, "pending@example.org").await;
    let err = h
        .state
        .lifecycle
        .change_role(&pending.id, Role::Admin, &h.root.id)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound));
}

#[tokio::test]
async fn test_auth_failures_are_indistinguishable() {
    let h = harness().await;
    register(&h, "bob@example.org").await;

    let unknown = h
        .state
        .gate
        .check_eligibility("nobody@example.org", "password123")
        .await;
    let wrong_password = h
        .state
        .gate
        .check_eligibility("bob@example.org", "not-the-password")
        .await;

    let unknown = serde_json::to_string(&EligibilityResponse::from(unknown)).unwrap();
    let wrong_password = serde_json::to_string(&EligibilityResponse::from(wrong_password)).unwrap();
    assert_eq!(unknown, wrong_password);
    assert!(unknown.contains("invalid_credentials"));
}

#[tokio::test]
async fn test_gate_signs_out_denied_sessions() {
    let h = harness().await;
    let bob = register(&h, "bob@example.org").await;

    let outcome = h
        .state
        .gate
        .check_eligibility("bob@example.org", "password123")
        .await;
    assert_eq!(denial(&outcome), Some(DenialReason::PendingApproval));
    assert_eq!(session_count(&h, &bob.id).await, 0);

    h.state
        .lifecycle
        .approve_and_assign(&bob.id, Role::Editor, &h.root.id)
        .await
        .unwrap();
    let outcome = h
        .state
        .gate
        .check_eligibility("bob@example.org", "password123")
        .await;
    assert!(matches!(outcome, Eligibility::Granted { .. }));
    assert_eq!(session_count(&h, &bob.id).await, 1);
}

#[tokio::test]
async fn test_bootstrap_runs_once() {
    let h = harness().await;

    let err = h
        .state
        .lifecycle
        .bootstrap_super_admin("second@example.org", "password123", None)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidState(_)));

    let root = h.state.lifecycle.access_snapshot(&h.root.id).await.unwrap().unwrap();
    assert!(root.account.is_approved);
    assert_eq!(root.role, Some(Role::SuperAdmin));
}

#[tokio::test]
async fn test_bootstrap_promotes_existing_registration() {
    let (state, _relay, _tmp_dir) = empty_harness().await;
    let carol = state
        .lifecycle
        .register("carol@example.org", "original-pw", None)
        .await
        .unwrap();

    let err = state
        .lifecycle
        .bootstrap_super_admin("carol@example.org", "operator-typed-pw", None)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));
    assert_eq!(state.lifecycle.role_of(&carol.id).await.unwrap(), None);

    let promoted = state
        .lifecycle
        .bootstrap_super_admin("carol@example.org", "original-pw", None)
        .await
        .unwrap();
    assert_eq!(promoted.id, carol.id);
    assert!(promoted.is_approved);

    let outcome = state
        .gate
        .check_eligibility("carol@example.org", "original-pw")
        .await;
    match outcome {
        Eligibility::Granted { role, .. } => assert_eq!(role, Role::SuperAdmin),
        Eligibility::Denied(reason) => panic!("expected access, got {reason:?}"),
    }
}

#[tokio::test]
async fn test_console_promote_by_email() {
    let h = harness().await;

    let err = h
        .state
        .console
        .promote_by_email("ghost@example.org", Role::Editor, &h.root.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConsoleError::Lifecycle(LifecycleError::NotFound)
    ));
    assert_eq!(err.to_string(), "Utilisateur non trouvé");

    register(&h, "carol@example.org").await;
    let carol = h
        .state
        .console
        .promote_by_email("Carol@Example.org", Role::Admin, &h.root.id)
        .await
        .unwrap();
    assert!(carol.is_approved);

    let err = h
        .state
        .console
        .promote_by_email("carol@example.org", Role::Editor, &h.root.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConsoleError::Lifecycle(LifecycleError::AlreadyHasRole)
    ));
}

#[tokio::test]
async fn test_console_revoke_requires_confirmation() {
    let h = harness().await;
    let bob = register(&h, "bob@example.org").await;
    h.state
        .console
        .approve(&bob.id, Role::Editor, &h.root.id)
        .await
        .unwrap();

    let err = h
        .state
        .console
        .revoke(&bob.id, &h.root.id, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::ConfirmationRequired));
    assert_eq!(
        h.state.lifecycle.role_of(&bob.id).await.unwrap(),
        Some(Role::Editor)
    );

    h.state
        .console
        .revoke(&bob.id, &h.root.id, true)
        .await
        .unwrap();
    assert_eq!(h.state.lifecycle.role_of(&bob.id).await.unwrap(), None);
}

#[tokio::test]
async fn test_bob_end_to_end() {
    let h = harness().await;

    let bob = register(&h, "bob@x.com").await;
    let outcome = h.state.gate.check_eligibility("bob@x.com", "password123").await;
    assert_eq!(denial(&outcome), Some(DenialReason::PendingApproval));

    let pending = h.state.console.pending().await.unwrap();
    assert!(pending.iter().any(|a| a.id == bob.id));

    h.state
        .console
        .approve(&bob.id, Role::Editor, &h.root.id)
        .await
        .unwrap();
    let outcome = h.state.gate.check_eligibility("bob@x.com", "password123").await;
    assert!(matches!(
        outcome,
        Eligibility::Granted {
            role: Role::Editor,
            ..
        }
    ));

    h.state
        .console
        .revoke(&bob.id, &h.root.id, true)
        .await
        .unwrap();
    let outcome = h.state.gate.check_eligibility("bob@x.com", "password123").await;
    assert_eq!(denial(&outcome), Some(DenialReason::PendingApproval));
}

#[tokio::test]
async fn test_housekeeping_prunes_only_expired_sessions() {
    let h = harness().await;

    let outcome = h
        .state
        .gate
        .check_eligibility("root@hopital.example.org", "root-password")
        .await;
    assert!(matches!(outcome, Eligibility::Granted { .. }));

    let stale = h
        .state
        .store
        .create_session(h.root.id.as_str(), "2000-01-01T00:00:00.000000Z".to_string())
        .await
        .unwrap();
    assert_eq!(session_count(&h, &h.root.id).await, 2);

    let housekeeper = Housekeeper::new(h.state.store.clone(), HousekeepingConfig::default());
    assert_eq!(housekeeper.prune_once().await.unwrap(), 1);
    assert_eq!(session_count(&h, &h.root.id).await, 1);
    assert!(
        AuthSessions::find_by_id(stale.token)
            .one(&h.state.store.conn)
            .await
            .unwrap()
            .is_none()
    );

    assert_eq!(housekeeper.prune_once().await.unwrap(), 0);
}
