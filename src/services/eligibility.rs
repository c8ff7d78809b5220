//! Login-eligibility gate.
//!
//! Re-validates credentials and re-derives the approval decision from the
//! store on every call. Nothing the client holds is trusted, and nothing is
//! cached between calls.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::{AccessSnapshot, Role, normalize_email};
use crate::services::identity_service::{IdentityError, IdentityProvider, IssuedSession};
use crate::services::lifecycle_service::AccountLifecycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    InvalidCredentials,
    PendingApproval,
    ProfileNotFound,
    ServerError,
}

impl DenialReason {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "Email ou mot de passe incorrect",
            Self::PendingApproval => {
                "Votre compte est en attente d'approbation par un administrateur"
            }
            Self::ProfileNotFound => "Profil utilisateur introuvable",
            Self::ServerError => "Une erreur est survenue, veuillez réessayer",
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::PendingApproval => "pending_approval",
            Self::ProfileNotFound => "profile_not_found",
            Self::ServerError => "server_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Granted { role: Role, session: IssuedSession },
    Denied(DenialReason),
}

/// Wire shape of the gate: `{canLogin, reason?, message?, role?, session?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityResponse {
    pub can_login: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<IssuedSession>,
}

impl From<Eligibility> for EligibilityResponse {
    fn from(eligibility: Eligibility) -> Self {
        match eligibility {
            Eligibility::Granted { role, session } => Self {
                can_login: true,
                reason: None,
                message: None,
                role: Some(role),
                session: Some(session),
            },
            Eligibility::Denied(reason) => Self {
                can_login: false,
                reason: Some(reason),
                message: Some(reason.message().to_string()),
                role: None,
                session: None,
            },
        }
    }
}

/// The decision table. Privilege requires both the approval flag and a role;
/// an approved account whose role was revoked is treated as pending.
pub fn decide(snapshot: Option<&AccessSnapshot>) -> Result<Role, DenialReason> {
    let Some(snapshot) = snapshot else {
        return Err(DenialReason::ProfileNotFound);
    };

    if !snapshot.account.is_approved {
        return Err(DenialReason::PendingApproval);
    }

    match snapshot.privileged_role() {
        Some(role @ (Role::SuperAdmin | Role::Admin | Role::Editor)) => Ok(role),
        None => Err(DenialReason::PendingApproval),
    }
}

pub struct LoginGate {
    identity: Arc<dyn IdentityProvider>,
    lifecycle: Arc<dyn AccountLifecycle>,
}

impl LoginGate {
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityProvider>, lifecycle: Arc<dyn AccountLifecycle>) -> Self {
        Self {
            identity,
            lifecycle,
        }
    }

    /// Never fails: backend errors become [`DenialReason::ServerError`].
    pub async fn check_eligibility(&self, email: &str, password: &str) -> Eligibility {
        let outcome = self.evaluate(email, password).await;

        let label = match &outcome {
            Eligibility::Granted { .. } => "granted",
            Eligibility::Denied(reason) => reason.label(),
        };
        metrics::counter!("login_gate_decisions_total", "outcome" => label).increment(1);

        outcome
    }

    async fn evaluate(&self, email: &str, password: &str) -> Eligibility {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Eligibility::Denied(DenialReason::InvalidCredentials);
        }

        let session = match self.identity.sign_in(&email, password).await {
            Ok(session) => session,
            Err(IdentityError::InvalidCredentials) => {
                return Eligibility::Denied(DenialReason::InvalidCredentials);
            }
            Err(e) => {
                error!(error = %e, "Identity provider failed during login check");
                return Eligibility::Denied(DenialReason::ServerError);
            }
        };

        // Looked up by the authenticated id, never by the submitted email.
        let snapshot = match self.lifecycle.access_snapshot(&session.account_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(account_id = %session.account_id, error = %e, "Profile lookup failed during login check");
                self.discard(&session).await;
                return Eligibility::Denied(DenialReason::ServerError);
            }
        };

        match decide(snapshot.as_ref()) {
            Ok(role) => {
                info!(account_id = %session.account_id, role = %role, "Login granted");
                Eligibility::Granted { role, session }
            }
            Err(reason) => {
                info!(account_id = %session.account_id, reason = reason.label(), "Login denied");
                self.discard(&session).await;
                Eligibility::Denied(reason)
            }
        }
    }

    /// Sign-in already opened a session; a denied login must not keep it.
    async fn discard(&self, session: &IssuedSession) {
        if let Err(e) = self.identity.sign_out(&session.access_token).await {
            warn!(
                account_id = %session.account_id,
                error = %e,
                "Failed to discard session of denied login; it will expire on its own"
            );
        }
    }
}
