use axum::{
    Extension, Json,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tower_sessions::Session;

use super::observability::ResolvedAccess;
use super::{
    ApiError, ApiResponse, AppState, ChangePasswordRequest, CredentialsRequest, MeResponse,
    MessageResponse, RegisterRequest,
};
use crate::domain::{Account, AccountId, Role};
use crate::services::eligibility::DenialReason;
use crate::services::{Eligibility, EligibilityResponse, GuardDecision, guard};

const SESSION_TOKEN_KEY: &str = "access_token";
const SESSION_ACCOUNT_KEY: &str = "account_id";

/// Who is calling, as resolved by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account_id: AccountId,
    pub access_token: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// Resolves the caller from:
/// 1. Session cookie (set by `/auth/login`)
/// 2. `Authorization: Bearer <token>` header (token from `/auth/check-login`)
///
/// Either way the token must name a live session in the store.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let from_cookie = session
        .get::<String>(SESSION_TOKEN_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    let cookie_backed = from_cookie.is_some();
    let Some(token) = from_cookie.or_else(|| extract_bearer_token(&headers)) else {
        return Err(ApiError::unauthenticated());
    };

    let Some(account_id) = state.identity().resolve_session(&token).await? else {
        if cookie_backed {
            let _ = session.flush().await;
        }
        return Err(ApiError::unauthenticated());
    };

    request.extensions_mut().insert(AuthContext {
        account_id: account_id.clone(),
        access_token: token,
    });

    let mut response = next.run(request).await;
    if response.extensions().get::<ResolvedAccess>().is_none() {
        response
            .extensions_mut()
            .insert(ResolvedAccess { account_id, role: None });
    }
    Ok(response)
}

fn with_role(mut response: Response, auth: AuthContext, role: Role) -> Response {
    response.extensions_mut().insert(ResolvedAccess {
        account_id: auth.account_id,
        role: Some(role),
    });
    response
}

/// Any account holding a role. The role is re-read on every request.
pub async fn require_staff(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let role = current_role(&state, &auth).await?;
    Ok(with_role(next.run(request).await, auth, role))
}

pub async fn require_super_admin(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let role = current_role(&state, &auth).await?;
    if !role.can_manage_accounts() {
        return Err(ApiError::Forbidden(
            "Only a super administrator can manage accounts".to_string(),
        ));
    }
    Ok(with_role(next.run(request).await, auth, role))
}

async fn current_role(state: &AppState, auth: &AuthContext) -> Result<Role, ApiError> {
    let snapshot = state.lifecycle().access_snapshot(&auth.account_id).await?;

    match guard::evaluate(snapshot.as_ref()) {
        GuardDecision::Authorized { role } => Ok(role),
        GuardDecision::PendingApproval => Err(ApiError::Forbidden(
            DenialReason::PendingApproval.message().to_string(),
        )),
        GuardDecision::SignIn => Err(ApiError::unauthenticated()),
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers.get("Authorization")?.to_str().ok()?;
    let token = auth_header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/register
/// Creates a pending account; it cannot log in until approved.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<Account>>, ApiError> {
    if payload.email.trim().is_empty() {
        return Err(ApiError::validation("Email is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let account = state
        .lifecycle()
        .register(&payload.email, &payload.password, payload.full_name)
        .await?;

    Ok(Json(ApiResponse::success(account)))
}

/// POST /auth/check-login
/// The eligibility gate. Always 200; the decision is in the body.
pub async fn check_login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CredentialsRequest>,
) -> Json<EligibilityResponse> {
    let outcome = state
        .gate()
        .check_eligibility(&payload.email, &payload.password)
        .await;
    Json(outcome.into())
}

/// POST /auth/login
/// Runs the gate and, when it grants access, binds the session to a cookie.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<EligibilityResponse>, ApiError> {
    let outcome = state
        .gate()
        .check_eligibility(&payload.email, &payload.password)
        .await;

    if let Eligibility::Granted {
        session: issued, ..
    } = &outcome
    {
        session
            .cycle_id()
            .await
            .map_err(|e| ApiError::internal(format!("Failed to rotate session: {e}")))?;
        session
            .insert(SESSION_TOKEN_KEY, &issued.access_token)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;
        session
            .insert(SESSION_ACCOUNT_KEY, issued.account_id.as_str())
            .await
            .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;
    }

    Ok(Json(outcome.into()))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    session: Session,
) -> Json<ApiResponse<MessageResponse>> {
    if let Err(e) = state.identity().sign_out(&auth.access_token).await {
        tracing::warn!(account_id = %auth.account_id, error = %e, "Failed to delete session");
    }
    let _ = session.flush().await;

    Json(ApiResponse::success(MessageResponse::new("Logged out")))
}

/// GET /auth/me
/// Guard view of the current session: pending or authorized with a role.
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ApiResponse<MeResponse>>, ApiError> {
    let snapshot = state
        .lifecycle()
        .access_snapshot(&auth.account_id)
        .await?
        .ok_or_else(ApiError::unauthenticated)?;

    let decision = guard::evaluate(Some(&snapshot));

    Ok(Json(ApiResponse::success(MeResponse {
        decision,
        account: snapshot.account,
    })))
}

/// PUT /auth/password
/// Change password (requires current password verification)
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    if payload.current_password == payload.new_password {
        return Err(ApiError::validation(
            "New password must be different from current password",
        ));
    }

    let identity = state
        .store()
        .get_identity(auth.account_id.as_str())
        .await?
        .ok_or_else(ApiError::unauthenticated)?;

    let verified = state
        .store()
        .verify_identity_password(&identity.email, &payload.current_password)
        .await?;

    if verified.is_none() {
        return Err(ApiError::validation("Current password is incorrect"));
    }

    state
        .identity()
        .update_password(&auth.account_id, &payload.new_password)
        .await?;

    tracing::info!(account_id = %auth.account_id, "Password changed");

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password updated successfully",
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert("Authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers), Some("abc123".to_string()));

        headers.insert("Authorization", HeaderValue::from_static("Basic abc123"));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert("Authorization", HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
