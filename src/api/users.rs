//! Approval console endpoints. Mounted behind `require_super_admin`.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use std::sync::Arc;

use super::validation::validate_account_id;
use super::{
    AddUserRequest, ApiError, ApiResponse, AppState, AuthContext, MessageResponse, RevokeQuery,
    RoleRequest,
};
use crate::domain::{Account, ActiveAccount, normalize_email};

/// GET /admin/users/pending
pub async fn list_pending(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Account>>>, ApiError> {
    let accounts = state.console().pending().await?;
    Ok(Json(ApiResponse::success(accounts)))
}

/// GET /admin/users/active
pub async fn list_active(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<ActiveAccount>>>, ApiError> {
    let accounts = state.console().active().await?;
    Ok(Json(ApiResponse::success(accounts)))
}

/// POST /admin/users
/// Grants a role to an already registered account, found by email.
pub async fn add_user(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<AddUserRequest>,
) -> Result<Json<ApiResponse<Account>>, ApiError> {
    let email = normalize_email(&payload.email);
    if email.is_empty() {
        return Err(ApiError::validation("Email is required"));
    }

    let account = state
        .console()
        .promote_by_email(&email, payload.role, &auth.account_id)
        .await?;

    Ok(Json(ApiResponse::success(account)))
}

/// POST /admin/users/{id}/approve
pub async fn approve_user(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(payload): Json<RoleRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let target = validate_account_id(&id)?;

    state
        .console()
        .approve(&target, payload.role, &auth.account_id)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "Account approved as {}",
        payload.role
    )))))
}

/// DELETE /admin/users/{id}
/// Rejects a pending account.
pub async fn reject_user(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let target = validate_account_id(&id)?;

    state.console().reject(&target, &auth.account_id).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Account rejected",
    ))))
}

/// PUT /admin/users/{id}/role
pub async fn change_role(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(payload): Json<RoleRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let target = validate_account_id(&id)?;

    state
        .console()
        .change_role(&target, payload.role, &auth.account_id)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "Role changed to {}",
        payload.role
    )))))
}

/// DELETE /admin/users/{id}/role?confirm=true
pub async fn revoke_role(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Query(query): Query<RevokeQuery>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let target = validate_account_id(&id)?;

    state
        .console()
        .revoke(&target, &auth.account_id, query.confirm)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Role revoked",
    ))))
}
