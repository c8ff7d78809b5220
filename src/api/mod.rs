use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::config::Config;
use crate::db::Store;
use crate::services::{AccountLifecycle, ApprovalConsole, EmailRelay, IdentityProvider, LoginGate};
use crate::state::SharedState;

pub mod auth;
mod contact;
mod error;
mod observability;
mod system;
mod types;
mod users;
mod validation;

pub use auth::AuthContext;
pub use error::ApiError;
pub use observability::ResolvedAccess;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.shared.store
    }

    #[must_use]
    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.shared.identity
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Arc<dyn AccountLifecycle> {
        &self.shared.lifecycle
    }

    #[must_use]
    pub fn gate(&self) -> &LoginGate {
        &self.shared.gate
    }

    #[must_use]
    pub fn console(&self) -> &ApprovalConsole {
        &self.shared.console
    }

    #[must_use]
    pub fn relay(&self) -> &Arc<dyn EmailRelay> {
        &self.shared.relay
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub fn router(state: Arc<AppState>) -> Router {
    let server = &state.config().server;
    let cors_origins = server.cors_allowed_origins.clone();

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(server.secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            server.session_inactivity_minutes,
        )));

    let api_router = Router::new()
        .merge(create_admin_router(state.clone()))
        .merge(create_staff_router(state.clone()))
        .merge(create_session_router(state.clone()))
        .route("/health", get(system::health))
        .route("/auth/register", post(auth::register))
        .route("/auth/check-login", post(auth::check_login))
        .route("/auth/login", post(auth::login))
        .route("/contact", post(contact::submit_contact))
        .layer(session_layer)
        .with_state(state);

    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(middleware::from_fn(observability::security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
}

/// Any authenticated session, approved or not.
fn create_session_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/password", put(auth::change_password))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

/// Accounts holding any role.
fn create_staff_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/metrics", get(observability::get_metrics))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_staff,
        ))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

/// Super administrators only.
fn create_admin_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/users", post(users::add_user))
        .route("/admin/users/pending", get(users::list_pending))
        .route("/admin/users/active", get(users::list_active))
        .route("/admin/users/{id}/approve", post(users::approve_user))
        .route("/admin/users/{id}", delete(users::reject_user))
        .route("/admin/users/{id}/role", put(users::change_role))
        .route("/admin/users/{id}/role", delete(users::revoke_role))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_super_admin,
        ))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}
