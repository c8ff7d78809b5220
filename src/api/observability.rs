//! Request telemetry and response hardening.
//!
//! Every request gets a span carrying its route and, once the auth layers have
//! run, the caller's account and role. Counters are labelled with the access
//! outcome so refused staff requests show up separately from handler errors.

use axum::{
    extract::{MatchedPath, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::api::AppState;
use crate::domain::{AccountId, Role};

/// What the auth layers concluded about the caller. Attached to the response
/// by `auth_middleware` and the `require_*` layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccess {
    pub account_id: AccountId,
    /// Only set once a `require_*` layer has re-read the role.
    pub role: Option<Role>,
}

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.prometheus_handle.as_ref().map_or_else(
        || "Metrics not enabled or failed to initialize".to_string(),
        metrics_exporter_prometheus::PrometheusHandle::render,
    )
}

/// Label for the `access` dimension of the request metrics.
#[must_use]
pub fn access_label(status: StatusCode, access: Option<&ResolvedAccess>) -> &'static str {
    match (status, access) {
        (StatusCode::UNAUTHORIZED, _) => "unauthenticated",
        (StatusCode::FORBIDDEN, _) => "forbidden",
        (_, Some(ResolvedAccess { role: Some(role), .. })) => role.as_str(),
        (_, Some(ResolvedAccess { role: None, .. })) => "session",
        (_, None) => "public",
    }
}

pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();

    // Account ids appear in admin paths; metrics use the route template.
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |mp| mp.as_str().to_string());
    let method = req.method().to_string();

    let span = info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        method = %method,
        route = %route,
        user_id = tracing::field::Empty,
        role = tracing::field::Empty,
    );

    async move {
        let response = next.run(req).await;

        let status = response.status();
        let resolved = response.extensions().get::<ResolvedAccess>();
        let access = access_label(status, resolved);

        if let Some(resolved) = resolved {
            let span = tracing::Span::current();
            span.record("user_id", resolved.account_id.as_str());
            if let Some(role) = resolved.role {
                span.record("role", role.as_str());
            }
        }

        let labels = [
            ("method", method),
            ("path", route.clone()),
            ("status", status.as_u16().to_string()),
            ("access", access.to_string()),
        ];
        metrics::counter!("http_requests_total", &labels).increment(1);
        metrics::histogram!("http_request_duration_seconds", &labels)
            .record(start.elapsed().as_secs_f64());

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            metrics::counter!("access_denials_total", "route" => route, "reason" => access)
                .increment(1);
            warn!(status = status.as_u16(), duration_ms, access, "Request refused");
        } else {
            info!(status = status.as_u16(), duration_ms, access, "Request finished");
        }

        response
    }
    .instrument(span)
    .await
}

const SECURITY_HEADERS: [(header::HeaderName, &str); 5] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::REFERRER_POLICY, "no-referrer"),
    // Responses carry account data; nothing may be cached.
    (header::CACHE_CONTROL, "no-store"),
    (
        header::CONTENT_SECURITY_POLICY,
        "default-src 'none'; frame-ancestors 'none'",
    ),
];

fn apply_security_headers(headers: &mut HeaderMap) {
    for (name, value) in SECURITY_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
}

pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    apply_security_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(role: Option<Role>) -> ResolvedAccess {
        ResolvedAccess {
            account_id: AccountId::new("acc"),
            role,
        }
    }

    #[test]
    fn test_access_label_prefers_refusals() {
        assert_eq!(
            access_label(StatusCode::FORBIDDEN, Some(&resolved(None))),
            "forbidden"
        );
        assert_eq!(access_label(StatusCode::UNAUTHORIZED, None), "unauthenticated");
    }

    #[test]
    fn test_access_label_reports_role() {
        assert_eq!(
            access_label(StatusCode::OK, Some(&resolved(Some(Role::SuperAdmin)))),
            "super_admin"
        );
        assert_eq!(
            access_label(StatusCode::CONFLICT, Some(&resolved(Some(Role::Editor)))),
            "editor"
        );
        assert_eq!(access_label(StatusCode::OK, Some(&resolved(None))), "session");
        assert_eq!(access_label(StatusCode::OK, None), "public");
    }

    #[test]
    fn test_security_headers_applied() {
        let mut headers = HeaderMap::new();
        apply_security_headers(&mut headers);
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(headers.len(), SECURITY_HEADERS.len());
    }
}
