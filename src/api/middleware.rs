// =============================================================================
// Middleware — request id, rate limiting, audit logging
// =============================================================================
//
// Layered outside-in per request: panic recovery, request id, trace
// logging, rate limiting, audit. Each route group is annotated with an
// `Extension<TierName>` before the shared rate-limit middleware runs, so
// one `from_fn_with_state` handler serves every tier.
// =============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::api::audit::{is_audited_path, RequestContext};
use crate::app_state::AppState;
use crate::rate_limit::TierName;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Generates a request id, stores it in the request's extensions for
/// downstream use, and echoes it back on the response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    req.extensions_mut().insert(request_id);

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Enforces the per-IP sliding-window limit for whichever tier the route
/// was tagged with (plus the always-checked global tier), and always sets
/// the `X-RateLimit-*` headers so clients can self-throttle.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let tier = req.extensions().get::<TierName>().copied();
    let ip = addr.ip().to_string();
    let admission = state.rate_limiter.admit(&ip, tier);

    if !admission.allowed {
        state.metrics.record_rate_limited();
        let retry_after = admission.retry_after();
        let body = Json(serde_json::json!({
            "error": "rate_limited",
            "message": "too many requests",
            "retry_after": retry_after,
        }));
        let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
        set_rate_limit_headers(&mut response, admission.limit, admission.remaining, admission.reset_at);
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert("retry-after", value);
        }
        return response;
    }

    let mut response = next.run(req).await;
    set_rate_limit_headers(&mut response, admission.limit, admission.remaining, admission.reset_at);
    response
}

fn set_rate_limit_headers(response: &mut Response, limit: u32, remaining: u32, reset_at: u64) {
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert("x-ratelimit-limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(&reset_at.to_string()) {
        headers.insert("x-ratelimit-reset", v);
    }
}

/// Records a fixed set of audited routes (trading control, order writes,
/// config, decisions) after the handler completes. The persistence call
/// is spawned with a context captured here, so it survives the client
/// disconnecting mid-request.
pub async fn audit_middleware(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if !is_audited_path(&path) {
        return next.run(req).await;
    }

    let request_id = req.extensions().get::<Uuid>().copied().unwrap_or_else(Uuid::new_v4);
    let method = req.method().to_string();

    let response = next.run(req).await;

    let ctx = RequestContext { request_id, method, path, actor: None, at: Utc::now() };
    let audit = state.audit.clone();
    tokio::spawn(async move {
        audit.record(ctx);
    });

    response
}

/// Increments the request counter for every request, independent of
/// outcome.
pub async fn metrics_middleware(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    state.metrics.record_request();
    next.run(req).await
}
