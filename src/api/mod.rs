// =============================================================================
// HTTP Surface — routing, middleware chain, CORS
// =============================================================================
//
// Middleware chain, outermost first: CORS, request metrics, audit log,
// request logger, panic recovery. Request-id sits right inside CORS so
// every later layer (and the handler) can read it from extensions. Rate
// limiting is applied per route group via `Extension<TierName>` plus one
// shared `rate_limit_middleware`; root `/` and `/metrics` sit outside the
// `/api/v1` nest and are never rate-limited.
// =============================================================================

pub mod audit;
pub mod metrics;
pub mod middleware;
pub mod rest;
pub mod ws;

use std::sync::Arc;

use axum::extract::Extension;
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::rate_limit::TierName;

pub fn router(state: Arc<AppState>) -> Router {
    let read = Router::new()
        .route("/health", get(rest::health))
        .route("/status", get(rest::status))
        .route("/agents", get(rest::list_agents))
        .route("/agents/:name", get(rest::get_agent))
        .route("/positions", get(rest::list_positions))
        .route("/positions/:symbol", get(rest::get_position))
        .route("/orders", get(rest::list_orders))
        .route("/orders/:id", get(rest::get_order))
        .route("/config", get(rest::get_config))
        .route("/decisions", get(rest::list_decisions))
        .layer(Extension(TierName::Read));

    let order_tier = Router::new()
        .route("/orders", post(rest::place_order))
        .route("/orders/:id", delete(rest::cancel_order))
        .route("/decisions/feedback", post(rest::submit_feedback))
        .layer(Extension(TierName::Order));

    let control = Router::new()
        .route("/trade/start", post(rest::trade_start))
        .route("/trade/stop", post(rest::trade_stop))
        .route("/trade/pause", post(rest::trade_pause))
        .route("/trade/resume", post(rest::trade_resume))
        .route("/config", patch(rest::patch_config))
        .route("/decisions", post(rest::create_decision))
        .layer(Extension(TierName::Control));

    let search = Router::new()
        .route("/strategy/search", get(rest::search_strategy))
        .layer(Extension(TierName::Search));

    let ws_route = Router::new().route("/ws", get(ws::ws_handler));

    let versioned = Router::new()
        .merge(read)
        .merge(order_tier)
        .merge(control)
        .merge(search)
        .merge(ws_route)
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), middleware::rate_limit_middleware))
        .with_state(state.clone());

    let cors = build_cors_layer(&state);

    Router::new()
        .route("/", get(rest::root))
        .route("/metrics", get(rest::metrics))
        .with_state(state.clone())
        .nest("/api/v1", versioned)
        .layer(
            ServiceBuilder::new()
                .layer(cors)
                .layer(axum::middleware::from_fn(middleware::request_id_middleware))
                .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::metrics_middleware))
                .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::audit_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::new()),
        )
}

/// In production, restrict CORS to the configured WS origin allow-list
/// (the same list governs both WS upgrades and cross-origin REST calls).
/// Outside production, generalize the teacher's permissive dev CORS.
fn build_cors_layer(state: &AppState) -> CorsLayer {
    let config = state.runtime_config.read();
    if config.production {
        let origins: Vec<HeaderValue> =
            config.ws_allowed_origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
            .allow_headers(tower_http::cors::Any)
    } else {
        CorsLayer::permissive()
    }
}
