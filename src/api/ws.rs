// =============================================================================
// WebSocket Upgrade — Origin Check, Handoff to the Hub
// =============================================================================
//
// Clients connect to `/api/v1/ws`; the upgrade is accepted only if the
// `Origin` header clears `OriginPolicy`. Once accepted, the connection is
// handed to `ws_hub::spawn_client`, which owns its framing and lifecycle
// from here on.
// =============================================================================

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::app_state::AppState;
use crate::ws_hub::{spawn_client, ClientConfig, OriginPolicy};

pub async fn ws_handler(State(state): State<Arc<AppState>>, headers: axum::http::HeaderMap, ws: WebSocketUpgrade) -> Response {
    let origin = headers.get(axum::http::header::ORIGIN).and_then(|v| v.to_str().ok());

    let (allowed_origins, production) = {
        let config = state.runtime_config.read();
        (config.ws_allowed_origins.clone(), config.production)
    };
    let policy = OriginPolicy::new(allowed_origins, production);

    if !policy.allows(origin) {
        warn!(origin = ?origin, "rejected ws upgrade: origin not allowed");
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }

    ws.on_upgrade(move |socket| async move {
        spawn_client(socket, state.ws_hub.clone(), ClientConfig::default());
    })
}
