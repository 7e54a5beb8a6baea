// =============================================================================
// REST Handlers
// =============================================================================
//
// Every handler here takes `State<Arc<AppState>>` and returns either a
// JSON success body or an `ApiError`. Route wiring (tiers, middleware
// order) lives in `api::mod`.
// =============================================================================

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::app_state::{AgentStatusRecord, AppState, DecisionRecord, StrategyInfo};
use crate::control_proxy::ControlVerb;
use crate::exchange::orders::PlaceOrderRequest;
use crate::exchange::Order;
use crate::store::Session;
use crate::types::SessionMode;
use crate::ws_hub::{BroadcastMessage, BroadcastTopic};

// =============================================================================
// Error type
// =============================================================================

pub struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<serde_json::Value>,
}

impl ApiError {
    fn validation(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into(), details: None }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.into(), details: None }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: message.into(), details: None }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.message });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Root, health, status, metrics
// =============================================================================

pub async fn root() -> &'static str {
    "aurora-gateway"
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let body = state.metrics.render();
    ([("content-type", "text/plain; version=0.0.4")], body).into_response()
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<crate::app_state::StatusSnapshot> {
    Json(state.build_snapshot())
}

// =============================================================================
// Agents
// =============================================================================

pub async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<AgentStatusRecord>> {
    Json(state.list_agents())
}

pub async fn get_agent(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> ApiResult<Json<AgentStatusRecord>> {
    state.get_agent(&name).map(Json).ok_or_else(|| ApiError::not_found(format!("unknown agent {name}")))
}

// =============================================================================
// Positions
// =============================================================================

pub async fn list_positions(State(state): State<Arc<AppState>>) -> Json<Vec<crate::exchange::Position>> {
    Json(state.position_manager.list())
}

pub async fn get_position(State(state): State<Arc<AppState>>, Path(symbol): Path<String>) -> ApiResult<Json<crate::exchange::Position>> {
    let session_id = state.current_session_id().ok_or_else(|| ApiError::not_found("no active trading session"))?;
    state
        .position_manager
        .get(session_id, &symbol)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no position for {symbol}")))
}

// =============================================================================
// Orders
// =============================================================================

pub async fn list_orders(State(state): State<Arc<AppState>>) -> Json<Vec<Order>> {
    Json(state.exchange_connector.orders().list())
}

pub async fn get_order(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult<Json<Order>> {
    state
        .exchange_connector
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("unknown order {id}")))
}

pub async fn place_order(State(state): State<Arc<AppState>>, Json(req): Json<PlaceOrderRequest>) -> ApiResult<Response> {
    match state.exchange_connector.place(req).await {
        Ok(order) => {
            let _ = state.store.insert_order(order.clone()).await;
            state.ws_hub.broadcast(&BroadcastMessage::new(
                BroadcastTopic::OrderUpdate,
                json!({ "order_id": order.internal_id, "status": order.status }),
            ));
            state.metrics.record_broadcast();
            Ok((StatusCode::CREATED, Json(order)).into_response())
        }
        Err(e) if e.contains("required for limit orders") || e.contains("must be") || e.contains("empty") => {
            Err(ApiError::validation(e))
        }
        Err(e) => Err(ApiError::internal(e)),
    }
}

pub async fn cancel_order(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult<Json<Order>> {
    state.exchange_connector.cancel(id).await.map(Json).map_err(|e| {
        if e.contains("not found") {
            ApiError::not_found(e)
        } else if e.contains("cannot cancel order in status") || e.contains("no exchange id yet") {
            ApiError::validation(e)
        } else {
            ApiError::internal(e)
        }
    })
}

// =============================================================================
// Trading control
// =============================================================================

#[derive(Deserialize)]
pub struct StartTradeRequest {
    pub symbol: String,
    pub initial_capital: f64,
    pub mode: SessionMode,
    #[serde(default = "default_exchange_name")]
    pub exchange: String,
}

fn default_exchange_name() -> String {
    "binance".to_string()
}

#[derive(Serialize)]
pub struct StartTradeResponse {
    pub session_id: Uuid,
    pub started_at: chrono::DateTime<Utc>,
}

pub async fn trade_start(State(state): State<Arc<AppState>>, Json(req): Json<StartTradeRequest>) -> ApiResult<Json<StartTradeResponse>> {
    if req.symbol.trim().is_empty() {
        return Err(ApiError::validation("symbol must not be empty"));
    }
    if req.initial_capital <= 0.0 {
        return Err(ApiError::validation("initial_capital must be greater than zero"));
    }

    let session = Session::new(req.symbol.clone(), req.mode, req.exchange.clone(), req.initial_capital);
    let id = session.id;
    let started_at = session.started_at;

    state.store.insert_session(session).await.map_err(|e| ApiError::internal(e.to_string()))?;
    state.set_active_session(Some(id));
    state.start_user_data_stream(id);

    state.ws_hub.broadcast(&BroadcastMessage::new(
        BroadcastTopic::SystemStatus,
        json!({
            "event": "trading_started",
            "session_id": id,
            "symbol": req.symbol,
            "mode": req.mode,
        }),
    ));
    state.metrics.record_broadcast();

    Ok(Json(StartTradeResponse { session_id: id, started_at }))
}

#[derive(Deserialize)]
pub struct StopTradeRequest {
    pub session_id: Uuid,
    pub final_capital: f64,
}

pub async fn trade_stop(State(state): State<Arc<AppState>>, Json(req): Json<StopTradeRequest>) -> ApiResult<Json<Session>> {
    if req.final_capital < 0.0 {
        return Err(ApiError::validation("final_capital must not be negative"));
    }

    let session = state
        .store
        .get_session(req.session_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found(format!("unknown session {}", req.session_id)))?;

    let positions = state.position_manager.list();
    let total_pnl: f64 = positions.iter().filter(|p| p.session_id == req.session_id).map(|p| p.realized_pnl).sum();
    let total_trades = state
        .exchange_connector
        .orders()
        .list()
        .iter()
        .filter(|o| o.status == crate::types::OrderStatus::Filled)
        .count() as u32;

    let stopped_at = Utc::now();
    state
        .store
        .update_session_stopped(req.session_id, req.final_capital, total_pnl, total_trades, stopped_at)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    if state.current_session_id() == Some(req.session_id) {
        state.stop_user_data_stream().await;
        state.set_active_session(None);
    }

    state.ws_hub.broadcast(&BroadcastMessage::new(
        BroadcastTopic::SystemStatus,
        json!({ "event": "trading_stopped", "session_id": req.session_id, "total_pnl": total_pnl }),
    ));
    state.metrics.record_broadcast();

    let mut summary = session;
    summary.final_capital = Some(req.final_capital);
    summary.total_pnl = total_pnl;
    summary.total_trades = total_trades;
    summary.stopped_at = Some(stopped_at);
    Ok(Json(summary))
}

#[derive(Deserialize)]
pub struct ControlRequest {
    pub session_id: Uuid,
}

pub async fn trade_pause(state: State<Arc<AppState>>, req: Json<ControlRequest>) -> ApiResult<Response> {
    forward_control(state, req, ControlVerb::Pause).await
}

pub async fn trade_resume(state: State<Arc<AppState>>, req: Json<ControlRequest>) -> ApiResult<Response> {
    forward_control(state, req, ControlVerb::Resume).await
}

async fn forward_control(State(state): State<Arc<AppState>>, Json(req): Json<ControlRequest>, verb: ControlVerb) -> ApiResult<Response> {
    let session = state
        .store
        .get_session(req.session_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    if session.is_none() {
        return Err(ApiError::not_found(format!("unknown session {}", req.session_id)));
    }

    match state.control_proxy.forward(verb, req.session_id).await {
        Ok(resp) => {
            let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY);
            Ok((status, Json(resp.body)).into_response())
        }
        Err(e) => Err(ApiError::internal(e)),
    }
}

// =============================================================================
// Config
// =============================================================================

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<crate::runtime_config::RuntimeConfig> {
    Json(state.runtime_config.read().clone())
}

pub async fn patch_config(State(state): State<Arc<AppState>>, Json(patch): Json<serde_json::Value>) -> ApiResult<Json<crate::runtime_config::RuntimeConfig>> {
    let merged = {
        let current = state.runtime_config.read();
        let mut value = serde_json::to_value(&*current).map_err(|e| ApiError::internal(e.to_string()))?;
        merge_json(&mut value, &patch);
        serde_json::from_value::<crate::runtime_config::RuntimeConfig>(value)
            .map_err(|e| ApiError::validation(format!("invalid config patch: {e}")))?
    };

    {
        let mut config = state.runtime_config.write();
        *config = merged.clone();
    }
    state.increment_version();

    let path = merged.config_path.clone();
    if let Err(e) = merged.save(&path) {
        return Err(ApiError::internal(format!("failed to persist config: {e}")));
    }

    Ok(Json(merged))
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                merge_json(base_map.entry(key.clone()).or_insert(serde_json::Value::Null), value);
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

// =============================================================================
// Decisions / feedback / strategy search
// =============================================================================

#[derive(Deserialize)]
pub struct NewDecisionRequest {
    pub symbol: String,
    pub action: String,
    pub confidence: f64,
    #[serde(default)]
    pub rationale: Option<String>,
}

pub async fn create_decision(State(state): State<Arc<AppState>>, Json(req): Json<NewDecisionRequest>) -> Json<DecisionRecord> {
    let decision = DecisionRecord {
        id: Uuid::new_v4(),
        symbol: req.symbol,
        action: req.action,
        confidence: req.confidence,
        rationale: req.rationale,
        created_at: Utc::now(),
        feedback: None,
    };
    state.record_decision(decision.clone());
    state.ws_hub.broadcast(&BroadcastMessage::new(BroadcastTopic::Decision, serde_json::to_value(&decision).unwrap_or_default()));
    state.metrics.record_broadcast();
    Json(decision)
}

pub async fn list_decisions(State(state): State<Arc<AppState>>) -> Json<Vec<DecisionRecord>> {
    Json(state.list_decisions())
}

#[derive(Deserialize)]
pub struct FeedbackRequest {
    pub decision_id: Uuid,
    pub outcome: String,
}

pub async fn submit_feedback(State(state): State<Arc<AppState>>, Json(req): Json<FeedbackRequest>) -> ApiResult<Json<serde_json::Value>> {
    if state.attach_decision_feedback(req.decision_id, req.outcome) {
        Ok(Json(json!({ "acknowledged": true })))
    } else {
        Err(ApiError::not_found(format!("unknown decision {}", req.decision_id)))
    }
}

#[derive(Deserialize)]
pub struct StrategySearchQuery {
    #[serde(default)]
    pub q: String,
}

pub async fn search_strategy(State(state): State<Arc<AppState>>, Query(params): Query<StrategySearchQuery>) -> Json<Vec<StrategyInfo>> {
    Json(state.search_strategies(&params.q))
}
