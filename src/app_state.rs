// =============================================================================
// Central Application State — Aurora Gateway
// =============================================================================
//
// The single source of truth shared across all async tasks via
// `Arc<AppState>`. Subsystems that manage their own interior mutability
// (the rate limiter, the WS hub, the exchange connector, the store) are held
// behind `Arc`; simpler fields sit directly behind `parking_lot::RwLock`.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::alerts::{Alert, AlertSink, AsyncAlertSink, LoggingAlertSink};
use crate::api::audit::{AuditSink, LoggingAuditSink};
use crate::api::metrics::ApiMetrics;
use crate::control_proxy::ControlProxy;
use crate::exchange::stream::UserDataStreamHandle;
use crate::exchange::{
    ExchangeClient, ExchangeConnector, OrderBook, Position, PositionManager, PositionUpdateEvent,
};
use crate::rate_limit::RateLimiter;
use crate::runtime_config::RuntimeConfig;
use crate::store::{InMemoryStore, Store};
use crate::types::BalanceInfo;
use crate::ws_hub::{BroadcastMessage, BroadcastTopic, Hub, HubHandle};

/// A recorded error event for the status endpoint's error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub at: String,
}

/// Status of an upstream trading agent, as last reported to the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatusRecord {
    pub name: String,
    pub status: String,
    pub last_seen: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A trading decision relayed by the orchestrator, kept around for
/// polling clients and for attaching post-hoc feedback.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub id: Uuid,
    pub symbol: String,
    pub action: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// An entry in the gateway's static strategy catalog, searchable via
/// `/strategy/search`.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyInfo {
    pub name: String,
    pub description: String,
    pub enabled: bool,
}

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;
const MAX_RECENT_DECISIONS: usize = 200;
const ALERT_CHANNEL_CAPACITY: usize = 64;
const POSITION_BROADCAST_CAPACITY: usize = 256;
/// How long to wait for the user-data stream's read loop and keepalive task
/// to exit cleanly on stop before giving up.
const STREAM_STOP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    /// Monotonically increasing version counter, bumped on every
    /// meaningful mutation. Exposed in `/status` so polling clients can
    /// cheaply tell whether anything changed since their last read.
    pub state_version: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    pub rate_limiter: Arc<RateLimiter>,
    pub ws_hub: HubHandle,
    pub control_proxy: Arc<ControlProxy>,
    pub exchange_client: Arc<ExchangeClient>,
    pub exchange_connector: Arc<ExchangeConnector>,
    pub position_manager: Arc<PositionManager>,
    pub store: Arc<dyn Store>,
    pub alerts: Arc<dyn AlertSink>,
    pub audit: Arc<dyn AuditSink>,
    pub metrics: Arc<ApiMetrics>,

    /// The session currently receiving fills from the user-data stream.
    /// `None` until `/trade/start` activates one; orders placed while no
    /// session is active cannot be attributed to a position.
    pub active_session_id: RwLock<Option<Uuid>>,

    /// The running user-data stream for the active session, if any. Owned
    /// here so `/trade/start` and `/trade/stop` can drive its lifecycle.
    user_data_stream: RwLock<Option<UserDataStreamHandle>>,
    position_broadcast_tx: mpsc::Sender<PositionUpdateEvent>,
    position_broadcast_rx: parking_lot::Mutex<Option<mpsc::Receiver<PositionUpdateEvent>>>,

    pub balances: RwLock<Vec<BalanceInfo>>,
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    pub agents: RwLock<HashMap<String, AgentStatusRecord>>,
    pub decisions: RwLock<Vec<DecisionRecord>>,
    pub strategies: RwLock<Vec<StrategyInfo>>,

    pub start_time: std::time::Instant,
}

impl AppState {
    /// Construct a new `AppState` from the given runtime configuration.
    /// Exchange credentials are read from the environment; a missing
    /// secret yields a client that will fail every signed request rather
    /// than panicking at startup, so the gateway can still serve read-only
    /// routes.
    pub fn new(config: RuntimeConfig) -> Self {
        let api_key = std::env::var("EXCHANGE_API_KEY").unwrap_or_default();
        let api_secret = std::env::var("EXCHANGE_API_SECRET").unwrap_or_default();

        let alerts: Arc<dyn AlertSink> =
            Arc::new(AsyncAlertSink::new(ALERT_CHANNEL_CAPACITY, |alert: Alert| {
                LoggingAlertSink.dispatch(alert);
            }));

        let exchange_client = Arc::new(ExchangeClient::new(api_key, api_secret, config.exchange_base_url.clone()));
        let order_book = Arc::new(OrderBook::new());
        let exchange_connector = Arc::new(ExchangeConnector::new(
            (*exchange_client).clone(),
            order_book,
            alerts.clone(),
        ));

        let control_proxy = Arc::new(ControlProxy::new(config.orchestrator_url.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let (position_broadcast_tx, position_broadcast_rx) = mpsc::channel(POSITION_BROADCAST_CAPACITY);

        Self {
            state_version: AtomicU64::new(1),
            runtime_config: Arc::new(RwLock::new(config)),
            rate_limiter,
            ws_hub: Hub::spawn(),
            control_proxy,
            exchange_client,
            exchange_connector,
            position_manager: Arc::new(PositionManager::new()),
            store: Arc::new(InMemoryStore::new()),
            alerts,
            audit: Arc::new(LoggingAuditSink),
            metrics: Arc::new(ApiMetrics::default()),
            active_session_id: RwLock::new(None),
            user_data_stream: RwLock::new(None),
            position_broadcast_tx,
            position_broadcast_rx: parking_lot::Mutex::new(Some(position_broadcast_rx)),
            balances: RwLock::new(Vec::new()),
            recent_errors: RwLock::new(Vec::new()),
            agents: RwLock::new(HashMap::new()),
            decisions: RwLock::new(Vec::new()),
            strategies: RwLock::new(default_strategy_catalog()),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Session Lifecycle ───────────────────────────────────────────────

    pub fn set_active_session(&self, id: Option<Uuid>) {
        *self.active_session_id.write() = id;
        self.increment_version();
    }

    pub fn current_session_id(&self) -> Option<Uuid> {
        *self.active_session_id.read()
    }

    /// Start the exchange's user-data push stream for `session_id`,
    /// replacing any previously running stream. Fills arriving on the
    /// stream are attributed to this session via the position manager.
    pub fn start_user_data_stream(&self, session_id: Uuid) {
        let stream_base_url = self.runtime_config.read().exchange_stream_url.clone();
        let handle = crate::exchange::stream::start(
            self.exchange_client.clone(),
            self.exchange_connector.clone(),
            self.position_manager.clone(),
            session_id,
            stream_base_url,
            self.alerts.clone(),
            self.position_broadcast_tx.clone(),
        );
        *self.user_data_stream.write() = Some(handle);
    }

    /// Stop the running user-data stream, if any, waiting up to
    /// [`STREAM_STOP_TIMEOUT`] for its read loop and keepalive task to exit.
    pub async fn stop_user_data_stream(&self) {
        let handle = self.user_data_stream.write().take();
        let Some(handle) = handle else { return };
        let _ = handle.stop_tx.send(());
        let _ = tokio::time::timeout(STREAM_STOP_TIMEOUT, handle.done_rx).await;
    }

    /// Sender side of the channel the user-data stream uses to report
    /// position updates. Exposed so tests can simulate fills without a
    /// live stream.
    pub fn position_broadcast_tx(&self) -> mpsc::Sender<PositionUpdateEvent> {
        self.position_broadcast_tx.clone()
    }

    /// Spawns the task that relays position-update events from the
    /// exchange connector onto the WS hub as `position_update` broadcasts.
    /// Idempotent beyond the first call: the receiver is taken exactly
    /// once, so later calls are a no-op.
    pub fn spawn_position_broadcast_relay(self: &Arc<Self>) {
        let Some(mut rx) = self.position_broadcast_rx.lock().take() else { return };
        let state = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                state.ws_hub.broadcast(&BroadcastMessage::new(
                    BroadcastTopic::PositionUpdate,
                    serde_json::to_value(&event).unwrap_or_default(),
                ));
                state.metrics.record_broadcast();
            }
        });
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record an error message. The ring buffer is capped at
    /// [`MAX_RECENT_ERRORS`]; oldest entries are evicted when the limit is
    /// reached.
    pub fn push_error(&self, msg: String) {
        self.push_error_with_code(msg, None);
    }

    pub fn push_error_with_code(&self, msg: String, code: Option<String>) {
        let record = ErrorRecord { message: msg, code, at: Utc::now().to_rfc3339() };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }

        self.increment_version();
    }

    // ── Agent Registry ──────────────────────────────────────────────────

    pub fn upsert_agent_status(&self, record: AgentStatusRecord) {
        self.agents.write().insert(record.name.clone(), record);
        self.increment_version();
    }

    pub fn list_agents(&self) -> Vec<AgentStatusRecord> {
        self.agents.read().values().cloned().collect()
    }

    pub fn get_agent(&self, name: &str) -> Option<AgentStatusRecord> {
        self.agents.read().get(name).cloned()
    }

    // ── Decisions ────────────────────────────────────────────────────────

    pub fn record_decision(&self, decision: DecisionRecord) {
        let mut decisions = self.decisions.write();
        decisions.push(decision);
        while decisions.len() > MAX_RECENT_DECISIONS {
            decisions.remove(0);
        }
        self.increment_version();
    }

    pub fn list_decisions(&self) -> Vec<DecisionRecord> {
        self.decisions.read().clone()
    }

    pub fn attach_decision_feedback(&self, decision_id: Uuid, feedback: String) -> bool {
        let mut decisions = self.decisions.write();
        match decisions.iter_mut().find(|d| d.id == decision_id) {
            Some(d) => {
                d.feedback = Some(feedback);
                true
            }
            None => false,
        }
    }

    // ── Strategy Catalog ────────────────────────────────────────────────

    pub fn search_strategies(&self, query: &str) -> Vec<StrategyInfo> {
        let query = query.to_ascii_lowercase();
        self.strategies
            .read()
            .iter()
            .filter(|s| query.is_empty() || s.name.to_ascii_lowercase().contains(&query) || s.description.to_ascii_lowercase().contains(&query))
            .cloned()
            .collect()
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    /// Build a serialisable snapshot of gateway state, used by `GET
    /// /status` and available for any future push feed.
    pub fn build_snapshot(&self) -> StatusSnapshot {
        let config = self.runtime_config.read();

        StatusSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            active_session_id: self.current_session_id(),
            positions: self.position_manager.list(),
            orders: self.exchange_connector.orders().list(),
            balances: self.balances.read().clone(),
            recent_errors: self.recent_errors.read().clone(),
            ws_client_count: self.ws_hub.client_count(),
            production: config.production,
        }
    }
}

// =============================================================================
// Serialisable snapshot types
// =============================================================================

/// Status snapshot returned by `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_session_id: Option<Uuid>,
    pub positions: Vec<Position>,
    pub orders: Vec<crate::exchange::Order>,
    pub balances: Vec<BalanceInfo>,
    pub recent_errors: Vec<ErrorRecord>,
    pub ws_client_count: usize,
    pub production: bool,
}

fn default_strategy_catalog() -> Vec<StrategyInfo> {
    vec![
        StrategyInfo {
            name: "mean_reversion".to_string(),
            description: "Fades short-term deviations from a rolling mean".to_string(),
            enabled: true,
        },
        StrategyInfo {
            name: "momentum".to_string(),
            description: "Follows sustained directional moves".to_string(),
            enabled: false,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_error_caps_ring_buffer() {
        let state = AppState::new(RuntimeConfig::default());
        for i in 0..(MAX_RECENT_ERRORS + 10) {
            state.push_error(format!("error {i}"));
        }
        assert_eq!(state.recent_errors.read().len(), MAX_RECENT_ERRORS);
        assert_eq!(state.recent_errors.read()[0].message, "error 10");
    }

    #[tokio::test]
    async fn session_lifecycle_tracks_active_session() {
        let state = AppState::new(RuntimeConfig::default());
        assert!(state.current_session_id().is_none());
        let id = Uuid::new_v4();
        state.set_active_session(Some(id));
        assert_eq!(state.current_session_id(), Some(id));
    }

    #[tokio::test]
    async fn decision_feedback_attaches_to_existing_record_only() {
        let state = AppState::new(RuntimeConfig::default());
        let decision = DecisionRecord {
            id: Uuid::new_v4(),
            symbol: "BTCUSDT".to_string(),
            action: "buy".to_string(),
            confidence: 0.8,
            rationale: None,
            created_at: Utc::now(),
            feedback: None,
        };
        let id = decision.id;
        state.record_decision(decision);

        assert!(state.attach_decision_feedback(id, "good call".to_string()));
        assert!(!state.attach_decision_feedback(Uuid::new_v4(), "nope".to_string()));

        let stored = state.list_decisions();
        assert_eq!(stored[0].feedback.as_deref(), Some("good call"));
    }

    #[tokio::test]
    async fn strategy_search_matches_name_or_description_case_insensitively() {
        let state = AppState::new(RuntimeConfig::default());
        assert_eq!(state.search_strategies("MOMENTUM").len(), 1);
        assert_eq!(state.search_strategies("rolling mean").len(), 1);
        assert!(state.search_strategies("nonexistent").is_empty());
    }

    #[tokio::test]
    async fn stop_user_data_stream_without_an_active_stream_is_a_no_op() {
        let state = AppState::new(RuntimeConfig::default());
        state.stop_user_data_stream().await;
    }

    #[tokio::test]
    async fn position_broadcast_relay_forwards_events_to_the_ws_hub() {
        let state = Arc::new(AppState::new(RuntimeConfig::default()));
        state.spawn_position_broadcast_relay();

        let before = state.ws_hub.client_count();
        state
            .position_broadcast_tx()
            .send(PositionUpdateEvent {
                session_id: Uuid::new_v4(),
                symbol: "BTCUSDT".to_string(),
                quantity: 1.0,
                avg_entry_price: 100.0,
                realized_pnl: 0.0,
            })
            .await
            .unwrap();

        // No subscribers, so this only exercises that the relay drains
        // the channel without panicking; client_count is unaffected.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(state.ws_hub.client_count(), before);
    }

    #[tokio::test]
    async fn spawn_position_broadcast_relay_is_idempotent_past_the_first_call() {
        let state = Arc::new(AppState::new(RuntimeConfig::default()));
        state.spawn_position_broadcast_relay();
        // Second call finds the receiver already taken and returns immediately.
        state.spawn_position_broadcast_relay();
    }
}
