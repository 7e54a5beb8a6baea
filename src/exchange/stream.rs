// =============================================================================
// User-data push stream — listen-key lifecycle, execution reports
// =============================================================================
//
// Connects to the exchange's authenticated user-data WebSocket, keeps the
// listen key alive on a 30-minute timer, and routes execution-report events
// to the order book and Position Manager. account-position/balance-update
// events are logged only.
//
// Shutdown is explicit: a stop channel unblocks both the read loop and the
// keep-alive task; a done channel confirms exit (§4.4).
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::alerts::{Alert, AlertSeverity, AlertSink};
use crate::exchange::client::ExchangeClient;
use crate::exchange::connector::ExchangeConnector;
use crate::exchange::positions::{PositionManager, PositionUpdateEvent};

const KEEPALIVE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30 * 60);
/// Capacity of the error-report channel; overflow drops the oldest-pending
/// notification rather than blocking the stream handler.
const ERROR_CHANNEL_CAPACITY: usize = 10;

pub struct UserDataStreamHandle {
    pub stop_tx: oneshot::Sender<()>,
    pub done_rx: oneshot::Receiver<()>,
    pub errors_rx: mpsc::Receiver<String>,
}

/// Start the user-data stream. Returns a handle the caller uses for
/// graceful shutdown and for observing connectivity errors.
pub fn start(
    client: Arc<ExchangeClient>,
    connector: Arc<ExchangeConnector>,
    position_manager: Arc<PositionManager>,
    session_id: Uuid,
    stream_base_url: String,
    alerts: Arc<dyn AlertSink>,
    broadcast: mpsc::Sender<PositionUpdateEvent>,
) -> UserDataStreamHandle {
    let (stop_tx, stop_rx) = oneshot::channel();
    let (done_tx, done_rx) = oneshot::channel();
    let (errors_tx, errors_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);

    tokio::spawn(run(
        client,
        connector,
        position_manager,
        session_id,
        stream_base_url,
        alerts,
        broadcast,
        stop_rx,
        done_tx,
        errors_tx,
    ));

    UserDataStreamHandle { stop_tx, done_rx, errors_rx }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    client: Arc<ExchangeClient>,
    connector: Arc<ExchangeConnector>,
    position_manager: Arc<PositionManager>,
    session_id: Uuid,
    stream_base_url: String,
    alerts: Arc<dyn AlertSink>,
    broadcast: mpsc::Sender<PositionUpdateEvent>,
    mut stop_rx: oneshot::Receiver<()>,
    done_tx: oneshot::Sender<()>,
    errors_tx: mpsc::Sender<String>,
) {
    let listen_key = match client.create_listen_key().await {
        Ok(k) => k,
        Err(e) => {
            error!(error = %e, "failed to create listen key");
            alerts.dispatch(Alert {
                severity: AlertSeverity::Critical,
                category: "ws_stream_startup_failed".to_string(),
                message: format!("failed to create listen key: {e}"),
                at: Utc::now(),
            });
            let _ = done_tx.send(());
            return;
        }
    };

    let (keepalive_stop_tx, mut keepalive_stop_rx) = oneshot::channel::<()>();
    let keepalive_client = client.clone();
    let keepalive_key = listen_key.clone();
    let keepalive_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(KEEPALIVE_INTERVAL);
        interval.tick().await; // first tick fires immediately; skip it
        loop {
            tokio::select! {
                _ = &mut keepalive_stop_rx => break,
                _ = interval.tick() => {
                    if let Err(e) = keepalive_client.keepalive_listen_key(&keepalive_key).await {
                        warn!(error = %e, "listen key keepalive failed");
                    }
                }
            }
        }
    });

    let url = format!("{stream_base_url}/ws/{listen_key}");
    let connect_result = connect_async(&url).await.context("failed to connect user-data stream");

    let ws_stream = match connect_result {
        Ok((stream, _)) => stream,
        Err(e) => {
            error!(error = %e, "user-data stream connect failed");
            alerts.dispatch(Alert {
                severity: AlertSeverity::Critical,
                category: "ws_stream_startup_failed".to_string(),
                message: format!("{e}"),
                at: Utc::now(),
            });
            let _ = keepalive_stop_tx.send(());
            let _ = keepalive_task.await;
            let _ = client.close_listen_key(&listen_key).await;
            let _ = done_tx.send(());
            return;
        }
    };

    info!("user-data stream connected");
    let (_write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                info!("user-data stream received stop signal");
                break;
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(tokio_tungstenite::tungstenite::Message::Text(text))) => {
                        handle_event(&text, &connector, &position_manager, session_id, &broadcast).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(error = %e, "user-data stream read error");
                        alerts.dispatch(Alert {
                            severity: AlertSeverity::Critical,
                            category: "connection_error".to_string(),
                            message: format!("{e}"),
                            at: Utc::now(),
                        });
                        let _ = errors_tx.try_send(format!("{e}"));
                        break;
                    }
                    None => {
                        warn!("user-data stream ended");
                        break;
                    }
                }
            }
        }
    }

    let _ = keepalive_stop_tx.send(());
    let _ = keepalive_task.await;
    if let Err(e) = client.close_listen_key(&listen_key).await {
        warn!(error = %e, "failed to close listen key on shutdown");
    }
    let _ = done_tx.send(());
}

async fn handle_event(
    text: &str,
    connector: &Arc<ExchangeConnector>,
    position_manager: &Arc<PositionManager>,
    session_id: Uuid,
    broadcast: &mpsc::Sender<PositionUpdateEvent>,
) {
    let root: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "failed to parse user-data event");
            return;
        }
    };

    match root["e"].as_str() {
        Some("executionReport") => {
            let exchange_order_id = root["i"]
                .as_u64()
                .map(|n| n.to_string())
                .unwrap_or_default();

            let Some(internal_id) = connector.orders().internal_id_for_exchange_id(&exchange_order_id) else {
                warn!(exchange_order_id, "execution report for unknown order — dropping");
                return;
            };

            let raw_status = root["X"].as_str().unwrap_or("");
            let cumulative_filled_qty: f64 = root["z"].as_str().unwrap_or("0").parse().unwrap_or(0.0);
            let cumulative_quote_volume: f64 = root["Z"].as_str().unwrap_or("0").parse().unwrap_or(0.0);
            let latest_fill_qty: f64 = root["l"].as_str().unwrap_or("0").parse().unwrap_or(0.0);
            let latest_fill_price: f64 = root["L"].as_str().unwrap_or("0").parse().unwrap_or(0.0);

            let fill = connector.orders().update(internal_id, |order| {
                order.apply_execution_report(
                    raw_status,
                    cumulative_filled_qty,
                    cumulative_quote_volume,
                    latest_fill_qty,
                    latest_fill_price,
                    Utc::now(),
                );
            });

            if let Some(order) = fill {
                if order.status == crate::types::OrderStatus::Filled {
                    if let Some(last) = order.fills.last().cloned() {
                        let event = position_manager.on_order_filled(session_id, &order, &[last]);
                        let _ = broadcast.try_send(event);
                    }
                }
            }
        }
        Some("outboundAccountPosition") | Some("balanceUpdate") => {
            info!(event = ?root["e"], "account/balance update received (log only)");
        }
        other => {
            warn!(event = ?other, "unhandled user-data event type");
        }
    }
}
