use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tracing::{debug, warn};
use uuid::Uuid;

use super::hub::{client_outbound_capacity, HubHandle};

/// Heartbeat and framing tunables for a client connection.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    pub pong_wait: Duration,
    pub write_wait: Duration,
    pub max_message_size: usize,
}

impl ClientConfig {
    pub fn ping_period(&self) -> Duration {
        self.pong_wait.mul_f64(0.9)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
            max_message_size: 512,
        }
    }
}

#[derive(Deserialize)]
struct InboundEnvelope {
    #[serde(rename = "type")]
    kind: String,
}

/// Register a freshly-upgraded socket with the hub and run its reader and
/// writer tasks until either side errors or the hub evicts the client.
pub fn spawn_client(socket: WebSocket, hub: HubHandle, config: ClientConfig) {
    let id = Uuid::new_v4();
    let (outbound_tx, outbound_rx) = mpsc::channel(client_outbound_capacity());
    hub.register(id, outbound_tx.clone());

    let (sender, receiver) = socket.split();
    tokio::spawn(writer_task(id, sender, outbound_rx, config));
    tokio::spawn(reader_task(id, receiver, hub, outbound_tx, config));
}

async fn writer_task(
    id: Uuid,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Message>,
    config: ClientConfig,
) {
    let mut ping_ticker = interval(config.ping_period());
    ping_ticker.tick().await;

    loop {
        tokio::select! {
            _ = ping_ticker.tick() => {
                if timeout(config.write_wait, sender.send(Message::Ping(Vec::new().into()))).await.is_err() {
                    debug!(client_id = %id, "ping write timed out — closing");
                    break;
                }
            }
            msg = outbound.recv() => {
                let Some(first) = msg else {
                    debug!(client_id = %id, "outbound channel closed — writer exiting");
                    break;
                };

                let mut frame = as_text(first);
                // Drain whatever is already queued into the same frame,
                // separated by newlines, instead of writing one frame each.
                while let Ok(next) = outbound.try_recv() {
                    frame.push('\n');
                    frame.push_str(&as_text(next));
                }

                if timeout(config.write_wait, sender.send(Message::Text(frame.into()))).await.is_err() {
                    debug!(client_id = %id, "write timed out — closing");
                    break;
                }
            }
        }
    }
}

fn as_text(msg: Message) -> String {
    match msg {
        Message::Text(t) => t.to_string(),
        Message::Binary(b) => String::from_utf8_lossy(&b).into_owned(),
        _ => String::new(),
    }
}

async fn reader_task(
    id: Uuid,
    mut receiver: futures_util::stream::SplitStream<WebSocket>,
    hub: HubHandle,
    outbound: mpsc::Sender<Message>,
    config: ClientConfig,
) {
    loop {
        let next = timeout(config.pong_wait, receiver.next()).await;
        let msg = match next {
            Ok(msg) => msg,
            Err(_) => {
                debug!(client_id = %id, "read deadline expired — disconnecting");
                break;
            }
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                if text.len() > config.max_message_size {
                    warn!(client_id = %id, "inbound message exceeds max size — ignoring");
                    continue;
                }
                handle_inbound(&id, &text, &outbound);
            }
            Some(Ok(Message::Pong(_))) => {
                // Deadline is implicitly extended: the loop re-enters
                // `timeout` on the next iteration.
            }
            Some(Ok(Message::Close(_))) => {
                debug!(client_id = %id, "client sent close frame");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(client_id = %id, error = %e, "read error — disconnecting");
                break;
            }
            None => {
                debug!(client_id = %id, "stream ended — disconnecting");
                break;
            }
        }
    }

    hub.unregister(id);
}

fn handle_inbound(id: &Uuid, text: &str, outbound: &mpsc::Sender<Message>) {
    match serde_json::from_str::<InboundEnvelope>(text) {
        Ok(envelope) if envelope.kind == "ping" => {
            debug!(client_id = %id, "client ping received — replying pong");
            let _ = outbound.try_send(Message::Text(r#"{"type":"pong"}"#.into()));
        }
        Ok(envelope) => {
            debug!(client_id = %id, kind = %envelope.kind, "unknown inbound message type — ignored");
        }
        Err(e) => {
            warn!(client_id = %id, error = %e, "failed to decode inbound message");
        }
    }
}
