use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

const BROADCAST_CHANNEL_CAPACITY: usize = 256;
const CLIENT_OUTBOUND_CAPACITY: usize = 256;

/// Event types carried in a [`super::BroadcastMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastTopic {
    PositionUpdate,
    OrderUpdate,
    TradeUpdate,
    AgentStatus,
    SystemStatus,
    Decision,
}

enum HubEvent {
    Register(Uuid, mpsc::Sender<Message>),
    Unregister(Uuid),
    Broadcast(Vec<u8>),
}

/// Handle shared by every task that needs to talk to the hub: producers
/// (HTTP handlers, the Exchange Connector) and connection tasks.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubEvent>,
    client_count: Arc<AtomicUsize>,
}

impl HubHandle {
    pub fn register(&self, id: Uuid, outbound: mpsc::Sender<Message>) {
        let _ = self.tx.try_send(HubEvent::Register(id, outbound));
    }

    pub fn unregister(&self, id: Uuid) {
        let _ = self.tx.try_send(HubEvent::Unregister(id));
    }

    /// Serialize and fan out `msg` to every registered client. Never blocks.
    pub fn broadcast(&self, msg: &super::BroadcastMessage) {
        let bytes = msg.to_bytes();
        let _ = self.tx.try_send(HubEvent::Broadcast(bytes));
    }

    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::Relaxed)
    }
}

/// The hub's event loop. Owns the client set exclusively; no other task
/// ever reads or writes it directly.
pub struct Hub;

impl Hub {
    /// Spawn the event loop and return a handle for producers to use.
    pub fn spawn() -> HubHandle {
        let (tx, mut rx) = mpsc::channel(BROADCAST_CHANNEL_CAPACITY);
        let client_count = Arc::new(AtomicUsize::new(0));
        let handle = HubHandle { tx, client_count: client_count.clone() };

        tokio::spawn(async move {
            let mut clients: HashMap<Uuid, mpsc::Sender<Message>> = HashMap::new();

            while let Some(event) = rx.recv().await {
                match event {
                    HubEvent::Register(id, outbound) => {
                        clients.insert(id, outbound);
                        client_count.store(clients.len(), Ordering::Relaxed);
                        debug!(client_id = %id, total = clients.len(), "ws client registered");
                    }
                    HubEvent::Unregister(id) => {
                        if let Some(outbound) = clients.remove(&id) {
                            drop(outbound);
                            client_count.store(clients.len(), Ordering::Relaxed);
                            debug!(client_id = %id, total = clients.len(), "ws client unregistered");
                        }
                    }
                    HubEvent::Broadcast(bytes) => {
                        let mut evicted = Vec::new();
                        for (id, outbound) in clients.iter() {
                            if outbound.try_send(Message::Binary(bytes.clone())).is_err() {
                                evicted.push(*id);
                            }
                        }
                        for id in evicted {
                            // Full queue: evict the slow consumer rather than
                            // awaiting it (lossy backpressure).
                            if let Some(outbound) = clients.remove(&id) {
                                drop(outbound);
                            }
                        }
                        if clients.len() != client_count.load(Ordering::Relaxed) {
                            client_count.store(clients.len(), Ordering::Relaxed);
                        }
                    }
                }
            }
            info!("ws hub event loop exiting");
        });

        handle
    }
}

/// Capacity every per-client outbound queue is created with.
pub fn client_outbound_capacity() -> usize {
    CLIENT_OUTBOUND_CAPACITY
}
