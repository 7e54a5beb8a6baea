// =============================================================================
// WebSocket Hub — fan-out broadcast with lossy per-client backpressure
// =============================================================================
//
// Mirrors the gorilla/websocket hub pattern: a single event loop owns the
// client set and is the only task that ever mutates it. Everyone else talks
// to the hub through channels.
// =============================================================================

mod client;
mod hub;
mod origin;

pub use client::{spawn_client, ClientConfig};
pub use hub::{BroadcastTopic, Hub, HubHandle};
pub use origin::OriginPolicy;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Envelope wrapping every broadcast payload. `data` is pre-serialized by
/// the caller so the hub serializes the envelope exactly once per event.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastMessage {
    #[serde(rename = "type")]
    pub topic: BroadcastTopic,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl BroadcastMessage {
    pub fn new(topic: BroadcastTopic, data: serde_json::Value) -> Self {
        Self { topic, timestamp: Utc::now(), data }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}
