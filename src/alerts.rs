// =============================================================================
// Alerting — asynchronous, non-blocking failure notifications
// =============================================================================
//
// Order placement failures, cancellation failures, exchange connectivity
// errors, and WebSocket stream startup failures are surfaced here rather
// than bubbled up through the request path, per §7. Dispatch must never
// block the caller.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub category: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Receives alerts. Implementations must not block the caller — logging is
/// synchronous but cheap; anything that could stall (a paging API, a
/// database write) belongs behind a channel, as [`AsyncAlertSink`] does.
pub trait AlertSink: Send + Sync {
    fn dispatch(&self, alert: Alert);
}

/// Default sink: logs via `tracing` at a level matching severity.
pub struct LoggingAlertSink;

impl AlertSink for LoggingAlertSink {
    fn dispatch(&self, alert: Alert) {
        match alert.severity {
            AlertSeverity::Critical => {
                error!(category = %alert.category, message = %alert.message, "alert");
            }
            AlertSeverity::Warning => {
                warn!(category = %alert.category, message = %alert.message, "alert");
            }
        }
    }
}

/// Sink that forwards alerts to a bounded channel drained by a background
/// task, for callers that need to fan alerts out to a paging system without
/// risking backpressure on the request path.
pub struct AsyncAlertSink {
    tx: tokio::sync::mpsc::Sender<Alert>,
}

impl AsyncAlertSink {
    /// Spawns the drain task and returns the sink. `drain` is called once
    /// per alert in the background; it should not panic.
    pub fn new<F>(capacity: usize, mut drain: F) -> Self
    where
        F: FnMut(Alert) + Send + 'static,
    {
        let (tx, mut rx) = tokio::sync::mpsc::channel(capacity);
        tokio::spawn(async move {
            while let Some(alert) = rx.recv().await {
                drain(alert);
            }
        });
        Self { tx }
    }
}

impl AlertSink for AsyncAlertSink {
    fn dispatch(&self, alert: Alert) {
        // try_send: a full queue drops the alert rather than blocking the
        // request path, matching the lossy posture used elsewhere (§4.2).
        if self.tx.try_send(alert).is_err() {
            warn!("alert channel full — dropping alert");
        }
    }
}
