// =============================================================================
// Audit Log — async, fire-and-forget persistence for a fixed route allow-list
// =============================================================================
//
// Only trading control, order writes, config reads/updates, and decision
// endpoints are audited. The context persisted is captured at middleware
// time (request id, path, method, actor), not re-derived inside the spawned
// task — the audit write runs to completion independent of the client
// connection's lifecycle, since silently dropping an audit record on a
// client disconnect is the worse failure mode for a control-plane trail.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Snapshot of the request captured by the audit middleware before the
/// handler runs.
#[derive(Debug, Clone, Serialize)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub method: String,
    pub path: String,
    pub actor: Option<String>,
    pub at: DateTime<Utc>,
}

/// Receives audit records. Must not be called from the request path
/// synchronously — callers spawn a task to invoke this.
pub trait AuditSink: Send + Sync {
    fn record(&self, ctx: RequestContext);
}

/// Default sink: logs the audit record via `tracing`.
pub struct LoggingAuditSink;

impl AuditSink for LoggingAuditSink {
    fn record(&self, ctx: RequestContext) {
        info!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.path,
            actor = ?ctx.actor,
            "audit"
        );
    }
}

/// Fixed allow-list of path prefixes that get audited: trading control,
/// order writes, config read/update, and decision endpoints.
const AUDITED_PREFIXES: &[&str] = &[
    "/api/v1/trade/",
    "/api/v1/orders",
    "/api/v1/config",
    "/api/v1/decisions",
];

pub fn is_audited_path(path: &str) -> bool {
    AUDITED_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audits_known_prefixes() {
        assert!(is_audited_path("/api/v1/trade/start"));
        assert!(is_audited_path("/api/v1/orders"));
        assert!(is_audited_path("/api/v1/orders/123"));
        assert!(is_audited_path("/api/v1/config"));
        assert!(is_audited_path("/api/v1/decisions"));
    }

    #[test]
    fn does_not_audit_read_only_routes() {
        assert!(!is_audited_path("/api/v1/health"));
        assert!(!is_audited_path("/api/v1/positions"));
        assert!(!is_audited_path("/metrics"));
    }
}
