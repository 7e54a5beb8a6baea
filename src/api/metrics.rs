// =============================================================================
// Metrics — minimal Prometheus text-format counters
// =============================================================================
//
// Registration with a real Prometheus client is out of scope; this is the
// fixed counter set the gateway exposes at `GET /metrics`.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct ApiMetrics {
    pub requests_total: AtomicU64,
    pub rate_limited_total: AtomicU64,
    pub ws_broadcasts_total: AtomicU64,
}

impl ApiMetrics {
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self) {
        self.ws_broadcasts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Render the counter set as a Prometheus text-exposition body.
    pub fn render(&self) -> String {
        format!(
            "# HELP gateway_requests_total Total HTTP requests handled.\n\
             # TYPE gateway_requests_total counter\n\
             gateway_requests_total {}\n\
             # HELP gateway_rate_limited_total Requests denied by the rate limiter.\n\
             # TYPE gateway_rate_limited_total counter\n\
             gateway_rate_limited_total {}\n\
             # HELP gateway_ws_broadcasts_total WebSocket broadcasts fanned out.\n\
             # TYPE gateway_ws_broadcasts_total counter\n\
             gateway_ws_broadcasts_total {}\n",
            self.requests_total.load(Ordering::Relaxed),
            self.rate_limited_total.load(Ordering::Relaxed),
            self.ws_broadcasts_total.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_reflects_recorded_counts() {
        let metrics = ApiMetrics::default();
        metrics.record_request();
        metrics.record_request();
        metrics.record_rate_limited();
        let body = metrics.render();
        assert!(body.contains("gateway_requests_total 2"));
        assert!(body.contains("gateway_rate_limited_total 1"));
    }
}
