// =============================================================================
// Rate Limiter — per-IP sliding-window log, five independent tiers
// =============================================================================
//
// Each tier (global/control/order/read/search) has its own table of
// per-IP entries. Handlers consult the global tier plus at most one
// specific tier; both must admit for the request to proceed.
//
// The per-tier table is a lock-free concurrent map (dashmap) keyed by IP;
// each entry carries its own mutex so admission for different IPs never
// contends. This mirrors the exchange client's per-account isolation idiom
// without needing per-account state here — the isolation unit is the IP.
// =============================================================================

mod table;
mod tier;

pub use table::{Admission, RateLimitTable};
pub use tier::{RateLimitConfig, TierConfig, TierName};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::interval;
use tracing::{info, warn};

/// Every tier's table plus the shared configuration, grouped for
/// convenient construction in `AppState`.
pub struct RateLimiter {
    pub config: RateLimitConfig,
    pub global: RateLimitTable,
    pub control: RateLimitTable,
    pub order: RateLimitTable,
    pub read: RateLimitTable,
    pub search: RateLimitTable,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            global: RateLimitTable::new(config.global.clone()),
            control: RateLimitTable::new(config.control.clone()),
            order: RateLimitTable::new(config.order.clone()),
            read: RateLimitTable::new(config.read.clone()),
            search: RateLimitTable::new(config.search.clone()),
            config,
        }
    }

    pub fn table(&self, tier: TierName) -> &RateLimitTable {
        match tier {
            TierName::Global => &self.global,
            TierName::Control => &self.control,
            TierName::Order => &self.order,
            TierName::Read => &self.read,
            TierName::Search => &self.search,
        }
    }

    /// Check the global tier and, if given, one specific tier. Both must
    /// admit; the tier that denies (if any) determines the returned
    /// headers, with the global tier checked first.
    pub fn admit(&self, ip: &str, specific: Option<TierName>) -> Admission {
        if self.config.disabled {
            return Admission::allowed(0, 0, 0);
        }

        let global = self.global.admit(ip);
        if !global.allowed {
            return global;
        }

        match specific {
            Some(tier) => self.table(tier).admit(ip),
            None => global,
        }
    }
}

/// Handle returned by [`spawn_cleanup_worker`]: a stop signal and a done
/// signal for graceful shutdown.
pub struct CleanupWorkerHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    done_rx: Option<oneshot::Receiver<()>>,
}

impl CleanupWorkerHandle {
    /// Send the stop signal and wait up to 5 s for the worker to confirm
    /// exit. Logs a warning and returns if the deadline elapses.
    pub async fn shutdown(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(done_rx) = self.done_rx.take() {
            if tokio::time::timeout(Duration::from_secs(5), done_rx).await.is_err() {
                warn!("rate limiter cleanup worker did not exit within 5s");
            }
        }
    }
}

/// Spawn the single cooperative task that periodically evicts stale
/// per-IP entries from every tier's table.
pub fn spawn_cleanup_worker(limiter: Arc<RateLimiter>, scan_interval: Duration) -> CleanupWorkerHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel();
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        let mut ticker = interval(scan_interval);
        ticker.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    info!("rate limiter cleanup worker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = limiter.global.evict_stale()
                        + limiter.control.evict_stale()
                        + limiter.order.evict_stale()
                        + limiter.read.evict_stale()
                        + limiter.search.evict_stale();
                    if removed > 0 {
                        info!(removed, "rate limiter cleanup evicted stale entries");
                    }
                }
            }
        }
        let _ = done_tx.send(());
    });

    CleanupWorkerHandle { stop_tx: Some(stop_tx), done_rx: Some(done_rx) }
}
