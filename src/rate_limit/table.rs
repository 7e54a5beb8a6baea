use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::tier::TierConfig;

/// Result of a single admission check, carrying everything needed to set
/// the HTTP rate-limit headers.
#[derive(Debug, Clone, Copy)]
pub struct Admission {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix seconds at which the window this request falls in resets.
    pub reset_at: u64,
}

impl Admission {
    pub fn allowed(limit: u32, remaining: u32, reset_at: u64) -> Self {
        Self { allowed: true, limit, remaining, reset_at }
    }

    /// Seconds the client should wait before retrying, minimum 1.
    pub fn retry_after(&self) -> u64 {
        let now = unix_now();
        self.reset_at.saturating_sub(now).max(1)
    }
}

struct Entry {
    timestamps: Mutex<VecDeque<SystemTime>>,
}

/// One tier's per-IP sliding-window-log table. Lock-free insert-if-absent
/// across IPs; a per-entry mutex serializes admission for the same IP.
pub struct RateLimitTable {
    entries: DashMap<String, Arc<Entry>>,
    config: TierConfig,
}

impl RateLimitTable {
    pub fn new(config: TierConfig) -> Self {
        Self { entries: DashMap::new(), config }
    }

    pub fn admit(&self, ip: &str) -> Admission {
        let entry = self
            .entries
            .entry(ip.to_string())
            .or_insert_with(|| Arc::new(Entry { timestamps: Mutex::new(VecDeque::new()) }))
            .clone();

        let now = SystemTime::now();
        let window = self.config.window;
        let max = self.config.max_requests;

        let mut timestamps = entry.timestamps.lock();
        while let Some(&oldest) = timestamps.front() {
            if now.duration_since(oldest).unwrap_or(Duration::ZERO) >= window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        let oldest = timestamps.front().copied();
        let count = timestamps.len() as u32;

        if count >= max {
            let reset_at = to_unix(oldest.unwrap_or(now) + window);
            return Admission { allowed: false, limit: max, remaining: 0, reset_at };
        }

        timestamps.push_back(now);
        let remaining = max - (count + 1);
        let reset_at = to_unix(oldest.unwrap_or(now) + window);
        Admission { allowed: true, limit: max, remaining, reset_at }
    }

    /// Remove entries whose newest timestamp is older than 2x the tier's
    /// window. Returns the number of entries removed.
    pub fn evict_stale(&self) -> usize {
        let now = SystemTime::now();
        let stale_after = self.config.window * 2;
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let timestamps = entry.timestamps.lock();
            let keep = match timestamps.back() {
                Some(&newest) => now.duration_since(newest).unwrap_or(Duration::ZERO) < stale_after,
                None => false,
            };
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn to_unix(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs()
}

fn unix_now() -> u64 {
    to_unix(SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_max_then_denies() {
        let table = RateLimitTable::new(TierConfig::new(2, 60));
        assert!(table.admit("1.1.1.1").allowed);
        assert!(table.admit("1.1.1.1").allowed);
        let third = table.admit("1.1.1.1");
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
    }

    #[test]
    fn tracks_ips_independently() {
        let table = RateLimitTable::new(TierConfig::new(1, 60));
        assert!(table.admit("1.1.1.1").allowed);
        assert!(table.admit("2.2.2.2").allowed);
        assert!(!table.admit("1.1.1.1").allowed);
    }

    #[test]
    fn remaining_decrements_with_each_admission() {
        let table = RateLimitTable::new(TierConfig::new(5, 60));
        let a = table.admit("1.1.1.1");
        let b = table.admit("1.1.1.1");
        assert_eq!(a.remaining, 4);
        assert_eq!(b.remaining, 3);
    }

    #[test]
    fn evict_stale_removes_old_entries_only() {
        let table = RateLimitTable::new(TierConfig::new(5, 0));
        table.admit("1.1.1.1");
        std::thread::sleep(Duration::from_millis(5));
        let removed = table.evict_stale();
        assert_eq!(removed, 1);
        assert_eq!(table.len(), 0);
    }
}
