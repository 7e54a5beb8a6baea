use serde::{Deserialize, Serialize};

/// Identifies which specific tier (in addition to `global`) a route falls
/// under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierName {
    Global,
    Control,
    Order,
    Read,
    Search,
}

/// Per-tier limit: max requests per window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierConfig {
    pub max_requests: u32,
    #[serde(with = "humantime_secs")]
    pub window: std::time::Duration,
}

impl TierConfig {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self { max_requests, window: std::time::Duration::from_secs(window_secs) }
    }
}

/// All five tiers plus a kill switch that collapses every tier to
/// pass-through (used in development/testing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub disabled: bool,
    pub global: TierConfig,
    pub control: TierConfig,
    pub order: TierConfig,
    pub read: TierConfig,
    pub search: TierConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            global: TierConfig::new(100, 60),
            control: TierConfig::new(10, 60),
            order: TierConfig::new(30, 60),
            read: TierConfig::new(60, 60),
            search: TierConfig::new(20, 60),
        }
    }
}

/// (de)serialize a `Duration` as whole seconds, matching the rest of the
/// config file's flat, human-editable style.
mod humantime_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
