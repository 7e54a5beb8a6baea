// =============================================================================
// Runtime Configuration — Hot-reloadable gateway settings with atomic save
// =============================================================================
//
// Every tunable the gateway exposes through `GET/PATCH /api/v1/config` lives
// here. Persistence uses an atomic tmp + rename pattern to prevent
// corruption on crash. All fields carry `#[serde(default)]` so that adding
// new fields never breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::rate_limit::RateLimitConfig;

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_orchestrator_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_config_path() -> String {
    "config.json".to_string()
}

fn default_ws_allowed_origins() -> Vec<String> {
    Vec::new()
}

fn default_exchange_base_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_exchange_stream_url() -> String {
    "wss://stream.binance.com:9443".to_string()
}

/// Top-level runtime configuration for the gateway.
///
/// Every field has a serde default so that older JSON files missing new
/// fields still deserialize correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_api_host")]
    pub api_host: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_orchestrator_url")]
    pub orchestrator_url: String,

    #[serde(default = "default_config_path")]
    pub config_path: String,

    /// Exact-match allow-list of `Origin` header values permitted to
    /// upgrade to a WebSocket connection.
    #[serde(default = "default_ws_allowed_origins")]
    pub ws_allowed_origins: Vec<String>,

    /// Tightens WS origin checks and surfaces warnings for risky origins
    /// when true; see `ws_hub::OriginPolicy`.
    #[serde(default)]
    pub production: bool,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default = "default_exchange_base_url")]
    pub exchange_base_url: String,

    #[serde(default = "default_exchange_stream_url")]
    pub exchange_stream_url: String,

    /// Whether the exchange credentials point at a sandbox/testnet
    /// environment.
    #[serde(default)]
    pub exchange_testnet: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_host: default_api_host(),
            api_port: default_api_port(),
            orchestrator_url: default_orchestrator_url(),
            config_path: default_config_path(),
            ws_allowed_origins: default_ws_allowed_origins(),
            production: false,
            rate_limit: RateLimitConfig::default(),
            exchange_base_url: default_exchange_base_url(),
            exchange_stream_url: default_exchange_stream_url(),
            exchange_testnet: true,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(path = %path.display(), api_port = config.api_port, "runtime config loaded");

        Ok(config)
    }

    /// Load from `path`, falling back to defaults with a warning if the
    /// file is missing or unreadable.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "falling back to default runtime config");
                Self::default()
            }
        }
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self).context("failed to serialize runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply environment variable overrides on top of a loaded config,
    /// per the precedence rules in §6 (env beats file for these fields).
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(host) = std::env::var("API_HOST") {
            self.api_host = host;
        }
        if let Ok(port) = std::env::var("API_PORT") {
            if let Ok(port) = port.parse() {
                self.api_port = port;
            }
        }
        if let Ok(url) = std::env::var("ORCHESTRATOR_URL") {
            if !url.is_empty() {
                self.orchestrator_url = url;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.api_host, "0.0.0.0");
        assert_eq!(cfg.api_port, 8080);
        assert_eq!(cfg.orchestrator_url, "http://localhost:8081");
        assert!(!cfg.production);
        assert!(cfg.ws_allowed_origins.is_empty());
    }

    #[test]
    fn deserialize_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.api_port, 8080);
        assert_eq!(cfg.rate_limit.global.max_requests, 100);
    }

    #[test]
    fn deserialize_partial_json_fills_defaults() {
        let json = r#"{ "api_port": 9090, "production": true }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.api_port, 9090);
        assert!(cfg.production);
        assert_eq!(cfg.orchestrator_url, "http://localhost:8081");
    }

    #[test]
    fn roundtrip_serialization() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.api_port, cfg2.api_port);
        assert_eq!(cfg.orchestrator_url, cfg2.orchestrator_url);
    }

    #[test]
    fn env_override_wins_over_file_value() {
        std::env::set_var("API_PORT", "9999");
        let cfg = RuntimeConfig::default().apply_env_overrides();
        assert_eq!(cfg.api_port, 9999);
        std::env::remove_var("API_PORT");
    }
}
