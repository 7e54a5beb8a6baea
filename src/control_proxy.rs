// =============================================================================
// Control Proxy — Session lifecycle forwarded to the orchestrator
// =============================================================================
//
// `start`/`stop` mutate the Session row directly and broadcast a status
// event; `pause`/`resume` only forward a request to the orchestrator and
// mirror its response. The retry policy here (linear backoff, transport
// errors only) is deliberately different from the exchange connector's
// exponential policy — see exchange::retry for that one.
// =============================================================================

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_STEP_MS: u64 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_MAX_IDLE_PER_HOST: usize = 10;

const DEFAULT_ORCHESTRATOR_URL: &str = "http://localhost:8081";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ControlVerb {
    Pause,
    Resume,
}

impl ControlVerb {
    fn path(self) -> &'static str {
        match self {
            ControlVerb::Pause => "pause",
            ControlVerb::Resume => "resume",
        }
    }
}

/// Result of forwarding a pause/resume request: the orchestrator's status
/// code and body are mirrored as-is.
pub struct ProxyResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// Resolve the orchestrator base URL. Highest priority wins: an explicit
/// environment override, then the configured value, then the built-in
/// default.
pub fn resolve_orchestrator_url(env_override: Option<&str>, configured: Option<&str>) -> String {
    env_override
        .filter(|s| !s.is_empty())
        .or(configured.filter(|s| !s.is_empty()))
        .unwrap_or(DEFAULT_ORCHESTRATOR_URL)
        .to_string()
}

pub struct ControlProxy {
    client: reqwest::Client,
    orchestrator_url: String,
}

impl ControlProxy {
    pub fn new(orchestrator_url: String) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build control proxy http client");

        Self { client, orchestrator_url }
    }

    /// Forward a pause or resume command with linear backoff on transport
    /// errors. Non-2xx responses from the orchestrator are returned as-is,
    /// without retry.
    pub async fn forward(&self, verb: ControlVerb, session_id: Uuid) -> Result<ProxyResponse, String> {
        let url = format!("{}/sessions/{session_id}/{}", self.orchestrator_url, verb.path());
        let body = json!({ "session_id": session_id });

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.client.post(&url).json(&body).send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.json::<serde_json::Value>().await.unwrap_or(json!({}));
                    return Ok(ProxyResponse { status, body });
                }
                Err(e) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(format!("orchestrator request failed after {attempt} attempts: {e}"));
                    }
                    let delay = Duration::from_millis(BACKOFF_STEP_MS * attempt as u64);
                    warn!(verb = ?verb, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying orchestrator request");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_wins_over_configured() {
        let url = resolve_orchestrator_url(Some("http://env:9000"), Some("http://configured:9000"));
        assert_eq!(url, "http://env:9000");
    }

    #[test]
    fn configured_wins_over_default() {
        let url = resolve_orchestrator_url(None, Some("http://configured:9000"));
        assert_eq!(url, "http://configured:9000");
    }

    #[test]
    fn falls_back_to_default() {
        let url = resolve_orchestrator_url(None, None);
        assert_eq!(url, DEFAULT_ORCHESTRATOR_URL);
    }

    #[test]
    fn empty_env_override_is_ignored() {
        let url = resolve_orchestrator_url(Some(""), Some("http://configured:9000"));
        assert_eq!(url, "http://configured:9000");
    }
}
