// =============================================================================
// Exchange REST Client — HMAC-SHA256 signed requests
// =============================================================================
//
// The secret key is never logged or serialized. All signed requests include
// the API key as a header and a recvWindow to tolerate minor clock drift
// between the gateway and the exchange.
// =============================================================================

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

type HmacSha256 = Hmac<Sha256>;

const RECV_WINDOW: u64 = 5000;

/// Signed REST client for the exchange's order and account endpoints.
#[derive(Clone)]
pub struct ExchangeClient {
    api_key: String,
    secret: String,
    base_url: String,
    client: reqwest::Client,
}

impl ExchangeClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>, base_url: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let secret = secret.into();

        let mut default_headers = HeaderMap::new();
        if let Ok(val) = HeaderValue::from_str(&api_key) {
            default_headers.insert("X-MBX-APIKEY", val);
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            api_key,
            secret,
            base_url: base_url.into(),
            client,
        }
    }

    pub fn sign(&self, query: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_millis() as u64
    }

    fn signed_query(&self, params: &str) -> String {
        let ts = Self::timestamp_ms();
        let base = if params.is_empty() {
            format!("timestamp={ts}&recvWindow={RECV_WINDOW}")
        } else {
            format!("{params}&timestamp={ts}&recvWindow={RECV_WINDOW}")
        };
        let sig = self.sign(&base);
        format!("{base}&signature={sig}")
    }

    #[instrument(skip(self), name = "exchange::place_order")]
    pub async fn place_order(
        &self,
        symbol: &str,
        side: &str,
        order_type: &str,
        quantity: f64,
        price: Option<f64>,
    ) -> Result<serde_json::Value> {
        let mut params = format!("symbol={symbol}&side={side}&type={order_type}&quantity={quantity}");
        if let Some(p) = price {
            params.push_str(&format!("&price={p}&timeInForce=GTC"));
        }

        let qs = self.signed_query(&params);
        let url = format!("{}/api/v3/order?{}", self.base_url, qs);

        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .context("POST /api/v3/order request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse order response")?;

        if !status.is_success() {
            anyhow::bail!("exchange POST /api/v3/order returned {}: {}", status, body);
        }

        debug!(symbol, side, "order placed");
        Ok(body)
    }

    #[instrument(skip(self), name = "exchange::cancel_order")]
    pub async fn cancel_order(&self, symbol: &str, exchange_order_id: &str) -> Result<serde_json::Value> {
        let params = format!("symbol={symbol}&orderId={exchange_order_id}");
        let qs = self.signed_query(&params);
        let url = format!("{}/api/v3/order?{}", self.base_url, qs);

        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .context("DELETE /api/v3/order request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse cancel response")?;

        if !status.is_success() {
            anyhow::bail!("exchange DELETE /api/v3/order returned {}: {}", status, body);
        }

        debug!(symbol, exchange_order_id, "order cancelled");
        Ok(body)
    }

    #[instrument(skip(self), name = "exchange::get_order")]
    pub async fn get_order(&self, symbol: &str, exchange_order_id: &str) -> Result<serde_json::Value> {
        let params = format!("symbol={symbol}&orderId={exchange_order_id}");
        let qs = self.signed_query(&params);
        let url = format!("{}/api/v3/order?{}", self.base_url, qs);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /api/v3/order request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse order response")?;

        if !status.is_success() {
            anyhow::bail!("exchange GET /api/v3/order returned {}: {}", status, body);
        }

        Ok(body)
    }

    #[instrument(skip(self), name = "exchange::create_listen_key")]
    pub async fn create_listen_key(&self) -> Result<String> {
        let url = format!("{}/api/v3/userDataStream", self.base_url);
        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .context("POST /api/v3/userDataStream request failed")?;
        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse listen key response")?;
        if !status.is_success() {
            anyhow::bail!("exchange POST /api/v3/userDataStream returned {}: {}", status, body);
        }
        body["listenKey"]
            .as_str()
            .map(|s| s.to_string())
            .context("missing listenKey in response")
    }

    #[instrument(skip(self, listen_key), name = "exchange::keepalive_listen_key")]
    pub async fn keepalive_listen_key(&self, listen_key: &str) -> Result<()> {
        let url = format!("{}/api/v3/userDataStream?listenKey={}", self.base_url, listen_key);
        let resp = self
            .client
            .put(&url)
            .send()
            .await
            .context("PUT /api/v3/userDataStream request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("exchange PUT /api/v3/userDataStream returned {}", resp.status());
        }
        Ok(())
    }

    #[instrument(skip(self, listen_key), name = "exchange::close_listen_key")]
    pub async fn close_listen_key(&self, listen_key: &str) -> Result<()> {
        let url = format!("{}/api/v3/userDataStream?listenKey={}", self.base_url, listen_key);
        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .context("DELETE /api/v3/userDataStream request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("exchange DELETE /api/v3/userDataStream returned {}", resp.status());
        }
        Ok(())
    }
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}
