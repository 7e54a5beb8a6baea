// =============================================================================
// Router-level end-to-end scenarios
// =============================================================================
//
// Exercises the assembled router (rate limiting, WS fan-out, control-proxy
// retry, order validation) the way a real client would, rather than through
// the individual unit tests scattered across the handler modules.
// =============================================================================

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use aurora_gateway::api;
use aurora_gateway::app_state::AppState;
use aurora_gateway::rate_limit::TierConfig;
use aurora_gateway::runtime_config::RuntimeConfig;
use aurora_gateway::store::{Session, Store};
use aurora_gateway::types::SessionMode;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn test_addr() -> SocketAddr {
    "127.0.0.1:1".parse().unwrap()
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let mut req = req;
    req.extensions_mut().insert(ConnectInfo(test_addr()));
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, headers, body)
}

/// Scenario A: 11 requests from the same IP within one window; the first 10
/// reach the handler, the 11th is rejected with `Retry-After >= 1` and
/// `X-RateLimit-Remaining: 0`.
#[tokio::test]
async fn eleventh_request_in_a_window_is_rate_limited() {
    let mut config = RuntimeConfig::default();
    config.rate_limit.read = TierConfig::new(10, 60);
    let state = Arc::new(AppState::new(config));
    let app = api::router(state);

    for _ in 0..10 {
        let req = Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap();
        let (status, _, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
    }

    let req = Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap();
    let (status, headers, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "0");
    let retry_after: u64 = headers.get("retry-after").unwrap().to_str().unwrap().parse().unwrap();
    assert!(retry_after >= 1);
    assert_eq!(body["error"], "rate_limited");
}

/// Scenario B: two subscribers to `/ws` both receive the same broadcast, in
/// order, with the topic and payload intact.
#[tokio::test]
async fn ws_broadcast_reaches_both_subscribers_in_order() {
    let state = Arc::new(AppState::new(RuntimeConfig::default()));
    let app = api::router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await.unwrap();
    });

    let url = format!("ws://{addr}/api/v1/ws");
    let (mut client_a, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (mut client_b, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    // Give the hub a moment to register both clients before broadcasting.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let order_id = Uuid::new_v4();
    state.ws_hub.broadcast(&aurora_gateway::ws_hub::BroadcastMessage::new(
        aurora_gateway::ws_hub::BroadcastTopic::OrderUpdate,
        json!({ "order_id": order_id, "status": "filled" }),
    ));

    for client in [&mut client_a, &mut client_b] {
        let msg = tokio::time::timeout(std::time::Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for broadcast")
            .expect("stream ended")
            .unwrap();
        let text = msg.into_text().unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["type"], "order_update");
        assert_eq!(parsed["data"]["order_id"], order_id.to_string());
    }

    let _ = client_a.close(None).await;
    let _ = client_b.close(None).await;
}

/// Scenario C: the control proxy retries a transport failure up to its
/// bound, succeeding on the final attempt. The orchestrator here is a raw
/// socket that drops the first two connections outright (a transport
/// error, not an HTTP response) and answers the third — `forward()`
/// deliberately does not retry on non-2xx HTTP responses, only on
/// transport errors, so that is what this exercises.
#[tokio::test]
async fn control_proxy_retries_transport_failures_up_to_three_attempts() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = attempts.clone();

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            let n = attempts_clone.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                // Drop the connection without writing a response, which
                // reqwest surfaces as a transport error.
                drop(socket);
                continue;
            }
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let body = b"{}";
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.write_all(body).await;
            let _ = socket.shutdown().await;
            break;
        }
    });

    let mut config = RuntimeConfig::default();
    config.orchestrator_url = format!("http://{addr}");
    let state = Arc::new(AppState::new(config));
    let app = api::router(state.clone());

    let session = Session::new("BTCUSDT".to_string(), SessionMode::Paper, "binance".to_string(), 1000.0);
    let session_id = session.id;
    state.store.insert_session(session).await.unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/trade/pause")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "session_id": session_id }).to_string()))
        .unwrap();
    let (status, _, _) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

/// Scenario D: a limit order with no price is rejected before it ever
/// reaches the exchange connector's placement call.
#[tokio::test]
async fn limit_order_without_price_is_rejected() {
    let state = Arc::new(AppState::new(RuntimeConfig::default()));
    let app = api::router(state);

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/orders")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "symbol": "BTCUSDT", "side": "buy", "type": "limit", "qty": 1.0, "price": 0 }).to_string()))
        .unwrap();
    let (status, _, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "price is required for limit orders");
}
