// =============================================================================
// Exchange Connector — orders lifecycle, wrapping REST calls with backoff
// =============================================================================

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::alerts::{Alert, AlertSeverity, AlertSink};
use crate::exchange::client::ExchangeClient;
use crate::exchange::orders::{Order, OrderBook, PlaceOrderRequest};
use crate::exchange::retry::with_backoff;
use crate::types::OrderStatus;

pub struct ExchangeConnector {
    client: ExchangeClient,
    orders: Arc<OrderBook>,
    alerts: Arc<dyn AlertSink>,
}

impl ExchangeConnector {
    pub fn new(client: ExchangeClient, orders: Arc<OrderBook>, alerts: Arc<dyn AlertSink>) -> Self {
        Self { client, orders, alerts }
    }

    pub fn orders(&self) -> &Arc<OrderBook> {
        &self.orders
    }

    /// Validate and submit a new order, retrying transient failures with
    /// exponential backoff. On failure after retries, the order is recorded
    /// as `rejected` and a critical alert is raised.
    pub async fn place(&self, req: PlaceOrderRequest) -> Result<Order, String> {
        req.validate()?;

        let mut order = Order::new(&req);
        self.orders.insert(order.clone());

        let side = req.side.to_string().to_uppercase();
        let order_type = req.order_type.to_string().to_uppercase();

        let result = with_backoff("place_order", || {
            self.client.place_order(&req.symbol, &side, &order_type, req.qty, req.price)
        })
        .await;

        match result {
            Ok(body) => {
                let exchange_order_id = body["orderId"]
                    .as_u64()
                    .map(|n| n.to_string())
                    .or_else(|| body["orderId"].as_str().map(|s| s.to_string()))
                    .unwrap_or_default();

                let raw_status = body["status"].as_str().unwrap_or("NEW");
                let status = Order::map_exchange_status(raw_status);

                self.orders.set_exchange_id(order.internal_id, exchange_order_id.clone());
                let updated = self
                    .orders
                    .update(order.internal_id, |o| {
                        o.exchange_order_id = Some(exchange_order_id);
                        o.status = status;
                    })
                    .unwrap_or(order.clone());
                order = updated;
                Ok(order)
            }
            Err(e) => {
                self.orders.update(order.internal_id, |o| {
                    o.status = OrderStatus::Rejected;
                });
                self.alerts.dispatch(Alert {
                    severity: AlertSeverity::Critical,
                    category: "order_placement_failed".to_string(),
                    message: format!("order placement failed for {}: {e}", req.symbol),
                    at: Utc::now(),
                });
                Err(format!("order placement failed: {e}"))
            }
        }
    }

    /// Cancel an order. Only valid when the order is `open` or `pending`;
    /// returns an error without contacting the exchange otherwise (§8.7).
    pub async fn cancel(&self, internal_id: Uuid) -> Result<Order, String> {
        let order = self.orders.get(internal_id).ok_or("order not found")?;
        if !matches!(order.status, OrderStatus::Open | OrderStatus::Pending) {
            return Err(format!("cannot cancel order in status {}", order.status));
        }

        let exchange_id = order
            .exchange_order_id
            .clone()
            .ok_or("order has no exchange id yet")?;

        let result = with_backoff("cancel_order", || {
            self.client.cancel_order(&order.symbol, &exchange_id)
        })
        .await;

        match result {
            Ok(_) => Ok(self
                .orders
                .update(internal_id, |o| o.status = OrderStatus::Cancelled)
                .unwrap_or(order)),
            Err(e) => {
                self.alerts.dispatch(Alert {
                    severity: AlertSeverity::Warning,
                    category: "order_cancel_failed".to_string(),
                    message: format!("cancel failed for order {internal_id}: {e}"),
                    at: Utc::now(),
                });
                Err(format!("cancel failed: {e}"))
            }
        }
    }

    /// Refresh the cached order from the exchange. On error, the cached
    /// view is returned unmodified.
    pub async fn get(&self, internal_id: Uuid) -> Option<Order> {
        let cached = self.orders.get(internal_id)?;
        let Some(exchange_id) = cached.exchange_order_id.clone() else {
            return Some(cached);
        };

        match with_backoff("get_order", || self.client.get_order(&cached.symbol, &exchange_id)).await {
            Ok(body) => {
                let raw_status = body["status"].as_str().unwrap_or("");
                let status = Order::map_exchange_status(raw_status);
                self.orders.update(internal_id, |o| o.status = status)
            }
            Err(e) => {
                warn!(internal_id = %internal_id, error = %e, "get_order failed, returning cached view");
                Some(cached)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderType, Side};

    #[test]
    fn validate_rejects_invalid_limit_order() {
        let req = PlaceOrderRequest {
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            qty: 1.0,
            price: Some(0.0),
        };
        assert_eq!(req.validate().unwrap_err(), "price is required for limit orders");
    }
}
