// =============================================================================
// Orders — internal order book, keyed by internal id, with an exchange-id
// reverse map so push events (which arrive keyed by exchange id) can be
// routed back to the order that originated them.
// =============================================================================
//
// Thread-safety: a single `parking_lot::Mutex` guards both maps together, so
// that an order's status and its reverse-map entry are never observed out of
// sync with one another (see §9: "single mutex on the connector").
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{OrderStatus, OrderType, Side};

/// A request to place a new order.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub qty: f64,
    #[serde(default)]
    pub price: Option<f64>,
}

impl PlaceOrderRequest {
    /// Validate per §4.4: non-empty symbol, positive qty, and a price for
    /// limit orders. Returns a human-readable message on failure, matching
    /// the `{error: "..."}` body shape used by the REST handlers.
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty() {
            return Err("symbol must not be empty".to_string());
        }
        if self.qty <= 0.0 {
            return Err("qty must be greater than zero".to_string());
        }
        if self.order_type == OrderType::Limit {
            match self.price {
                Some(p) if p > 0.0 => {}
                _ => return Err("price is required for limit orders".to_string()),
            }
        }
        Ok(())
    }
}

/// A partial or complete execution of an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: Uuid,
    pub qty: f64,
    pub price: f64,
    pub ts: DateTime<Utc>,
}

/// An order tracked by the connector. `internal_id` is the identity exposed
/// to clients; `exchange_order_id` is the identity used by push updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub internal_id: Uuid,
    #[serde(default)]
    pub exchange_order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub qty: f64,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub filled_qty: f64,
    #[serde(default)]
    pub avg_fill_price: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub filled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fills: Vec<Fill>,
}

impl Order {
    pub fn new(req: &PlaceOrderRequest) -> Self {
        Self {
            internal_id: Uuid::new_v4(),
            exchange_order_id: None,
            symbol: req.symbol.clone(),
            side: req.side,
            order_type: req.order_type,
            qty: req.qty,
            price: req.price,
            filled_qty: 0.0,
            avg_fill_price: 0.0,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            filled_at: None,
            fills: Vec::new(),
        }
    }

    /// Map an exchange-reported status string onto our internal enum, per
    /// the table in §4.4.
    pub fn map_exchange_status(raw: &str) -> OrderStatus {
        match raw.to_ascii_lowercase().as_str() {
            "new" => OrderStatus::Open,
            "partial" | "partially_filled" => OrderStatus::Open,
            "filled" => OrderStatus::Filled,
            "canceled" | "cancelled" => OrderStatus::Cancelled,
            "rejected" => OrderStatus::Rejected,
            _ => OrderStatus::Pending,
        }
    }

    /// Apply an execution-report push event to this order. Returns the
    /// appended fill when the event represents one (qty > 0).
    ///
    /// Only the "latest" fill fields carried by the push event are used —
    /// if the venue ever batches several fills into a single execution
    /// report this will under-count; flagged, not resolved, per §9.
    pub fn apply_execution_report(
        &mut self,
        raw_status: &str,
        cumulative_filled_qty: f64,
        cumulative_quote_volume: f64,
        latest_fill_qty: f64,
        latest_fill_price: f64,
        ts: DateTime<Utc>,
    ) -> Option<Fill> {
        if self.status.is_terminal() {
            return None;
        }

        self.filled_qty = cumulative_filled_qty.clamp(0.0, self.qty);
        if self.filled_qty > 0.0 {
            self.avg_fill_price = cumulative_quote_volume / self.filled_qty;
        }

        let new_status = Self::map_exchange_status(raw_status);
        let became_filled = new_status == OrderStatus::Filled && self.status != OrderStatus::Filled;
        self.status = new_status;

        if became_filled && self.filled_at.is_none() {
            self.filled_at = Some(ts);
        }

        if latest_fill_qty > 0.0 && latest_fill_price > 0.0 {
            let fill = Fill {
                order_id: self.internal_id,
                qty: latest_fill_qty,
                price: latest_fill_price,
                ts,
            };
            self.fills.push(fill.clone());
            Some(fill)
        } else {
            None
        }
    }
}

/// In-process order book: internal-id keyed orders plus the reverse
/// exchange-id map, behind a single mutex (§9).
#[derive(Default)]
pub struct OrderBook {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    orders: HashMap<Uuid, Order>,
    by_exchange_id: HashMap<String, Uuid>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, order: Order) {
        let mut inner = self.inner.lock();
        if let Some(exch_id) = order.exchange_order_id.clone() {
            inner.by_exchange_id.insert(exch_id, order.internal_id);
        }
        inner.orders.insert(order.internal_id, order);
    }

    /// Attach (or update) the exchange order id for an already-inserted
    /// order, refreshing the reverse map.
    pub fn set_exchange_id(&self, internal_id: Uuid, exchange_order_id: String) {
        let mut inner = self.inner.lock();
        inner
            .by_exchange_id
            .insert(exchange_order_id.clone(), internal_id);
        if let Some(order) = inner.orders.get_mut(&internal_id) {
            order.exchange_order_id = Some(exchange_order_id);
        }
    }

    pub fn get(&self, internal_id: Uuid) -> Option<Order> {
        self.inner.lock().orders.get(&internal_id).cloned()
    }

    pub fn internal_id_for_exchange_id(&self, exchange_order_id: &str) -> Option<Uuid> {
        self.inner
            .lock()
            .by_exchange_id
            .get(exchange_order_id)
            .copied()
    }

    pub fn list(&self) -> Vec<Order> {
        self.inner.lock().orders.values().cloned().collect()
    }

    /// Replace an order's state wholesale (used after REST round-trips and
    /// push-event mutation). A REST reconciliation may observe an older or
    /// equal state; callers must never regress a terminal status (§5).
    pub fn update<F>(&self, internal_id: Uuid, f: F) -> Option<Order>
    where
        F: FnOnce(&mut Order),
    {
        let mut inner = self.inner.lock();
        let order = inner.orders.get_mut(&internal_id)?;
        if order.status.is_terminal() {
            return Some(order.clone());
        }
        f(order);
        Some(order.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(order_type: OrderType, price: Option<f64>) -> PlaceOrderRequest {
        PlaceOrderRequest {
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            order_type,
            qty: 1.0,
            price,
        }
    }

    #[test]
    fn validate_rejects_empty_symbol() {
        let mut r = req(OrderType::Market, None);
        r.symbol = "".to_string();
        assert!(r.validate().is_err());
    }

    #[test]
    fn validate_rejects_nonpositive_qty() {
        let mut r = req(OrderType::Market, None);
        r.qty = 0.0;
        assert!(r.validate().is_err());
    }

    #[test]
    fn validate_requires_price_for_limit() {
        let r = req(OrderType::Limit, Some(0.0));
        let err = r.validate().unwrap_err();
        assert_eq!(err, "price is required for limit orders");
    }

    #[test]
    fn validate_allows_market_without_price() {
        let r = req(OrderType::Market, None);
        assert!(r.validate().is_ok());
    }

    #[test]
    fn terminal_order_ignores_further_execution_reports() {
        let mut order = Order::new(&req(OrderType::Market, None));
        order.status = OrderStatus::Cancelled;
        let fill = order.apply_execution_report("filled", 1.0, 100.0, 1.0, 100.0, Utc::now());
        assert!(fill.is_none());
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[test]
    fn filled_at_set_once() {
        let mut order = Order::new(&req(OrderType::Market, None));
        let ts1 = Utc::now();
        order.apply_execution_report("filled", 1.0, 100.0, 1.0, 100.0, ts1);
        let first = order.filled_at;
        assert!(first.is_some());
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[test]
    fn order_book_reverse_map_roundtrip() {
        let book = OrderBook::new();
        let mut order = Order::new(&req(OrderType::Market, None));
        order.exchange_order_id = Some("EXCH-1".to_string());
        let id = order.internal_id;
        book.insert(order);
        assert_eq!(book.internal_id_for_exchange_id("EXCH-1"), Some(id));
    }
}
