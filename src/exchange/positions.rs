// =============================================================================
// Position Manager — weighted-average entry, realized/unrealized PnL
// =============================================================================
//
// Keyed by (session_id, symbol). Mutated only in response to Fills handed
// over by the exchange connector's `onOrderFilled`; each call is atomic with
// respect to a single key because the whole map sits behind one
// `parking_lot::RwLock` and updates happen while the write guard is held.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::exchange::orders::{Fill, Order};
use crate::types::Side;

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub session_id: Uuid,
    pub symbol: String,
}

/// A position tracked for one (session, symbol) pair.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub session_id: Uuid,
    pub symbol: String,
    /// Signed quantity: positive is long, negative is short.
    pub quantity: f64,
    pub avg_entry_price: f64,
    pub realized_pnl: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unrealized_pnl: Option<f64>,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    fn new(session_id: Uuid, symbol: String) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            symbol,
            quantity: 0.0,
            avg_entry_price: 0.0,
            realized_pnl: 0.0,
            unrealized_pnl: None,
            opened_at: now,
            updated_at: now,
        }
    }
}

/// Event emitted after a position mutation, suitable for the WS Hub to
/// broadcast as a `position_update` message.
#[derive(Debug, Clone, Serialize)]
pub struct PositionUpdateEvent {
    pub session_id: Uuid,
    pub symbol: String,
    pub quantity: f64,
    pub avg_entry_price: f64,
    pub realized_pnl: f64,
}

impl From<&Position> for PositionUpdateEvent {
    fn from(p: &Position) -> Self {
        Self {
            session_id: p.session_id,
            symbol: p.symbol.clone(),
            quantity: p.quantity,
            avg_entry_price: p.avg_entry_price,
            realized_pnl: p.realized_pnl,
        }
    }
}

pub struct PositionManager {
    positions: RwLock<HashMap<(Uuid, String), Position>>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
        }
    }

    /// Apply an order's fills to the (session, symbol) position. Called by
    /// the exchange connector whenever an order transitions to `filled`.
    ///
    /// Same-side fills extend the position and roll a new weighted-average
    /// entry price; opposite-side fills reduce it and realize PnL on the
    /// closed portion. A fill that flips the position from long to short
    /// (or vice versa) first closes the existing side, then opens the
    /// remainder at the fill price.
    pub fn on_order_filled(
        &self,
        session_id: Uuid,
        order: &Order,
        fills: &[Fill],
    ) -> PositionUpdateEvent {
        let key = (session_id, order.symbol.clone());
        let mut positions = self.positions.write();
        let position = positions
            .entry(key)
            .or_insert_with(|| Position::new(session_id, order.symbol.clone()));

        let direction = order.side.direction();

        for fill in fills {
            let signed_qty = direction * fill.qty;
            let same_side = position.quantity == 0.0 || position.quantity.signum() == signed_qty.signum();

            if same_side {
                let new_qty = position.quantity + signed_qty;
                if new_qty != 0.0 {
                    position.avg_entry_price = (position.avg_entry_price * position.quantity.abs()
                        + fill.price * signed_qty.abs())
                        / new_qty.abs();
                }
                position.quantity = new_qty;
            } else {
                let closing_qty = signed_qty.abs().min(position.quantity.abs());
                let close_direction = position.quantity.signum();
                position.realized_pnl +=
                    close_direction * (fill.price - position.avg_entry_price) * closing_qty;

                let remaining_incoming = signed_qty.abs() - closing_qty;
                position.quantity += signed_qty.signum() * closing_qty;

                if position.quantity == 0.0 && remaining_incoming > 0.0 {
                    // Flipped sides: open the remainder at this fill's price.
                    position.quantity = signed_qty.signum() * remaining_incoming;
                    position.avg_entry_price = fill.price;
                }
            }

            position.updated_at = fill.ts;
        }

        PositionUpdateEvent::from(&*position)
    }

    /// Recompute unrealized PnL for every position in `symbol` given the
    /// latest mark price.
    pub fn mark_price(&self, symbol: &str, price: f64) {
        let mut positions = self.positions.write();
        for position in positions.values_mut().filter(|p| p.symbol == symbol) {
            if position.quantity == 0.0 {
                position.unrealized_pnl = Some(0.0);
            } else {
                let direction = position.quantity.signum();
                position.unrealized_pnl = Some(
                    direction * (price - position.avg_entry_price) * position.quantity.abs(),
                );
            }
        }
    }

    pub fn get(&self, session_id: Uuid, symbol: &str) -> Option<Position> {
        self.positions
            .read()
            .get(&(session_id, symbol.to_string()))
            .cloned()
    }

    pub fn list(&self) -> Vec<Position> {
        self.positions.read().values().cloned().collect()
    }
}

impl Default for PositionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::orders::PlaceOrderRequest;
    use crate::types::OrderType;

    fn fill(qty: f64, price: f64, order_id: Uuid) -> Fill {
        Fill {
            order_id,
            qty,
            price,
            ts: Utc::now(),
        }
    }

    fn order(side: Side) -> Order {
        Order::new(&PlaceOrderRequest {
            symbol: "BTCUSDT".to_string(),
            side,
            order_type: OrderType::Market,
            qty: 1.0,
            price: None,
        })
    }

    #[test]
    fn opening_position_sets_weighted_average_entry() {
        let pm = PositionManager::new();
        let session = Uuid::new_v4();
        let order = order(Side::Buy);
        let event = pm.on_order_filled(session, &order, &[fill(1.0, 100.0, order.internal_id)]);
        assert_eq!(event.quantity, 1.0);
        assert_eq!(event.avg_entry_price, 100.0);

        let event2 = pm.on_order_filled(session, &order, &[fill(1.0, 110.0, order.internal_id)]);
        assert_eq!(event2.quantity, 2.0);
        assert!((event2.avg_entry_price - 105.0).abs() < 1e-9);
    }

    #[test]
    fn opposite_side_fill_realizes_pnl() {
        let pm = PositionManager::new();
        let session = Uuid::new_v4();
        let buy = order(Side::Buy);
        pm.on_order_filled(session, &buy, &[fill(2.0, 100.0, buy.internal_id)]);

        let sell = order(Side::Sell);
        let event = pm.on_order_filled(session, &sell, &[fill(1.0, 110.0, sell.internal_id)]);
        assert_eq!(event.quantity, 1.0);
        assert!((event.realized_pnl - 10.0).abs() < 1e-9);
    }

    #[test]
    fn flipping_sides_opens_remainder_at_fill_price() {
        let pm = PositionManager::new();
        let session = Uuid::new_v4();
        let buy = order(Side::Buy);
        pm.on_order_filled(session, &buy, &[fill(1.0, 100.0, buy.internal_id)]);

        let sell = order(Side::Sell);
        let event = pm.on_order_filled(session, &sell, &[fill(3.0, 90.0, sell.internal_id)]);
        assert_eq!(event.quantity, -2.0);
        assert_eq!(event.avg_entry_price, 90.0);
        assert!((event.realized_pnl - (-10.0)).abs() < 1e-9);
    }
}
