// =============================================================================
// Store — persistence boundary for Sessions, Orders, Fills, Positions
// =============================================================================
//
// Schema design and connection pooling are out of scope; this trait exists
// so handlers have somewhere to write. The only implementation is an
// in-memory one. A real backing store implements the same trait.
// =============================================================================

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::exchange::{Fill, Order, Position};
use crate::types::SessionMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub symbol: String,
    pub mode: SessionMode,
    pub exchange: String,
    pub initial_capital: f64,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub final_capital: Option<f64>,
    pub total_pnl: f64,
    pub total_trades: u32,
}

impl Session {
    pub fn new(symbol: String, mode: SessionMode, exchange: String, initial_capital: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol,
            mode,
            exchange,
            initial_capital,
            started_at: Utc::now(),
            stopped_at: None,
            final_capital: None,
            total_pnl: 0.0,
            total_trades: 0,
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_session(&self, session: Session) -> Result<()>;
    async fn update_session_stopped(
        &self,
        id: Uuid,
        final_capital: f64,
        total_pnl: f64,
        total_trades: u32,
        stopped_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn get_session(&self, id: Uuid) -> Result<Option<Session>>;

    async fn insert_order(&self, order: Order) -> Result<()>;
    async fn update_order(&self, order: Order) -> Result<()>;
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn list_orders(&self) -> Result<Vec<Order>>;

    async fn append_fill(&self, fill: Fill) -> Result<()>;

    async fn upsert_position(&self, position: Position) -> Result<()>;
    async fn get_position(&self, session_id: Uuid, symbol: &str) -> Result<Option<Position>>;
    async fn list_positions(&self) -> Result<Vec<Position>>;
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<Uuid, Session>,
    orders: HashMap<Uuid, Order>,
    fills: Vec<Fill>,
    positions: HashMap<(Uuid, String), Position>,
}

/// In-memory `Store`. Adequate for a single-process gateway; state does
/// not survive a restart.
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner::default()) }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_session(&self, session: Session) -> Result<()> {
        self.inner.write().sessions.insert(session.id, session);
        Ok(())
    }

    async fn update_session_stopped(
        &self,
        id: Uuid,
        final_capital: f64,
        total_pnl: f64,
        total_trades: u32,
        stopped_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(session) = inner.sessions.get_mut(&id) {
            session.final_capital = Some(final_capital);
            session.total_pnl = total_pnl;
            session.total_trades = total_trades;
            session.stopped_at = Some(stopped_at);
        }
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
        Ok(self.inner.read().sessions.get(&id).cloned())
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        self.inner.write().orders.insert(order.internal_id, order);
        Ok(())
    }

    async fn update_order(&self, order: Order) -> Result<()> {
        self.inner.write().orders.insert(order.internal_id, order);
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.inner.read().orders.get(&id).cloned())
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        Ok(self.inner.read().orders.values().cloned().collect())
    }

    async fn append_fill(&self, fill: Fill) -> Result<()> {
        self.inner.write().fills.push(fill);
        Ok(())
    }

    async fn upsert_position(&self, position: Position) -> Result<()> {
        let key = (position.session_id, position.symbol.clone());
        self.inner.write().positions.insert(key, position);
        Ok(())
    }

    async fn get_position(&self, session_id: Uuid, symbol: &str) -> Result<Option<Position>> {
        Ok(self.inner.read().positions.get(&(session_id, symbol.to_string())).cloned())
    }

    async fn list_positions(&self) -> Result<Vec<Position>> {
        Ok(self.inner.read().positions.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_lifecycle_round_trips() {
        let store = InMemoryStore::new();
        let session = Session::new("BTCUSDT".to_string(), SessionMode::Paper, "binance".to_string(), 1000.0);
        let id = session.id;
        store.insert_session(session).await.unwrap();

        store.update_session_stopped(id, 1100.0, 100.0, 5, Utc::now()).await.unwrap();
        let stored = store.get_session(id).await.unwrap().unwrap();
        assert_eq!(stored.final_capital, Some(1100.0));
        assert_eq!(stored.total_trades, 5);
    }

    #[tokio::test]
    async fn positions_keyed_by_session_and_symbol() {
        let store = InMemoryStore::new();
        let session_id = Uuid::new_v4();
        let position = Position {
            session_id,
            symbol: "ETHUSDT".to_string(),
            quantity: 2.0,
            avg_entry_price: 100.0,
            realized_pnl: 0.0,
            unrealized_pnl: None,
            opened_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.upsert_position(position).await.unwrap();

        let found = store.get_position(session_id, "ETHUSDT").await.unwrap();
        assert!(found.is_some());
        let missing = store.get_position(session_id, "BTCUSDT").await.unwrap();
        assert!(missing.is_none());
    }
}
