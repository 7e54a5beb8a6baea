// =============================================================================
// Exchange Connector — order placement/cancellation, position tracking,
// and the authenticated user-data push stream.
// =============================================================================

pub mod client;
pub mod connector;
pub mod orders;
pub mod positions;
pub mod retry;
pub mod stream;

pub use client::ExchangeClient;
pub use connector::ExchangeConnector;
pub use orders::{Fill, Order, OrderBook, PlaceOrderRequest};
pub use positions::{Position, PositionKey, PositionManager, PositionUpdateEvent};
