//! Commonly used types in one import:
//!
//! ```rust
//! use exchange_core::prelude::*;
//! ```

// Book and engine
pub use crate::orderbook::{
    ErrorCode, Event, EventType, FeeSchedule, MarketId, Order, OrderBook, OrderBookError,
    OrderStatus, OrderType, Side, SnapshotPackage, StopKind, Trade, TradingEngine,
};

// Services
pub use crate::market_data::{DepthCache, LastPriceTracker};
pub use crate::oms::{Oms, OmsError, StatusChange, is_valid_change};
pub use crate::sequence::SequenceGenerator;

// Wiring
pub use crate::app::Exchange;
pub use crate::bus::{MemoryBus, MessageBus, SyncEvent};
pub use crate::config::Config;
pub use crate::error::CoreError;
pub use crate::store::{MemoryStore, Store};

#[cfg(feature = "nats")]
pub use crate::bus::nats::NatsBus;
