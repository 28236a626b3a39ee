//! Per-market order book with price-time priority matching and stop triggers.

pub mod book;
/// Trading engine facade over one book.
pub mod engine;
pub mod error;
pub mod event;
/// Maker/taker fee schedule.
pub mod fees;
pub mod matching;
pub mod operations;
/// Order record and its enums.
pub mod order;
pub mod price_level;
/// Ordered price index.
pub mod skiplist;
pub mod snapshot;
pub mod stops;
/// Trade record emitted on every match.
pub mod trade;

mod tests;

pub use book::OrderBook;
pub use engine::TradingEngine;
pub use error::OrderBookError;
pub use event::{ErrorCode, Event};
pub use fees::FeeSchedule;
pub use order::{EventType, MarketId, Order, OrderStatus, OrderType, Side, StopKind};
pub use price_level::PriceLevel;
pub use skiplist::SkipList;
pub use snapshot::{BookSnapshot, LoadReport, SNAPSHOT_FORMAT_VERSION, SnapshotPackage};
pub use trade::Trade;
