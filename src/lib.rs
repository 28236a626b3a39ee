//! # Exchange Core
//!
//! In-memory trading state of a cryptocurrency exchange: one price-time
//! priority order book per market with stop triggers, the order management
//! service that indexes every live order, the order and trade id
//! generator, market depth and the reference caches the request handlers
//! read from.
//!
//! ## Components
//!
//! - **Order book** ([`orderbook`]): bids, asks and two stop indexes per
//!   market, each an ordered skip list of FIFO price levels. Matching walks
//!   the opposite side best price first; a limit remainder rests, a market
//!   remainder is cancelled. Every trade moves the last price and may fire
//!   armed stops.
//! - **Trading engine** ([`orderbook::TradingEngine`]): dispatches inbound
//!   commands to the book and returns the events they produced, in order.
//! - **OMS** ([`oms`]): live orders indexed by id, by market and by user,
//!   with a status transition guard, periodic compaction and an
//!   `active_orders` gauge.
//! - **Sequences** ([`sequence`]): lock-free id allocation, checkpointed
//!   to the database once per second.
//! - **Market data** ([`market_data`]): L1/L2 depth rebuilt four times a
//!   second and the last traded price per market.
//! - **Reference caches** ([`cache`]) and their **pollers** ([`pollers`]).
//! - **Message bus** ([`bus`]): length-prefixed frames on named topics, the
//!   persistence sync publisher and the balance-update publisher.
//!
//! ## Prices and amounts
//!
//! All prices and amounts are `u64` unit counts with
//! [`decimal::PRECISION`] fractional digits. See [`decimal`] for the
//! conversions.
//!
//! ## Example
//!
//! ```
//! use exchange_core::orderbook::{Event, Order, Side, TradingEngine};
//! use exchange_core::sequence::SequenceGenerator;
//! use std::sync::Arc;
//!
//! let mut engine = TradingEngine::new("btcusdt", Arc::new(SequenceGenerator::new(0, 0)));
//! engine.process(Order::limit(1, "btcusdt", Side::Sell, 1_000, 100));
//! let events = engine.process(Order::limit(2, "btcusdt", Side::Buy, 1_000, 100));
//!
//! let trade = events.iter().find_map(Event::as_trade).expect("trade");
//! assert_eq!((trade.ask_id, trade.bid_id, trade.volume), (1, 2, 100));
//! assert_eq!(engine.book().order_count(), 0);
//! ```

pub mod app;
pub mod bus;
pub mod cache;
pub mod config;
pub mod decimal;
pub mod error;
pub mod market_data;
pub mod oms;
pub mod orderbook;
pub mod pollers;
pub mod prelude;
pub mod sequence;
pub mod store;
mod utils;

pub use error::CoreError;
pub use orderbook::{
    ErrorCode, Event, FeeSchedule, Order, OrderBook, OrderBookError, OrderStatus, Trade,
    TradingEngine,
};
pub use utils::current_time_millis;
