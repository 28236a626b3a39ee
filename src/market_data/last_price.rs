//! Last traded price and volume per market.
//!
//! Trades update the cache as they are applied. A market missing from the
//! cache is looked up in the store's trade history and a successful answer
//! is cached.

use crate::orderbook::{MarketId, Trade};
use crate::store::Store;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Last trade of a market. `timestamp` is in unix seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastPrice {
    pub price: u64,
    pub volume: u64,
    pub timestamp: u64,
}

/// Per-market last trade, filled from the trade stream and, on a miss, from
/// the store.
#[derive(Default)]
pub struct LastPriceTracker {
    prices: DashMap<MarketId, LastPrice>,
    store: Option<Arc<dyn Store>>,
}

impl fmt::Debug for LastPriceTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LastPriceTracker")
            .field("markets", &self.prices.len())
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

impl LastPriceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker that falls back to `store` for unknown markets.
    pub fn with_store(store: Arc<dyn Store>) -> Self {
        Self {
            prices: DashMap::new(),
            store: Some(store),
        }
    }

    pub fn set(&self, market_id: &str, price: u64, volume: u64, timestamp: u64) {
        self.prices.insert(
            market_id.to_string(),
            LastPrice {
                price,
                volume,
                timestamp,
            },
        );
    }

    /// Records `trade` as the market's last.
    pub fn record_trade(&self, trade: &Trade) {
        self.set(
            &trade.market_id,
            trade.price,
            trade.volume,
            trade.timestamp / 1_000,
        );
    }

    /// Cached value without the store fallback.
    pub fn peek(&self, market_id: &str) -> Option<LastPrice> {
        self.prices.get(market_id).map(|entry| *entry)
    }

    /// Last trade of `market_id`.
    ///
    /// A miss reads the newest trade from the store and caches it; a market
    /// without trades caches zeros. A store failure returns zeros without
    /// caching so the next call retries.
    pub fn get(&self, market_id: &str) -> LastPrice {
        if let Some(last) = self.peek(market_id) {
            return last;
        }
        let Some(store) = &self.store else {
            return LastPrice::default();
        };
        let last = match store.last_trade(market_id) {
            Ok(Some(trade)) => LastPrice {
                price: trade.price,
                volume: trade.volume,
                timestamp: trade.timestamp / 1_000,
            },
            Ok(None) => LastPrice::default(),
            Err(err) => {
                warn!(market = market_id, error = %err, "last price lookup failed");
                return LastPrice::default();
            }
        };
        *self
            .prices
            .entry(market_id.to_string())
            .or_insert(last)
    }
}
