//! Market depth cache.
//!
//! A background refresh rebuilds every market's depth from the OMS and
//! swaps the L1 and L2 tables in under one write lock. Readers get clones.

use super::last_price::{LastPrice, LastPriceTracker};
use crate::cache::{Market, MarketsCache};
use crate::decimal::{format_units, truncate_units};
use crate::oms::Oms;
use crate::orderbook::{MarketId, Order, OrderStatus, OrderType, Side};
use crate::utils::current_time_millis;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, trace};

/// `[price, volume]` rendered at market precision.
pub type PriceVolume = [String; 2];

/// Best bid and ask of one market.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel1 {
    pub market_id: MarketId,
    pub timestamp: u64,
    pub bid: Option<PriceVolume>,
    pub ask: Option<PriceVolume>,
    pub last_price: String,
    pub last_volume: String,
}

/// Every price level of one market. Bids descend, asks ascend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel2 {
    pub market_id: MarketId,
    pub timestamp: u64,
    pub bids: Vec<PriceVolume>,
    pub asks: Vec<PriceVolume>,
    pub last_price: String,
    pub last_volume: String,
}

impl DepthLevel2 {
    fn level1(&self) -> DepthLevel1 {
        DepthLevel1 {
            market_id: self.market_id.clone(),
            timestamp: self.timestamp,
            bid: self.bids.first().cloned(),
            ask: self.asks.first().cloned(),
            last_price: self.last_price.clone(),
            last_volume: self.last_volume.clone(),
        }
    }
}

/// Whether `order` shows in depth.
fn is_visible(order: &Order) -> bool {
    !matches!(
        order.status,
        OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Pending
    ) && order.order_type != OrderType::Market
}

/// Aggregates `orders` into depth for `market`.
///
/// Prices are truncated to the market's price precision, so orders that only
/// differ beyond it share a level.
pub fn build_depth(market: &Market, orders: &[Order], last: LastPrice, timestamp: u64) -> DepthLevel2 {
    let mut bids: BTreeMap<u64, u64> = BTreeMap::new();
    let mut asks: BTreeMap<u64, u64> = BTreeMap::new();
    for order in orders.iter().filter(|o| is_visible(o)) {
        let key = truncate_units(order.price, market.price_precision);
        let side = match order.side {
            Side::Buy => &mut bids,
            Side::Sell => &mut asks,
        };
        let volume = side.entry(key).or_default();
        *volume = volume.saturating_add(order.remaining());
    }

    let render = |(price, volume): (&u64, &u64)| -> Option<PriceVolume> {
        let volume = truncate_units(*volume, market.volume_precision);
        (volume > 0).then(|| {
            [
                format_units(*price, market.price_precision),
                format_units(volume, market.volume_precision),
            ]
        })
    };

    DepthLevel2 {
        market_id: market.id.clone(),
        timestamp,
        bids: bids.iter().rev().filter_map(render).collect(),
        asks: asks.iter().filter_map(render).collect(),
        last_price: format_units(last.price, market.price_precision),
        last_volume: format_units(last.volume, market.volume_precision),
    }
}

#[derive(Debug, Default)]
struct DepthTables {
    level1: HashMap<MarketId, DepthLevel1>,
    level2: HashMap<MarketId, DepthLevel2>,
}

#[derive(Debug, Default)]
pub struct DepthCache {
    tables: RwLock<DepthTables>,
}

impl DepthCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_level1(&self, market_id: &str) -> Option<DepthLevel1> {
        self.tables.read().level1.get(market_id).cloned()
    }

    /// Full depth, each side cut to `limit` levels when given.
    pub fn get_level2(&self, market_id: &str, limit: Option<usize>) -> Option<DepthLevel2> {
        let mut depth = self.tables.read().level2.get(market_id).cloned()?;
        if let Some(limit) = limit {
            depth.bids.truncate(limit);
            depth.asks.truncate(limit);
        }
        Some(depth)
    }

    /// Rebuilds depth for every known market.
    pub fn refresh(&self, oms: &Oms, markets: &MarketsCache, last_prices: &LastPriceTracker) {
        let timestamp = current_time_millis();
        let mut fresh = DepthTables::default();
        for market in markets.all() {
            let orders = oms.get_orders_by_market_id(&market.id).unwrap_or_default();
            let depth = build_depth(&market, &orders, last_prices.get(&market.id), timestamp);
            fresh.level1.insert(market.id.clone(), depth.level1());
            fresh.level2.insert(market.id.clone(), depth);
        }
        trace!(markets = fresh.level2.len(), "depth refreshed");
        *self.tables.write() = fresh;
    }

    /// Refreshes every `period` until `shutdown` flips.
    pub async fn run(
        self: Arc<Self>,
        oms: Arc<Oms>,
        markets: Arc<MarketsCache>,
        last_prices: Arc<LastPriceTracker>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(?period, "depth cache updater started");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.refresh(&oms, &markets, &last_prices),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("depth cache updater stopped");
    }
}
