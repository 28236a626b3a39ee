//! Market definitions and their cross-rated minimum volume.

use super::cross_rates::CrossRatesCache;
use super::reference::RefCache;
use crate::orderbook::{FeeSchedule, MarketId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Quote asset minimum volumes are expressed in.
pub const REFERENCE_QUOTE: &str = "usdt";

/// A tradable pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub base_coin: String,
    pub quote_coin: String,
    /// Fractional digits of prices in depth output.
    #[serde(default = "default_precision")]
    pub price_precision: u32,
    /// Fractional digits of volumes in depth output.
    #[serde(default = "default_precision")]
    pub volume_precision: u32,
    /// Minimum order value in [`REFERENCE_QUOTE`].
    #[serde(default)]
    pub min_volume: Decimal,
    #[serde(default)]
    pub fees: FeeSchedule,
    /// `min_volume` converted to the base coin. Derived, never persisted.
    #[serde(skip)]
    pub cross_min_volume: Option<Decimal>,
}

fn default_precision() -> u32 {
    crate::decimal::PRECISION
}

impl Market {
    pub fn new(id: &str, base_coin: &str, quote_coin: &str) -> Self {
        Self {
            id: id.to_string(),
            base_coin: base_coin.to_string(),
            quote_coin: quote_coin.to_string(),
            price_precision: default_precision(),
            volume_precision: default_precision(),
            min_volume: Decimal::ZERO,
            fees: FeeSchedule::zero_fee(),
            cross_min_volume: None,
        }
    }
}

/// Markets keyed by id.
#[derive(Debug, Default)]
pub struct MarketsCache {
    markets: RefCache<MarketId, Market>,
}

impl MarketsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `markets`, deriving each cross-rated minimum volume from
    /// `rates`. Markets whose base coin has no rate are kept without one.
    pub fn set_all(&self, markets: Vec<Market>, rates: &CrossRatesCache) {
        let map: HashMap<MarketId, Market> = markets
            .into_iter()
            .map(|mut market| {
                market.cross_min_volume = rates
                    .rate(&market.base_coin, REFERENCE_QUOTE)
                    .filter(|rate| !rate.is_zero())
                    .and_then(|rate| market.min_volume.checked_div(rate));
                if market.cross_min_volume.is_none() {
                    debug!(market = %market.id, "no cross rate for market base coin");
                }
                (market.id.clone(), market)
            })
            .collect();
        self.markets.set_all(map);
    }

    pub fn get(&self, id: &str) -> Option<Market> {
        self.markets.get(&id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.markets.contains(&id.to_string())
    }

    /// Every market, sorted by id.
    pub fn all(&self) -> Vec<Market> {
        let mut markets: Vec<Market> = self.markets.get_all().values().cloned().collect();
        markets.sort_by(|a, b| a.id.cmp(&b.id));
        markets
    }

    pub fn ids(&self) -> Vec<MarketId> {
        self.all().into_iter().map(|m| m.id).collect()
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}
