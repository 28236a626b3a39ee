//! Per-market book: bid, ask, stop-entry and stop-loss skip lists plus an
//! id index locating every live order.

use super::error::OrderBookError;
use super::fees::FeeSchedule;
use super::order::{MarketId, Order, Side};
use super::price_level::PriceLevel;
use super::skiplist::SkipList;
use crate::cache::UserFeesCache;
use crate::sequence::SequenceGenerator;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One of the four price-keyed structures of a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum BookKind {
    Bids,
    Asks,
    StopEntry,
    StopLoss,
}

/// Where a live order currently rests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Location {
    pub(crate) kind: BookKind,
    pub(crate) key: u64,
}

/// Per-market order book.
///
/// Holds the bid and ask sides plus the stop-entry and stop-loss indexes,
/// each a [`SkipList`] of [`PriceLevel`]s keyed by integer price units. The
/// book is single-writer: callers serialize commands for a market and wrap
/// the book in a lock when other threads need to read it.
///
/// Cached extrema (`lowest_ask`, `highest_bid`, `lowest_entry_price`,
/// `highest_loss_price`) are re-derived after every mutation.
pub struct OrderBook {
    pub(super) market_id: MarketId,
    pub(super) bids: SkipList<PriceLevel>,
    pub(super) asks: SkipList<PriceLevel>,
    pub(super) stop_entry: SkipList<PriceLevel>,
    pub(super) stop_loss: SkipList<PriceLevel>,
    /// Order id -> structure and key holding it.
    pub(super) locations: HashMap<u64, Location>,

    pub(super) lowest_ask: Option<u64>,
    pub(super) highest_bid: Option<u64>,
    pub(super) lowest_entry_price: Option<u64>,
    pub(super) highest_loss_price: Option<u64>,

    /// Price of the most recent trade, `0` before the first one.
    pub(super) last_price: u64,
    /// Sequence of the last command processed.
    pub(super) last_event_seq_id: u64,
    /// `seq_id` of the last trade emitted.
    pub(super) last_trade_seq_id: u64,

    pub(super) sequences: Arc<SequenceGenerator>,
    pub(super) fees: FeeSchedule,
    pub(super) user_fees: Option<Arc<UserFeesCache>>,
}

impl OrderBook {
    /// Creates an empty book drawing trade ids from `sequences`.
    pub fn new(market_id: &str, sequences: Arc<SequenceGenerator>) -> Self {
        Self {
            market_id: market_id.to_string(),
            bids: SkipList::new(),
            asks: SkipList::new(),
            stop_entry: SkipList::new(),
            stop_loss: SkipList::new(),
            locations: HashMap::new(),
            lowest_ask: None,
            highest_bid: None,
            lowest_entry_price: None,
            highest_loss_price: None,
            last_price: 0,
            last_event_seq_id: 0,
            last_trade_seq_id: 0,
            sequences,
            fees: FeeSchedule::zero_fee(),
            user_fees: None,
        }
    }

    /// Sets the market's default fee schedule.
    #[must_use]
    pub fn with_fees(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    /// Per-user fee overrides consulted on every match.
    #[must_use]
    pub fn with_user_fees(mut self, user_fees: Arc<UserFeesCache>) -> Self {
        self.user_fees = Some(user_fees);
        self
    }

    pub fn set_fees(&mut self, fees: FeeSchedule) {
        self.fees = fees;
    }

    #[inline]
    pub fn market_id(&self) -> &str {
        &self.market_id
    }

    #[inline]
    pub fn fees(&self) -> FeeSchedule {
        self.fees
    }

    /// Best (lowest) ask price.
    #[inline]
    pub fn best_ask(&self) -> Option<u64> {
        self.lowest_ask
    }

    /// Best (highest) bid price.
    #[inline]
    pub fn best_bid(&self) -> Option<u64> {
        self.highest_bid
    }

    #[inline]
    pub fn lowest_entry_price(&self) -> Option<u64> {
        self.lowest_entry_price
    }

    #[inline]
    pub fn highest_loss_price(&self) -> Option<u64> {
        self.highest_loss_price
    }

    #[inline]
    pub fn last_price(&self) -> u64 {
        self.last_price
    }

    #[inline]
    pub fn last_event_seq_id(&self) -> u64 {
        self.last_event_seq_id
    }

    #[inline]
    pub fn last_trade_seq_id(&self) -> u64 {
        self.last_trade_seq_id
    }

    /// Number of live orders, resting or armed.
    #[inline]
    pub fn order_count(&self) -> usize {
        self.locations.len()
    }

    #[inline]
    pub fn contains(&self, id: u64) -> bool {
        self.locations.contains_key(&id)
    }

    /// Looks up a live order by id.
    pub fn get_order(&self, id: u64) -> Option<&Order> {
        let location = self.locations.get(&id)?;
        self.list(location.kind)
            .get(location.key)?
            .iter()
            .find(|o| o.id == id)
    }

    /// Whether the order rests on a stop index.
    pub fn is_armed(&self, id: u64) -> bool {
        matches!(
            self.locations.get(&id),
            Some(Location {
                kind: BookKind::StopEntry | BookKind::StopLoss,
                ..
            })
        )
    }

    /// `(price, open volume)` per bid level, best first.
    pub fn bid_levels(&self) -> Vec<(u64, u64)> {
        self.bids
            .iter()
            .rev()
            .map(|(price, level)| (price, level.total_volume()))
            .collect()
    }

    /// `(price, open volume)` per ask level, best first.
    pub fn ask_levels(&self) -> Vec<(u64, u64)> {
        self.asks
            .iter()
            .map(|(price, level)| (price, level.total_volume()))
            .collect()
    }

    /// Orders resting on `side`, best price first and FIFO within a level.
    pub fn resting_orders(&self, side: Side) -> Vec<Order> {
        let levels: Box<dyn Iterator<Item = (u64, &PriceLevel)>> = match side {
            Side::Buy => Box::new(self.bids.iter().rev()),
            Side::Sell => Box::new(self.asks.iter()),
        };
        levels
            .flat_map(|(_, level)| level.iter().cloned())
            .collect()
    }

    /// Armed stop orders, entry index first, each ascending by stop price.
    pub fn stop_orders(&self) -> Vec<Order> {
        self.stop_entry
            .iter()
            .chain(self.stop_loss.iter())
            .flat_map(|(_, level)| level.iter().cloned())
            .collect()
    }

    /// True when the best bid reaches the best ask. Never true between
    /// commands.
    pub fn is_crossed(&self) -> bool {
        matches!((self.highest_bid, self.lowest_ask), (Some(bid), Some(ask)) if bid >= ask)
    }

    pub(super) fn list(&self, kind: BookKind) -> &SkipList<PriceLevel> {
        match kind {
            BookKind::Bids => &self.bids,
            BookKind::Asks => &self.asks,
            BookKind::StopEntry => &self.stop_entry,
            BookKind::StopLoss => &self.stop_loss,
        }
    }

    pub(super) fn list_mut(&mut self, kind: BookKind) -> &mut SkipList<PriceLevel> {
        match kind {
            BookKind::Bids => &mut self.bids,
            BookKind::Asks => &mut self.asks,
            BookKind::StopEntry => &mut self.stop_entry,
            BookKind::StopLoss => &mut self.stop_loss,
        }
    }

    /// Appends `order` to the level at `key`, creating the level if needed,
    /// and records its location.
    pub(super) fn insert_at(
        &mut self,
        kind: BookKind,
        key: u64,
        order: Order,
    ) -> Result<(), OrderBookError> {
        let id = order.id;
        if self.locations.contains_key(&id) {
            return Err(OrderBookError::DuplicateOrder(id));
        }
        let list = self.list_mut(kind);
        match list.get_mut(key) {
            Some(level) => level.push(order),
            None => {
                let mut level = PriceLevel::new(key);
                level.push(order);
                list.set(key, level)?;
            }
        }
        self.locations.insert(id, Location { kind, key });
        self.refresh_extrema();
        Ok(())
    }

    /// Removes a live order from whichever structure holds it. Empty levels
    /// are dropped in the same step.
    pub(super) fn remove_order(&mut self, id: u64) -> Result<Order, OrderBookError> {
        let location = self
            .locations
            .remove(&id)
            .ok_or(OrderBookError::OrderNotFound(id))?;
        let list = self.list_mut(location.kind);
        let (order, emptied) = match list.get_mut(location.key) {
            Some(level) => (level.remove(id), level.is_empty()),
            None => (None, false),
        };
        if emptied {
            list.delete(location.key);
        }
        self.refresh_extrema();
        order.ok_or(OrderBookError::OrderNotFound(id))
    }

    /// Re-derives the four cached extrema from the skip lists.
    pub(super) fn refresh_extrema(&mut self) {
        self.lowest_ask = self.asks.first_key();
        self.highest_bid = self.bids.last_key();
        self.lowest_entry_price = self.stop_entry.first_key();
        self.highest_loss_price = self.stop_loss.last_key();
    }

    /// Drops every order and resets the counters.
    pub fn clear(&mut self) {
        self.bids = SkipList::new();
        self.asks = SkipList::new();
        self.stop_entry = SkipList::new();
        self.stop_loss = SkipList::new();
        self.locations.clear();
        self.last_price = 0;
        self.last_event_seq_id = 0;
        self.last_trade_seq_id = 0;
        self.refresh_extrema();
    }
}

impl fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderBook")
            .field("market_id", &self.market_id)
            .field("bids", &self.bids.len())
            .field("asks", &self.asks.len())
            .field("stop_entry", &self.stop_entry.len())
            .field("stop_loss", &self.stop_loss.len())
            .field("lowest_ask", &self.lowest_ask)
            .field("highest_bid", &self.highest_bid)
            .field("last_price", &self.last_price)
            .field("last_event_seq_id", &self.last_event_seq_id)
            .field("last_trade_seq_id", &self.last_trade_seq_id)
            .finish()
    }
}
