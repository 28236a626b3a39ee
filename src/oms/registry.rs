//! Indexed store of live orders.
//!
//! Orders live once in `by_id`. `by_market` and `by_user` hold ids only and
//! are resolved through `by_id` on read. Terminal orders are dropped from
//! all three indexes as soon as they become terminal.

use super::OmsError;
use super::status::{StatusChange, is_valid_change};
use crate::bus::{SyncEvent, SyncSender};
use crate::orderbook::{MarketId, Order, OrderStatus};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, trace};

/// Extra room added to every map rebuilt by [`Oms::compact`].
const COMPACTION_CHUNK: usize = 1_000;

#[derive(Debug, Default)]
struct Indexes {
    by_id: HashMap<u64, Order>,
    by_market: HashMap<MarketId, HashSet<u64>>,
    by_user: HashMap<u64, HashMap<MarketId, HashSet<u64>>>,
}

impl Indexes {
    fn with_capacity(orders: usize, markets: usize, users: usize) -> Self {
        Self {
            by_id: HashMap::with_capacity(orders),
            by_market: HashMap::with_capacity(markets),
            by_user: HashMap::with_capacity(users),
        }
    }

    fn insert(&mut self, order: Order) {
        self.unlink(order.id);
        self.by_market
            .entry(order.market_id.clone())
            .or_default()
            .insert(order.id);
        self.by_user
            .entry(order.owner_id)
            .or_default()
            .entry(order.market_id.clone())
            .or_default()
            .insert(order.id);
        self.by_id.insert(order.id, order);
    }

    /// Removes `id` from every index, dropping emptied buckets.
    fn unlink(&mut self, id: u64) -> Option<Order> {
        let order = self.by_id.remove(&id)?;
        if let Some(ids) = self.by_market.get_mut(&order.market_id) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_market.remove(&order.market_id);
            }
        }
        if let Some(markets) = self.by_user.get_mut(&order.owner_id) {
            if let Some(ids) = markets.get_mut(&order.market_id) {
                ids.remove(&id);
                if ids.is_empty() {
                    markets.remove(&order.market_id);
                }
            }
            if markets.is_empty() {
                self.by_user.remove(&order.owner_id);
            }
        }
        Some(order)
    }

    fn get_in_market(&self, market_id: &str, id: u64) -> Option<&Order> {
        self.by_market
            .get(market_id)
            .filter(|ids| ids.contains(&id))
            .and_then(|_| self.by_id.get(&id))
    }

    /// Stores `order`, or drops it when terminal.
    fn store(&mut self, order: Order) {
        if order.is_terminal() {
            self.unlink(order.id);
        } else {
            self.insert(order);
        }
    }
}

/// Counters reported by [`Oms::compact`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub orders: usize,
    pub markets: usize,
    pub users: usize,
}

/// Order management service.
#[derive(Debug, Default)]
pub struct Oms {
    indexes: RwLock<Indexes>,
    sync: Option<SyncSender>,
}

impl Oms {
    /// OMS that emits no sync events.
    pub fn new() -> Self {
        Self::default()
    }

    /// OMS that queues `orders` sync events on `sync`.
    pub fn with_sync(sync: SyncSender) -> Self {
        Self {
            indexes: RwLock::default(),
            sync: Some(sync),
        }
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(sync) = &self.sync {
            sync.send(event);
        }
    }

    /// Live order `id` of `market_id`.
    pub fn get_order(&self, market_id: &str, id: u64) -> Result<Order, OmsError> {
        self.indexes
            .read()
            .get_in_market(market_id, id)
            .cloned()
            .ok_or(OmsError::NotFound { id })
    }

    /// Both sides of a trade, looked up under one read lock.
    pub fn get_trade_orders(
        &self,
        market_id: &str,
        ask_id: u64,
        bid_id: u64,
    ) -> (Result<Order, OmsError>, Result<Order, OmsError>) {
        let indexes = self.indexes.read();
        let lookup = |id| {
            indexes
                .get_in_market(market_id, id)
                .cloned()
                .ok_or(OmsError::NotFound { id })
        };
        (lookup(ask_id), lookup(bid_id))
    }

    pub fn get_order_by_id(&self, id: u64) -> Result<Order, OmsError> {
        self.indexes
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(OmsError::NotFound { id })
    }

    /// Live orders of `user_id` grouped by market. Empty when the user has
    /// none.
    pub fn get_orders_by_user(&self, user_id: u64) -> HashMap<MarketId, HashMap<u64, Order>> {
        let indexes = self.indexes.read();
        let Some(markets) = indexes.by_user.get(&user_id) else {
            return HashMap::new();
        };
        markets
            .iter()
            .map(|(market, ids)| {
                let orders = ids
                    .iter()
                    .filter_map(|id| indexes.by_id.get(id).map(|o| (*id, o.clone())))
                    .collect();
                (market.clone(), orders)
            })
            .collect()
    }

    /// Live orders of `market_id`, ascending by id.
    pub fn get_orders_by_market_id(&self, market_id: &str) -> Result<Vec<Order>, OmsError> {
        let indexes = self.indexes.read();
        let ids = indexes
            .by_market
            .get(market_id)
            .ok_or_else(|| OmsError::MarketNotFound(market_id.to_string()))?;
        let mut orders: Vec<Order> = ids
            .iter()
            .filter_map(|id| indexes.by_id.get(id).cloned())
            .collect();
        orders.sort_unstable_by_key(|o| o.id);
        Ok(orders)
    }

    /// Indexes `order` and queues `Save("orders")`. A terminal order is
    /// persisted but not indexed.
    pub fn save_order(&self, order: Order) {
        let event = SyncEvent::save_order(&order);
        trace!(order_id = order.id, status = %order.status, "saving order");
        self.indexes.write().store(order);
        self.emit(event);
    }

    /// Applies the mutable fields of `order` to the stored record.
    ///
    /// Returns `Ok(true)` when the record changed and `Update("orders")` was
    /// queued. A backward move is ignored with `Ok(false)`. With an unchanged
    /// status the fill fields are still applied and the update is queued
    /// only if one of them moved.
    pub fn update_order(&self, order: &Order) -> Result<bool, OmsError> {
        let updated = {
            let mut indexes = self.indexes.write();
            let current = indexes
                .by_id
                .get_mut(&order.id)
                .ok_or(OmsError::NotFound { id: order.id })?;

            let change = is_valid_change(current.status, order.status);
            match change {
                StatusChange::Terminal => {
                    return Err(OmsError::InvalidStatusTransition {
                        from: current.status,
                        to: order.status,
                    });
                }
                StatusChange::Invalid => {
                    debug!(
                        order_id = order.id,
                        from = %current.status,
                        to = %order.status,
                        "ignoring backward status change"
                    );
                    return Ok(false);
                }
                StatusChange::Same => {
                    let moved = current.filled_amount != order.filled_amount
                        || current.fee_amount != order.fee_amount
                        || current.used_funds != order.used_funds;
                    if !moved {
                        return Ok(false);
                    }
                }
                StatusChange::Ok => {}
            }

            current.status = order.status;
            current.updated_at = order.updated_at;
            current.filled_amount = order.filled_amount;
            current.fee_amount = order.fee_amount;
            current.used_funds = order.used_funds;
            let updated = current.clone();
            if updated.is_terminal() {
                indexes.unlink(updated.id);
            }
            updated
        };
        self.emit(SyncEvent::update_order(&updated));
        Ok(true)
    }

    /// Replaces the whole stored record with `order` without queuing a sync
    /// event. Status moves follow the same guard as [`Oms::update_order`].
    pub fn update_custom_order(&self, order: Order) -> Result<bool, OmsError> {
        let mut indexes = self.indexes.write();
        let from = indexes
            .by_id
            .get(&order.id)
            .map(|o| o.status)
            .ok_or(OmsError::NotFound { id: order.id })?;
        match is_valid_change(from, order.status) {
            StatusChange::Terminal => Err(OmsError::InvalidStatusTransition {
                from,
                to: order.status,
            }),
            StatusChange::Invalid => {
                debug!(
                    order_id = order.id,
                    %from,
                    to = %order.status,
                    "ignoring backward status change"
                );
                Ok(false)
            }
            StatusChange::Same | StatusChange::Ok => {
                indexes.store(order);
                Ok(true)
            }
        }
    }

    /// Sets the status of order `id` of `market_id`.
    ///
    /// `Ok(false)` when the status is unchanged or the move is backward.
    /// With `with_save` an `Update("orders")` is queued on change.
    pub fn update_order_status(
        &self,
        market_id: &str,
        id: u64,
        status: OrderStatus,
        updated_at: u64,
        with_save: bool,
    ) -> Result<bool, OmsError> {
        let updated = {
            let mut indexes = self.indexes.write();
            let from = indexes
                .get_in_market(market_id, id)
                .map(|o| o.status)
                .ok_or(OmsError::NotFound { id })?;
            match is_valid_change(from, status) {
                StatusChange::Same => return Ok(false),
                StatusChange::Invalid => {
                    debug!(order_id = id, %from, to = %status, "ignoring backward status change");
                    return Ok(false);
                }
                StatusChange::Terminal => {
                    return Err(OmsError::InvalidStatusTransition { from, to: status });
                }
                StatusChange::Ok => {}
            }
            let Some(current) = indexes.by_id.get_mut(&id) else {
                return Err(OmsError::NotFound { id });
            };
            current.status = status;
            current.updated_at = updated_at;
            let updated = current.clone();
            if status.is_terminal() {
                indexes.unlink(id);
            }
            updated
        };
        if with_save {
            self.emit(SyncEvent::update_order(&updated));
        }
        Ok(true)
    }

    /// Drops a completed order from every index.
    pub fn remove_order(&self, id: u64) -> Option<Order> {
        self.indexes.write().unlink(id)
    }

    /// Indexes persisted orders without queuing sync events. Terminal
    /// orders are skipped. Returns how many were indexed.
    pub fn restore(&self, orders: impl IntoIterator<Item = Order>) -> usize {
        let mut indexes = self.indexes.write();
        let mut restored = 0;
        for order in orders.into_iter().filter(|o| !o.is_terminal()) {
            indexes.insert(order);
            restored += 1;
        }
        restored
    }

    /// Rebuilds the three indexes into freshly sized maps so capacity left
    /// over from a peak is released.
    pub fn compact(&self) -> CompactionReport {
        let mut indexes = self.indexes.write();
        let markets = indexes.by_market.len();
        let users = indexes.by_user.len();
        let old = std::mem::take(&mut *indexes);
        let orders = old.by_id.len();

        let mut fresh = Indexes::with_capacity(
            orders + COMPACTION_CHUNK,
            markets + COMPACTION_CHUNK,
            users + COMPACTION_CHUNK,
        );
        for order in old.by_id.into_values() {
            fresh.insert(order);
        }
        *indexes = fresh;
        drop(indexes);

        info!(orders, markets, users, "oms indexes compacted");
        CompactionReport {
            orders,
            markets,
            users,
        }
    }

    /// Number of live orders.
    pub fn len(&self) -> usize {
        self.indexes.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live order count per market.
    pub fn market_counts(&self) -> Vec<(MarketId, usize)> {
        let indexes = self.indexes.read();
        let mut counts: Vec<_> = indexes
            .by_market
            .iter()
            .map(|(market, ids)| (market.clone(), ids.len()))
            .collect();
        counts.sort_unstable();
        counts
    }

    /// Markets with at least one live order.
    pub fn markets(&self) -> Vec<MarketId> {
        let mut markets: Vec<_> = self.indexes.read().by_market.keys().cloned().collect();
        markets.sort_unstable();
        markets
    }

    /// Ids of every live order, for consistency checks.
    pub fn order_ids(&self) -> HashSet<u64> {
        self.indexes.read().by_id.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SyncCommand;
    use crate::orderbook::Side;

    fn order(id: u64, market: &str, owner: u64) -> Order {
        Order::limit(id, market, Side::Buy, 100, 10).with_owner(owner)
    }

    #[test]
    fn test_three_indexes_agree() {
        let oms = Oms::new();
        oms.save_order(order(1, "btcusdt", 7));
        oms.save_order(order(2, "ethusdt", 7));
        oms.save_order(order(3, "btcusdt", 8));

        assert_eq!(oms.get_order("btcusdt", 1).map(|o| o.id), Ok(1));
        assert_eq!(
            oms.get_order("ethusdt", 1),
            Err(OmsError::NotFound { id: 1 })
        );
        let by_user = oms.get_orders_by_user(7);
        assert_eq!(by_user.len(), 2);
        assert!(by_user["ethusdt"].contains_key(&2));
        assert_eq!(
            oms.get_orders_by_market_id("btcusdt")
                .map(|v| v.iter().map(|o| o.id).collect::<Vec<_>>()),
            Ok(vec![1, 3])
        );
        assert_eq!(oms.market_counts(), vec![("btcusdt".to_string(), 2), ("ethusdt".to_string(), 1)]);
    }

    #[test]
    fn test_terminal_save_is_not_indexed() {
        let (sync, rx) = SyncSender::channel();
        let oms = Oms::with_sync(sync);
        let mut done = order(1, "btcusdt", 7);
        done.status = OrderStatus::Cancelled;
        oms.save_order(done);
        assert!(oms.is_empty());
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_update_to_filled_removes_everywhere() {
        let (sync, rx) = SyncSender::channel();
        let oms = Oms::with_sync(sync);
        oms.save_order(order(1, "btcusdt", 7));

        let mut filled = order(1, "btcusdt", 7);
        filled.status = OrderStatus::Filled;
        filled.filled_amount = 10;
        assert_eq!(oms.update_order(&filled), Ok(true));

        assert!(oms.get_order_by_id(1).is_err());
        assert!(oms.get_orders_by_user(7).is_empty());
        assert_eq!(
            oms.get_orders_by_market_id("btcusdt"),
            Err(OmsError::MarketNotFound("btcusdt".to_string()))
        );
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].command, SyncCommand::Update);
        assert_eq!(events[1].get_str("status"), Some("filled"));
    }

    #[test]
    fn test_same_status_applies_fill_fields() {
        let oms = Oms::new();
        let mut partial = order(1, "btcusdt", 7);
        partial.status = OrderStatus::PartiallyFilled;
        partial.filled_amount = 2;
        oms.save_order(partial.clone());

        assert_eq!(oms.update_order(&partial), Ok(false));
        partial.filled_amount = 5;
        assert_eq!(oms.update_order(&partial), Ok(true));
        assert_eq!(oms.get_order_by_id(1).map(|o| o.filled_amount), Ok(5));
    }

    #[test]
    fn test_backward_move_is_ignored() {
        let oms = Oms::new();
        let mut partial = order(1, "btcusdt", 7);
        partial.status = OrderStatus::PartiallyFilled;
        oms.save_order(partial);
        assert_eq!(
            oms.update_order_status("btcusdt", 1, OrderStatus::Untouched, 5, true),
            Ok(false)
        );
        assert_eq!(
            oms.get_order_by_id(1).map(|o| o.status),
            Ok(OrderStatus::PartiallyFilled)
        );
    }

    #[test]
    fn test_update_status_same_state() {
        let oms = Oms::new();
        oms.save_order(order(1, "btcusdt", 7));
        assert_eq!(
            oms.update_order_status("btcusdt", 1, OrderStatus::Untouched, 5, false),
            Ok(false)
        );
        assert_eq!(
            oms.update_order_status("btcusdt", 1, OrderStatus::Cancelled, 5, false),
            Ok(true)
        );
        assert!(oms.is_empty());
        assert_eq!(
            oms.update_order_status("btcusdt", 1, OrderStatus::Cancelled, 6, false),
            Err(OmsError::NotFound { id: 1 })
        );
    }

    #[test]
    fn test_update_missing_order() {
        let oms = Oms::new();
        assert_eq!(
            oms.update_order(&order(9, "btcusdt", 1)),
            Err(OmsError::NotFound { id: 9 })
        );
    }

    #[test]
    fn test_custom_update_reindexes_without_event() {
        let (sync, rx) = SyncSender::channel();
        let oms = Oms::with_sync(sync);
        oms.save_order(order(1, "btcusdt", 7));
        rx.try_iter().count();

        let moved = order(1, "btcusdt", 8);
        assert_eq!(oms.update_custom_order(moved), Ok(true));
        assert!(oms.get_orders_by_user(7).is_empty());
        assert_eq!(oms.get_orders_by_user(8).len(), 1);
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_trade_orders_lookup() {
        let oms = Oms::new();
        oms.save_order(order(1, "btcusdt", 7));
        let (ask, bid) = oms.get_trade_orders("btcusdt", 1, 2);
        assert_eq!(ask.map(|o| o.id), Ok(1));
        assert_eq!(bid, Err(OmsError::NotFound { id: 2 }));
    }

    #[test]
    fn test_compaction_preserves_orders() {
        let oms = Oms::new();
        oms.restore((1..=50).map(|id| order(id, if id % 2 == 0 { "a" } else { "b" }, id % 5)));
        let before = oms.order_ids();
        let report = oms.compact();
        assert_eq!(report.orders, 50);
        assert_eq!(report.markets, 2);
        assert_eq!(report.users, 5);
        assert_eq!(oms.order_ids(), before);
        assert_eq!(oms.get_orders_by_market_id("a").map(|v| v.len()), Ok(25));
    }
}
