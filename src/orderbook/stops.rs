//! Stop-entry and stop-loss arming and triggering.

use super::book::{BookKind, OrderBook};
use super::event::Event;
use super::order::{Order, OrderStatus, Side, StopKind};
use super::price_level::PriceLevel;
use super::skiplist::SkipList;
use crate::utils::current_time_millis;
use std::ops::RangeBounds;
use tracing::{trace, warn};

impl OrderBook {
    /// Parks a stop order on its index keyed by `stop_price`.
    pub(super) fn arm_stop(&mut self, mut order: Order, events: &mut Vec<Event>) {
        let kind = match order.stop {
            StopKind::Entry => BookKind::StopEntry,
            StopKind::Loss => BookKind::StopLoss,
            StopKind::None => return,
        };
        order.status = OrderStatus::Pending;
        order.updated_at = current_time_millis();
        let (id, stop_price) = (order.id, order.stop_price);
        match self.insert_at(kind, stop_price, order.clone()) {
            Ok(()) => {
                trace!(
                    "Order book {}: armed {:?} stop {} at {}",
                    self.market_id, order.stop, id, stop_price
                );
                events.push(Event::OrderStatusChange(order));
            }
            Err(err) => warn!(
                market = %self.market_id,
                order_id = id,
                error = %err,
                "failed to arm stop order"
            ),
        }
    }

    /// Fires every armed stop the current last price crosses.
    ///
    /// Entry stops follow the side's polarity: buys fire once the last price
    /// is at or above the stop, sells once it is at or below it. Loss stops
    /// are the mirror image. Stops that fire together run in ascending
    /// `(stop_price, id)` order; executing them may move the last price, so
    /// the scan repeats until nothing fires.
    pub(super) fn trigger_stops(&mut self, events: &mut Vec<Event>) {
        loop {
            let last = self.last_price;
            if last == 0 {
                return;
            }

            let mut fired = Vec::new();
            collect(&self.stop_entry, ..=last, Side::Buy, &mut fired);
            collect(&self.stop_entry, last.., Side::Sell, &mut fired);
            collect(&self.stop_loss, last.., Side::Buy, &mut fired);
            collect(&self.stop_loss, ..=last, Side::Sell, &mut fired);
            if fired.is_empty() {
                return;
            }
            fired.sort_unstable();

            for (_, id) in fired {
                let Ok(mut order) = self.remove_order(id) else {
                    continue;
                };
                order.stop = StopKind::None;
                order.updated_at = current_time_millis();
                trace!(
                    "Order book {}: stop {} triggered at last price {}",
                    self.market_id, id, self.last_price
                );
                events.push(Event::OrderActivated(order.clone()));
                self.execute(order, events);
            }
        }
    }
}

/// Pushes `(stop_price, id)` of every `side` order in `range` of `list`.
fn collect<R: RangeBounds<u64>>(
    list: &SkipList<PriceLevel>,
    range: R,
    side: Side,
    out: &mut Vec<(u64, u64)>,
) {
    for (stop_price, level) in list.range(range) {
        out.extend(
            level
                .iter()
                .filter(|o| o.side == side)
                .map(|o| (stop_price, o.id)),
        );
    }
}
