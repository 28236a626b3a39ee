//! Price-time priority matching of an incoming order against the book.

use super::book::{Location, OrderBook};
use super::event::Event;
use super::fees::FeeSchedule;
use super::order::{Order, OrderStatus, OrderType, Side};
use super::price_level::PriceLevel;
use super::trade::Trade;
use crate::cache::UserFeesCache;
use crate::decimal::mul_units;
use crate::sequence::SequenceGenerator;
use crate::utils::current_time_millis;
use std::collections::HashMap;
use tracing::trace;

/// Read-only state a match needs while the opposite side is borrowed
/// mutably.
struct MatchContext<'a> {
    market_id: &'a str,
    sequences: &'a SequenceGenerator,
    fees: FeeSchedule,
    user_fees: Option<&'a UserFeesCache>,
    event_seq_id: u64,
}

impl MatchContext<'_> {
    fn schedule_for(&self, owner_id: u64) -> FeeSchedule {
        self.user_fees
            .and_then(|cache| cache.get(owner_id))
            .unwrap_or(self.fees)
    }

    /// Fills `taker` against `maker` for `volume` at the maker's price and
    /// builds the trade.
    fn fill(&self, taker: &mut Order, maker: &mut Order, volume: u64, now: u64) -> Trade {
        let price = maker.price;
        let quote_volume = mul_units(price, volume);

        let taker_side = taker.side;
        let (ask, bid) = match taker_side {
            Side::Buy => (&mut *maker, &mut *taker),
            Side::Sell => (&mut *taker, &mut *maker),
        };
        let ask_is_maker = taker_side == Side::Buy;
        let ask_fee_amount = self
            .schedule_for(ask.owner_id)
            .fee(quote_volume, ask_is_maker);
        let bid_fee_amount = self.schedule_for(bid.owner_id).fee(volume, !ask_is_maker);

        ask.filled_amount += volume;
        ask.used_funds = ask.used_funds.saturating_add(volume);
        ask.fee_amount = ask.fee_amount.saturating_add(ask_fee_amount);
        bid.filled_amount += volume;
        bid.used_funds = bid.used_funds.saturating_add(quote_volume);
        bid.fee_amount = bid.fee_amount.saturating_add(bid_fee_amount);

        let trade = Trade {
            seq_id: self.sequences.next_trade_id(),
            market_id: self.market_id.to_string(),
            price,
            volume,
            quote_volume,
            ask_id: ask.id,
            bid_id: bid.id,
            ask_owner: ask.owner_id,
            bid_owner: bid.owner_id,
            taker_side,
            ask_fee_amount,
            bid_fee_amount,
            timestamp: now,
            event_seq_id: self.event_seq_id,
        };

        for order in [&mut *maker, &mut *taker] {
            order.status = if order.remaining() == 0 {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            order.updated_at = now;
        }
        trade
    }
}

/// Outcome of walking one side of the book.
#[derive(Debug, Default)]
struct MatchOutcome {
    trades: usize,
    last_price: Option<u64>,
    last_trade_seq_id: Option<u64>,
}

impl OrderBook {
    /// Matches `order` against the opposite side and settles its remainder.
    ///
    /// Per match, the trade is emitted before the maker's status change; the
    /// taker's final state follows once matching stops. Returns whether the
    /// order traded.
    pub(super) fn execute(&mut self, mut order: Order, events: &mut Vec<Event>) -> bool {
        let initial = (order.status, order.filled_amount);
        let outcome = self.match_order(&mut order, events);

        if let Some(price) = outcome.last_price {
            self.last_price = price;
        }

        match order.order_type {
            OrderType::Market if order.remaining() > 0 => {
                order.status = OrderStatus::Cancelled;
                order.updated_at = current_time_millis();
                trace!(
                    "Order book {}: market order {} closed with {} unfilled",
                    self.market_id,
                    order.id,
                    order.remaining()
                );
                events.push(Event::OrderStatusChange(order));
            }
            OrderType::Limit if order.remaining() > 0 => {
                if (order.status, order.filled_amount) != initial {
                    events.push(Event::OrderStatusChange(order.clone()));
                }
                self.rest(order);
            }
            _ => {
                if (order.status, order.filled_amount) != initial {
                    events.push(Event::OrderStatusChange(order));
                }
            }
        }
        outcome.trades > 0
    }

    fn match_order(&mut self, order: &mut Order, events: &mut Vec<Event>) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();
        let ctx = MatchContext {
            market_id: &self.market_id,
            sequences: &self.sequences,
            fees: self.fees,
            user_fees: self.user_fees.as_deref(),
            event_seq_id: self.last_event_seq_id,
        };

        while order.remaining() > 0 {
            let best = match order.side {
                Side::Buy => self.asks.first_key(),
                Side::Sell => self.bids.last_key(),
            };
            let Some(best) = best else { break };
            if order.order_type == OrderType::Limit && !crosses(order.side, order.price, best) {
                break;
            }

            let opposite = match order.side {
                Side::Buy => &mut self.asks,
                Side::Sell => &mut self.bids,
            };
            let Some(level) = opposite.get_mut(best) else {
                break;
            };
            consume_level(&ctx, level, order, &mut self.locations, events, &mut outcome);
            if level.is_empty() {
                opposite.delete(best);
            }
        }

        if let Some(seq_id) = outcome.last_trade_seq_id {
            self.last_trade_seq_id = seq_id;
        }
        self.refresh_extrema();
        outcome
    }
}

/// Whether a limit at `limit` may trade against a resting price `best`.
#[inline]
fn crosses(side: Side, limit: u64, best: u64) -> bool {
    match side {
        Side::Buy => best <= limit,
        Side::Sell => best >= limit,
    }
}

/// FIFO-consumes `level` until it or the taker is exhausted.
fn consume_level(
    ctx: &MatchContext<'_>,
    level: &mut PriceLevel,
    taker: &mut Order,
    locations: &mut HashMap<u64, Location>,
    events: &mut Vec<Event>,
    outcome: &mut MatchOutcome,
) {
    while taker.remaining() > 0 {
        let Some(maker) = level.front_mut() else { break };
        let volume = taker.remaining().min(maker.remaining());
        let now = current_time_millis();
        let trade = ctx.fill(taker, maker, volume, now);
        trace!(
            "Order book {}: trade {} {} @ {} (ask {}, bid {})",
            ctx.market_id, trade.seq_id, trade.volume, trade.price, trade.ask_id, trade.bid_id
        );
        outcome.trades += 1;
        outcome.last_price = Some(trade.price);
        outcome.last_trade_seq_id = Some(trade.seq_id);
        events.push(Event::Trade(trade));

        if maker.remaining() == 0 {
            if let Some(done) = level.pop_front() {
                locations.remove(&done.id);
                events.push(Event::OrderStatusChange(done));
            }
        } else {
            events.push(Event::OrderStatusChange(maker.clone()));
        }
    }
}
