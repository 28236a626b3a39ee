//! Shared fixtures for order book tests.

use crate::orderbook::{Event, Order, OrderBook, OrderStatus, Side, Trade};
use crate::sequence::SequenceGenerator;
use std::sync::Arc;

pub const MARKET: &str = "btcusdt";

/// Empty book on [`MARKET`] with fresh counters.
#[allow(dead_code)]
pub fn new_book() -> OrderBook {
    OrderBook::new(MARKET, Arc::new(SequenceGenerator::new(0, 0)))
}

#[allow(dead_code)]
pub fn limit(id: u64, side: Side, price: u64, amount: u64) -> Order {
    Order::limit(id, MARKET, side, price, amount).with_owner(id * 10)
}

/// Runs `order` through `book` and returns its events.
#[allow(dead_code)]
pub fn place(book: &mut OrderBook, order: Order) -> Vec<Event> {
    let mut events = Vec::new();
    book.process(order, &mut events);
    events
}

#[allow(dead_code)]
pub fn trades(events: &[Event]) -> Vec<Trade> {
    events.iter().filter_map(Event::as_trade).cloned().collect()
}

/// Last status change reported for `id`.
#[allow(dead_code)]
pub fn last_status(events: &[Event], id: u64) -> Option<(OrderStatus, u64)> {
    events.iter().rev().find_map(|e| match e {
        Event::OrderStatusChange(o) if o.id == id => Some((o.status, o.filled_amount)),
        _ => None,
    })
}
