//! Trading engine: routes inbound commands to a market's book.

use super::book::OrderBook;
use super::event::{ErrorCode, Event};
use super::order::{EventType, Order};
use super::snapshot::LoadReport;
use crate::sequence::SequenceGenerator;
use std::sync::Arc;

/// Facade over exactly one [`OrderBook`]. Every call returns the events the
/// command produced, in emission order.
#[derive(Debug)]
pub struct TradingEngine {
    book: OrderBook,
}

impl TradingEngine {
    pub fn new(market_id: &str, sequences: Arc<SequenceGenerator>) -> Self {
        Self::from_book(OrderBook::new(market_id, sequences))
    }

    pub fn from_book(book: OrderBook) -> Self {
        Self { book }
    }

    #[inline]
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    #[inline]
    pub fn book_mut(&mut self) -> &mut OrderBook {
        &mut self.book
    }

    #[inline]
    pub fn market_id(&self) -> &str {
        self.book.market_id()
    }

    /// Places a new order.
    pub fn process(&mut self, order: Order) -> Vec<Event> {
        let mut events = Vec::new();
        self.book.process(order, &mut events);
        events
    }

    /// Cancels a live order.
    pub fn cancel_order(&mut self, order: Order) -> Vec<Event> {
        let mut events = Vec::new();
        self.book.cancel(order, &mut events);
        events
    }

    /// Dispatches on the command's `event_type`.
    pub fn process_event(&mut self, order: Order) -> Vec<Event> {
        match order.event_type {
            EventType::NewOrder => self.process(order),
            EventType::CancelOrder => self.cancel_order(order),
            EventType::Unknown => self.append_invalid_order(order, ErrorCode::UnsupportedEvent),
        }
    }

    /// Rejects `order` without touching the book.
    pub fn append_invalid_order(&self, order: Order, code: ErrorCode) -> Vec<Event> {
        let mut events = Vec::with_capacity(1);
        self.book.append_error_event(&mut events, code, order);
        events
    }

    /// Rebuilds the book from persisted orders.
    pub fn load_market(
        &mut self,
        market_id: &str,
        orders: Vec<Order>,
        last_event_seq_id: u64,
        last_trade_seq_id: u64,
    ) -> LoadReport {
        self.book
            .load_from_orders(market_id, orders, last_event_seq_id, last_trade_seq_id)
    }
}
