//! Command entry points of the order book: process, cancel and rejections.

use super::book::{BookKind, OrderBook};
use super::event::{ErrorCode, Event};
use super::order::{Order, OrderStatus, OrderType, StopKind};
use crate::utils::current_time_millis;
use tracing::{trace, warn};

impl OrderBook {
    /// Processes a new order, appending every resulting event to `events`.
    ///
    /// Invalid orders produce a single [`Event::Error`] and leave the book
    /// untouched. Stop orders are armed on their stop index. Everything else
    /// is matched against the opposite side; a limit remainder rests, a
    /// market remainder is closed. When the command traded, armed stops are
    /// evaluated against the new last price.
    pub fn process(&mut self, order: Order, events: &mut Vec<Event>) {
        if let Some(code) = self.validate(&order) {
            self.append_error_event(events, code, order);
            return;
        }
        self.last_event_seq_id += 1;
        trace!(
            "Order book {}: processing order {} ({} {:?} {} @ {})",
            self.market_id, order.id, order.side, order.order_type, order.amount, order.price
        );

        if order.is_stop() {
            self.arm_stop(order, events);
            return;
        }

        if self.execute(order, events) {
            self.trigger_stops(events);
        }
    }

    /// Cancels a resting or armed order. Only `id` and `market_id` of the
    /// command are consulted.
    pub fn cancel(&mut self, order: Order, events: &mut Vec<Event>) {
        if order.market_id != self.market_id {
            self.append_error_event(events, ErrorCode::UnknownMarket, order);
            return;
        }
        let mut cancelled = match self.remove_order(order.id) {
            Ok(cancelled) => cancelled,
            Err(_) => {
                self.append_error_event(events, ErrorCode::OrderNotFound, order);
                return;
            }
        };
        self.last_event_seq_id += 1;
        cancelled.status = OrderStatus::Cancelled;
        cancelled.updated_at = current_time_millis();
        trace!(
            "Order book {}: cancelled order {}",
            self.market_id, cancelled.id
        );
        events.push(Event::OrderStatusChange(cancelled));
    }

    /// Appends a rejection for `order`.
    pub fn append_error_event(&self, events: &mut Vec<Event>, code: ErrorCode, order: Order) {
        warn!(
            market = %self.market_id,
            order_id = order.id,
            %code,
            "order rejected"
        );
        events.push(Event::Error { code, order });
    }

    /// First rule `order` breaks, if any.
    pub fn validate(&self, order: &Order) -> Option<ErrorCode> {
        if order.market_id != self.market_id {
            return Some(ErrorCode::UnknownMarket);
        }
        if order.id == 0 {
            return Some(ErrorCode::InvalidOrderId);
        }
        match order.order_type {
            OrderType::Limit if order.price == 0 => return Some(ErrorCode::InvalidPrice),
            OrderType::Limit | OrderType::Market => {}
            OrderType::Unsupported => return Some(ErrorCode::UnsupportedType),
        }
        if order.amount == 0 {
            return Some(ErrorCode::InvalidAmount);
        }
        if order.stop != StopKind::None && order.stop_price == 0 {
            return Some(ErrorCode::InvalidStopPrice);
        }
        if order.is_terminal() {
            return Some(ErrorCode::InvalidStatus);
        }
        if order.filled_amount >= order.amount {
            return Some(ErrorCode::AlreadyFilled);
        }
        if self.locations.contains_key(&order.id) {
            return Some(ErrorCode::DuplicateOrder);
        }
        None
    }

    /// Rests a limit remainder on its own side.
    pub(super) fn rest(&mut self, order: Order) {
        let kind = match order.side {
            super::order::Side::Buy => BookKind::Bids,
            super::order::Side::Sell => BookKind::Asks,
        };
        let (id, price) = (order.id, order.price);
        if let Err(err) = self.insert_at(kind, price, order) {
            warn!(
                market = %self.market_id,
                order_id = id,
                error = %err,
                "failed to rest order"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::order::Side;
    use crate::sequence::SequenceGenerator;
    use std::sync::Arc;

    fn book() -> OrderBook {
        OrderBook::new("btcusdt", Arc::new(SequenceGenerator::new(0, 0)))
    }

    fn first_error(events: &[Event]) -> Option<ErrorCode> {
        events.iter().find_map(|e| match e {
            Event::Error { code, .. } => Some(*code),
            _ => None,
        })
    }

    #[test]
    fn test_rejections_leave_book_unchanged() {
        let mut book = book();
        let cases = vec![
            (
                Order::limit(1, "ethusdt", Side::Buy, 10, 1),
                ErrorCode::UnknownMarket,
            ),
            (
                Order::limit(0, "btcusdt", Side::Buy, 10, 1),
                ErrorCode::InvalidOrderId,
            ),
            (
                Order::limit(1, "btcusdt", Side::Buy, 0, 1),
                ErrorCode::InvalidPrice,
            ),
            (
                Order::limit(1, "btcusdt", Side::Buy, 10, 0),
                ErrorCode::InvalidAmount,
            ),
            (
                Order::limit(1, "btcusdt", Side::Buy, 10, 1).with_stop(StopKind::Loss, 0),
                ErrorCode::InvalidStopPrice,
            ),
        ];

        for (order, expected) in cases {
            let mut events = Vec::new();
            book.process(order, &mut events);
            assert_eq!(events.len(), 1);
            assert_eq!(first_error(&events), Some(expected));
        }
        assert_eq!(book.order_count(), 0);
        assert_eq!(book.last_event_seq_id(), 0);
    }

    #[test]
    fn test_unsupported_type_and_terminal_status() {
        let mut book = book();
        let mut events = Vec::new();

        let mut unsupported = Order::limit(1, "btcusdt", Side::Buy, 10, 1);
        unsupported.order_type = OrderType::Unsupported;
        book.process(unsupported, &mut events);

        let mut cancelled = Order::limit(2, "btcusdt", Side::Buy, 10, 1);
        cancelled.status = OrderStatus::Cancelled;
        book.process(cancelled, &mut events);

        let mut filled = Order::limit(3, "btcusdt", Side::Buy, 10, 5);
        filled.filled_amount = 5;
        book.process(filled, &mut events);

        let codes: Vec<ErrorCode> = events
            .iter()
            .filter_map(|e| match e {
                Event::Error { code, .. } => Some(*code),
                _ => None,
            })
            .collect();
        assert_eq!(
            codes,
            vec![
                ErrorCode::UnsupportedType,
                ErrorCode::InvalidStatus,
                ErrorCode::AlreadyFilled
            ]
        );
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut book = book();
        let mut events = Vec::new();
        book.process(Order::limit(5, "btcusdt", Side::Buy, 10, 1), &mut events);
        assert!(events.is_empty());

        book.process(Order::limit(5, "btcusdt", Side::Buy, 11, 1), &mut events);
        assert_eq!(first_error(&events), Some(ErrorCode::DuplicateOrder));
        assert_eq!(book.best_bid(), Some(10));
    }

    #[test]
    fn test_cancel_unknown_order() {
        let mut book = book();
        let mut events = Vec::new();
        book.cancel(
            Order::limit(9, "btcusdt", Side::Sell, 10, 1).into_cancel(),
            &mut events,
        );
        assert_eq!(first_error(&events), Some(ErrorCode::OrderNotFound));
    }

    #[test]
    fn test_cancel_armed_stop() {
        let mut book = book();
        let mut events = Vec::new();
        let stop = Order::limit(3, "btcusdt", Side::Sell, 90, 4).with_stop(StopKind::Loss, 95);
        book.process(stop.clone(), &mut events);
        assert_eq!(book.highest_loss_price(), Some(95));

        events.clear();
        book.cancel(stop.into_cancel(), &mut events);
        assert_eq!(book.highest_loss_price(), None);
        assert!(matches!(
            events.as_slice(),
            [Event::OrderStatusChange(o)] if o.status == OrderStatus::Cancelled && o.id == 3
        ));
    }
}
