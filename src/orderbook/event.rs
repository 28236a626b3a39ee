//! Events the book appends to its output buffer.

use super::order::Order;
use super::trade::Trade;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason attached to an [`Event::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorCode {
    /// The order names a market this book does not serve.
    UnknownMarket,
    /// Id `0` is reserved.
    InvalidOrderId,
    /// Limit order without a price.
    InvalidPrice,
    /// Zero amount.
    InvalidAmount,
    /// Stop order without a trigger price.
    InvalidStopPrice,
    /// Order type the engine does not execute.
    UnsupportedType,
    /// Status already terminal.
    InvalidStatus,
    /// Nothing left to fill.
    AlreadyFilled,
    /// An order with this id is already in the book.
    DuplicateOrder,
    /// Cancel target not found.
    OrderNotFound,
    /// Command kind the engine does not handle.
    UnsupportedEvent,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorCode::UnknownMarket => "unknown market",
            ErrorCode::InvalidOrderId => "invalid order id",
            ErrorCode::InvalidPrice => "invalid price",
            ErrorCode::InvalidAmount => "invalid amount",
            ErrorCode::InvalidStopPrice => "invalid stop price",
            ErrorCode::UnsupportedType => "unsupported order type",
            ErrorCode::InvalidStatus => "invalid order status",
            ErrorCode::AlreadyFilled => "order already filled",
            ErrorCode::DuplicateOrder => "duplicate order",
            ErrorCode::OrderNotFound => "order not found",
            ErrorCode::UnsupportedEvent => "unsupported event",
        };
        f.write_str(text)
    }
}

/// Output of the matching engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A match happened.
    Trade(Trade),
    /// An order's status or fill state changed; carries the full record.
    OrderStatusChange(Order),
    /// A stop order triggered and is about to be executed.
    OrderActivated(Order),
    /// The command was rejected; the book is unchanged.
    Error {
        /// Rejection reason.
        code: ErrorCode,
        /// The rejected order as received.
        order: Order,
    },
}

impl Event {
    /// Trade payload, if any.
    pub fn as_trade(&self) -> Option<&Trade> {
        match self {
            Event::Trade(trade) => Some(trade),
            _ => None,
        }
    }

    /// Order carried by the event, if any.
    pub fn order(&self) -> Option<&Order> {
        match self {
            Event::Trade(_) => None,
            Event::OrderStatusChange(order)
            | Event::OrderActivated(order)
            | Event::Error { order, .. } => Some(order),
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Event::Error { .. })
    }
}
