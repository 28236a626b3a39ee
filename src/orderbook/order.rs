//! Order record shared by the book, the engine and the OMS.

use crate::utils::current_time_millis;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Market identifier, e.g. `"btcusdt"`.
pub type MarketId = String;

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Bid.
    Buy,
    /// Ask.
    Sell,
}

impl Side {
    /// The other side of the book.
    #[must_use]
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Execution type of an order.
///
/// Unknown wire values decode to [`OrderType::Unsupported`] so the engine can
/// answer them with an error event instead of dropping the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Rests at `price` once matching stops.
    Limit,
    /// Walks the opposite side without a price bound, never rests.
    Market,
    /// Any type the engine does not execute.
    #[serde(other)]
    Unsupported,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Limit => "limit",
            OrderType::Market => "market",
            OrderType::Unsupported => "unsupported",
        }
    }
}

/// Stop trigger attached to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    /// Plain order.
    #[default]
    None,
    /// Stop-entry.
    Entry,
    /// Stop-loss.
    Loss,
}

impl StopKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StopKind::None => "none",
            StopKind::Entry => "entry",
            StopKind::Loss => "loss",
        }
    }
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Live without fills.
    Untouched,
    /// Armed stop order waiting for its trigger, or a triggered one that has
    /// not traded yet.
    Pending,
    /// Live with at least one fill.
    PartiallyFilled,
    /// Terminal: done trading.
    Filled,
    /// Terminal: withdrawn.
    Cancelled,
}

impl OrderStatus {
    /// `Filled` and `Cancelled` orders never come back.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }

    /// Name used by the persistence layer.
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Untouched => "untouched",
            OrderStatus::Pending => "pending",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of inbound command an order carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Place the order.
    #[default]
    NewOrder,
    /// Withdraw a resting or armed order.
    CancelOrder,
    /// Anything else seen on the wire.
    #[serde(other)]
    Unknown,
}

/// An order. Prices and amounts are unit counts at
/// [`PRECISION`](crate::decimal::PRECISION) fractional digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Globally unique id.
    pub id: u64,
    /// Market the order trades on.
    pub market_id: MarketId,
    /// Owner user id.
    pub owner_id: u64,
    /// Owner sub-account.
    #[serde(default)]
    pub sub_account: u64,
    /// Bid or ask.
    pub side: Side,
    /// Limit or market.
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Stop trigger kind.
    #[serde(default)]
    pub stop: StopKind,
    /// Limit price, ignored for market orders.
    #[serde(default)]
    pub price: u64,
    /// Trigger price for stop orders.
    #[serde(default)]
    pub stop_price: u64,
    /// Ordered base amount.
    pub amount: u64,
    /// Executed base amount.
    #[serde(default)]
    pub filled_amount: u64,
    /// Accumulated fee, in the asset the owner receives.
    #[serde(default)]
    pub fee_amount: u64,
    /// Funds given up so far: quote for buys, base for sells.
    #[serde(default)]
    pub used_funds: u64,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Command carried by this record.
    #[serde(default)]
    pub event_type: EventType,
    /// Creation time, unix milliseconds.
    #[serde(default)]
    pub created_at: u64,
    /// Last mutation time, unix milliseconds.
    #[serde(default)]
    pub updated_at: u64,
}

impl Order {
    /// New untouched limit order.
    pub fn limit(id: u64, market_id: &str, side: Side, price: u64, amount: u64) -> Self {
        let now = current_time_millis();
        Self {
            id,
            market_id: market_id.to_string(),
            owner_id: 0,
            sub_account: 0,
            side,
            order_type: OrderType::Limit,
            stop: StopKind::None,
            price,
            stop_price: 0,
            amount,
            filled_amount: 0,
            fee_amount: 0,
            used_funds: 0,
            status: OrderStatus::Untouched,
            event_type: EventType::NewOrder,
            created_at: now,
            updated_at: now,
        }
    }

    /// New untouched market order.
    pub fn market(id: u64, market_id: &str, side: Side, amount: u64) -> Self {
        Self {
            order_type: OrderType::Market,
            ..Self::limit(id, market_id, side, 0, amount)
        }
    }

    /// Sets the owner.
    #[must_use]
    pub fn with_owner(mut self, owner_id: u64) -> Self {
        self.owner_id = owner_id;
        self
    }

    /// Arms the order as a stop.
    #[must_use]
    pub fn with_stop(mut self, stop: StopKind, stop_price: u64) -> Self {
        self.stop = stop;
        self.stop_price = stop_price;
        self
    }

    /// Turns the record into a cancel command.
    #[must_use]
    pub fn into_cancel(mut self) -> Self {
        self.event_type = EventType::CancelOrder;
        self
    }

    /// Amount still open.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.amount.saturating_sub(self.filled_amount)
    }

    /// Whether the order waits on a stop trigger.
    #[inline]
    pub fn is_stop(&self) -> bool {
        self.stop != StopKind::None
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
