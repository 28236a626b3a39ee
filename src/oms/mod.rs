//! Order management service: the authoritative set of live orders.

pub mod monitor;
pub mod registry;
pub mod status;

pub use monitor::{ACTIVE_ORDERS_GAUGE, export_active_orders, run_compaction, run_monitor};
pub use registry::{CompactionReport, Oms};
pub use status::{StatusChange, is_valid_change};

use crate::orderbook::{MarketId, OrderStatus};
use thiserror::Error;

/// Errors returned by OMS operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum OmsError {
    /// No live order with this id in the requested scope.
    #[error("order {id} not found")]
    NotFound {
        /// Order id looked up
        id: u64,
    },

    /// No live orders for the market.
    #[error("no orders for market {0}")]
    MarketNotFound(MarketId),

    /// The order is terminal and cannot change status.
    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition {
        from: OrderStatus,
        to: OrderStatus,
    },
}
