//! Book snapshots: rebuilding from an order list and exporting state.

use super::book::{BookKind, OrderBook};
use super::error::OrderBookError;
use super::order::{MarketId, Order, OrderType, Side, StopKind};
use crate::utils::{current_time_millis, to_hex};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, trace, warn};

/// Format version written by [`SnapshotPackage::new`].
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Counters describing a [`OrderBook::load_from_orders`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Orders placed on the bid or ask side.
    pub resting: usize,
    /// Orders placed on a stop index.
    pub armed: usize,
    /// Orders dropped as unusable.
    pub skipped: usize,
}

/// Full state of one book at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// Market of the book
    pub market_id: MarketId,
    /// Milliseconds since epoch
    pub timestamp: u64,
    /// Resting buys, best first
    pub bids: Vec<Order>,
    /// Resting sells, best first
    pub asks: Vec<Order>,
    /// Armed stop orders
    pub stops: Vec<Order>,
    pub last_price: u64,
    pub last_event_seq_id: u64,
    pub last_trade_seq_id: u64,
}

impl BookSnapshot {
    /// Every order of the snapshot.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.bids.iter().chain(&self.asks).chain(&self.stops)
    }
}

/// Versioned snapshot with an integrity checksum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPackage {
    /// Version of the snapshot schema.
    pub version: u32,
    /// Snapshot payload.
    pub snapshot: BookSnapshot,
    /// Hex-encoded SHA-256 of the serialized snapshot.
    pub checksum: String,
}

impl SnapshotPackage {
    /// Wraps `snapshot`, computing its checksum.
    pub fn new(snapshot: BookSnapshot) -> Result<Self, OrderBookError> {
        let checksum = Self::compute_checksum(&snapshot)?;
        Ok(Self {
            version: SNAPSHOT_FORMAT_VERSION,
            snapshot,
            checksum,
        })
    }

    /// Serializes the package to JSON.
    pub fn to_json(&self) -> Result<String, OrderBookError> {
        serde_json::to_string(self).map_err(|error| OrderBookError::SerializationError {
            message: error.to_string(),
        })
    }

    /// Deserializes the package from JSON.
    pub fn from_json(data: &str) -> Result<Self, OrderBookError> {
        serde_json::from_str(data).map_err(|error| OrderBookError::DeserializationError {
            message: error.to_string(),
        })
    }

    /// Validates the checksum and version.
    pub fn validate(&self) -> Result<(), OrderBookError> {
        if self.version != SNAPSHOT_FORMAT_VERSION {
            return Err(OrderBookError::UnsupportedVersion(self.version));
        }
        let computed = Self::compute_checksum(&self.snapshot)?;
        if computed != self.checksum {
            return Err(OrderBookError::ChecksumMismatch {
                expected: self.checksum.clone(),
                actual: computed,
            });
        }
        Ok(())
    }

    /// Consumes the package and returns the validated snapshot.
    pub fn into_snapshot(self) -> Result<BookSnapshot, OrderBookError> {
        self.validate()?;
        Ok(self.snapshot)
    }

    fn compute_checksum(snapshot: &BookSnapshot) -> Result<String, OrderBookError> {
        let payload =
            serde_json::to_vec(snapshot).map_err(|error| OrderBookError::SerializationError {
                message: error.to_string(),
            })?;
        let mut hasher = Sha256::new();
        hasher.update(payload);
        Ok(to_hex(&hasher.finalize()))
    }
}

impl OrderBook {
    /// Rebuilds the book from an untrusted order list.
    ///
    /// The book is cleared first. Orders are placed in ascending id order,
    /// stop orders on their stop index and every other live order on its own
    /// side. Orders for another market, terminal or exhausted orders, market
    /// orders, zero prices, duplicates and orders that would cross the
    /// opposite side are skipped with a warning. The sequence counters are
    /// reset to the supplied values.
    pub fn load_from_orders(
        &mut self,
        market_id: &str,
        mut orders: Vec<Order>,
        last_event_seq_id: u64,
        last_trade_seq_id: u64,
    ) -> LoadReport {
        self.clear();
        self.market_id = market_id.to_string();
        orders.sort_by_key(|o| o.id);

        let mut report = LoadReport::default();
        for order in orders {
            let id = order.id;
            match self.load_one(order) {
                Ok(true) => report.armed += 1,
                Ok(false) => report.resting += 1,
                Err(reason) => {
                    warn!(market = %self.market_id, order_id = id, reason, "skipping snapshot order");
                    report.skipped += 1;
                }
            }
        }

        self.last_event_seq_id = last_event_seq_id;
        self.last_trade_seq_id = last_trade_seq_id;
        debug!(
            market = %self.market_id,
            resting = report.resting,
            armed = report.armed,
            skipped = report.skipped,
            "order book loaded"
        );
        report
    }

    /// Places one snapshot order. `Ok(true)` when armed as a stop.
    fn load_one(&mut self, order: Order) -> Result<bool, &'static str> {
        if order.market_id != self.market_id {
            return Err("foreign market");
        }
        if order.id == 0 {
            return Err("zero id");
        }
        if order.is_terminal() || order.filled_amount >= order.amount {
            return Err("order is done");
        }
        if self.locations.contains_key(&order.id) {
            return Err("duplicate id");
        }

        if order.stop != StopKind::None {
            if order.stop_price == 0 {
                return Err("zero stop price");
            }
            let kind = if order.stop == StopKind::Entry {
                BookKind::StopEntry
            } else {
                BookKind::StopLoss
            };
            let key = order.stop_price;
            self.insert_at(kind, key, order).map_err(|_| "insert failed")?;
            return Ok(true);
        }

        if order.order_type != OrderType::Limit {
            return Err("not a limit order");
        }
        if order.price == 0 {
            return Err("zero price");
        }
        let (kind, crossed) = match order.side {
            Side::Buy => (
                BookKind::Bids,
                self.lowest_ask.is_some_and(|ask| order.price >= ask),
            ),
            Side::Sell => (
                BookKind::Asks,
                self.highest_bid.is_some_and(|bid| order.price <= bid),
            ),
        };
        if crossed {
            return Err("crosses the book");
        }
        trace!(
            "Order book {}: restoring order {} at {}",
            self.market_id, order.id, order.price
        );
        let key = order.price;
        self.insert_at(kind, key, order).map_err(|_| "insert failed")?;
        Ok(false)
    }

    /// Exports every live order with the book counters.
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            market_id: self.market_id.clone(),
            timestamp: current_time_millis(),
            bids: self.resting_orders(Side::Buy),
            asks: self.resting_orders(Side::Sell),
            stops: self.stop_orders(),
            last_price: self.last_price,
            last_event_seq_id: self.last_event_seq_id,
            last_trade_seq_id: self.last_trade_seq_id,
        }
    }

    /// Snapshot wrapped in a checksummed package.
    pub fn snapshot_package(&self) -> Result<SnapshotPackage, OrderBookError> {
        SnapshotPackage::new(self.snapshot())
    }

    /// Validates `package` and rebuilds the book from it.
    pub fn restore_from_package(
        &mut self,
        package: SnapshotPackage,
    ) -> Result<LoadReport, OrderBookError> {
        let snapshot = package.into_snapshot()?;
        if snapshot.market_id != self.market_id {
            return Err(OrderBookError::MarketMismatch {
                expected: self.market_id.clone(),
                actual: snapshot.market_id,
            });
        }
        let orders: Vec<Order> = snapshot.orders().cloned().collect();
        let market_id = snapshot.market_id.clone();
        let report = self.load_from_orders(
            &market_id,
            orders,
            snapshot.last_event_seq_id,
            snapshot.last_trade_seq_id,
        );
        self.last_price = snapshot.last_price;
        Ok(report)
    }
}
