//! Persistence sync events and their publisher.
//!
//! The OMS and the dispatcher describe every durable change as a
//! [`SyncEvent`] and hand it to a [`SyncSender`]. The [`SyncPublisher`]
//! worker drains the queue once per tick and publishes the batch as one
//! `sync_data` message. A failed publish keeps the batch for the next tick.

use super::codec::{CodecError, EventSerializer, encode_batch};
use super::{BusError, MessageBus};
use crate::orderbook::{Order, Side, Trade};
use crossbeam::channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Default publish cadence.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCommand {
    Save,
    Update,
    Delete,
}

/// Table a sync event targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncModel {
    Orders,
    Trades,
    Revenues,
    Liabilities,
    ReferralEarnings,
    Operations,
}

impl SyncModel {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncModel::Orders => "orders",
            SyncModel::Trades => "trades",
            SyncModel::Revenues => "revenues",
            SyncModel::Liabilities => "liabilities",
            SyncModel::ReferralEarnings => "referral_earnings",
            SyncModel::Operations => "operations",
        }
    }
}

impl fmt::Display for SyncModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    U64(u64),
    I64(i64),
    Bool(bool),
    Text(String),
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Scalar::U64(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::I64(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

/// One row-level change for the persistence service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub command: SyncCommand,
    pub model: SyncModel,
    pub payload: BTreeMap<String, Scalar>,
}

impl SyncEvent {
    pub fn new(command: SyncCommand, model: SyncModel) -> Self {
        Self {
            command,
            model,
            payload: BTreeMap::new(),
        }
    }

    /// Adds one column.
    pub fn with(mut self, key: &str, value: impl Into<Scalar>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn save_order(order: &Order) -> Self {
        Self::order_row(SyncCommand::Save, order)
    }

    pub fn update_order(order: &Order) -> Self {
        Self::order_row(SyncCommand::Update, order)
    }

    pub fn delete(model: SyncModel, id: u64) -> Self {
        Self::new(SyncCommand::Delete, model).with("id", id)
    }

    fn order_row(command: SyncCommand, order: &Order) -> Self {
        Self::new(command, SyncModel::Orders)
            .with("id", order.id)
            .with("market_id", order.market_id.as_str())
            .with("owner_id", order.owner_id)
            .with("sub_account", order.sub_account)
            .with("side", order.side.to_string())
            .with("type", order.order_type.as_str())
            .with("stop", order.stop.as_str())
            .with("price", order.price)
            .with("stop_price", order.stop_price)
            .with("amount", order.amount)
            .with("filled_amount", order.filled_amount)
            .with("fee_amount", order.fee_amount)
            .with("used_funds", order.used_funds)
            .with("status", order.status.as_str())
            .with("created_at", order.created_at)
            .with("updated_at", order.updated_at)
    }

    pub fn save_trade(trade: &Trade) -> Self {
        Self::new(SyncCommand::Save, SyncModel::Trades)
            .with("seq_id", trade.seq_id)
            .with("market_id", trade.market_id.as_str())
            .with("price", trade.price)
            .with("volume", trade.volume)
            .with("quote_volume", trade.quote_volume)
            .with("ask_id", trade.ask_id)
            .with("bid_id", trade.bid_id)
            .with("ask_owner_id", trade.ask_owner)
            .with("bid_owner_id", trade.bid_owner)
            .with("taker_side", trade.taker_side.to_string())
            .with("ask_fee_amount", trade.ask_fee_amount)
            .with("bid_fee_amount", trade.bid_fee_amount)
            .with("created_at", trade.timestamp)
    }

    /// Revenue rows for the fees of `trade`, one per charged side. The ask
    /// fee is in quote units, the bid fee in base units.
    pub fn revenues(trade: &Trade) -> Vec<Self> {
        [
            (Side::Sell, trade.ask_owner, trade.ask_fee_amount, "quote"),
            (Side::Buy, trade.bid_owner, trade.bid_fee_amount, "base"),
        ]
        .into_iter()
        .filter(|(_, _, fee, _)| *fee > 0)
        .map(|(side, owner, fee, unit)| {
            Self::new(SyncCommand::Save, SyncModel::Revenues)
                .with("trade_seq_id", trade.seq_id)
                .with("market_id", trade.market_id.as_str())
                .with("owner_id", owner)
                .with("side", side.to_string())
                .with("is_maker", side != trade.taker_side)
                .with("fee_amount", fee)
                .with("fee_unit", unit)
                .with("created_at", trade.timestamp)
        })
        .collect()
    }

    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.payload.get(key)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.payload.get(key) {
            Some(Scalar::U64(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.payload.get(key) {
            Some(Scalar::Text(value)) => Some(value),
            _ => None,
        }
    }
}

/// Cloneable producer handle.
#[derive(Debug, Clone)]
pub struct SyncSender {
    tx: Sender<SyncEvent>,
}

impl SyncSender {
    /// Handle plus the receiving end, for tests and custom drains.
    pub fn channel() -> (Self, Receiver<SyncEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    /// Queues `event`. Dropped with a warning once the publisher is gone.
    pub fn send(&self, event: SyncEvent) {
        if self.tx.send(event).is_err() {
            warn!("sync publisher stopped, event dropped");
        }
    }
}

/// Batches queued sync events onto the `sync_data` topic.
pub struct SyncPublisher {
    rx: Receiver<SyncEvent>,
    bus: Arc<dyn MessageBus>,
    topic: String,
    serializer: Arc<dyn EventSerializer>,
    pending: Vec<SyncEvent>,
}

impl fmt::Debug for SyncPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncPublisher")
            .field("topic", &self.topic)
            .field("pending", &self.pending.len())
            .field("content_type", &self.serializer.content_type())
            .finish()
    }
}

impl SyncPublisher {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        topic: &str,
        serializer: Arc<dyn EventSerializer>,
    ) -> (Self, SyncSender) {
        let (sender, rx) = SyncSender::channel();
        let publisher = Self {
            rx,
            bus,
            topic: topic.to_string(),
            serializer,
            pending: Vec::new(),
        };
        (publisher, sender)
    }

    /// Events waiting for a successful publish.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Drains the queue and publishes everything pending as one message.
    ///
    /// Returns the number of events published. On a bus error the batch is
    /// kept and the error returned.
    pub async fn flush(&mut self) -> Result<usize, BusError> {
        self.pending.extend(self.rx.try_iter());
        if self.pending.is_empty() {
            return Ok(0);
        }

        let message = self.encode_pending()?;
        self.bus.publish(&self.topic, message).await?;
        let published = self.pending.len();
        self.pending.clear();
        trace!(topic = %self.topic, published, "sync batch published");
        Ok(published)
    }

    fn encode_pending(&mut self) -> Result<bytes::Bytes, CodecError> {
        let serializer = &self.serializer;
        let mut bodies = Vec::with_capacity(self.pending.len());
        self.pending
            .retain(|event| match serializer.serialize_sync(event) {
                Ok(body) => {
                    bodies.push(body);
                    true
                }
                Err(err) => {
                    warn!(error = %err, model = %event.model, "dropping unencodable sync event");
                    false
                }
            });
        encode_batch(bodies)
    }

    /// Flushes every `period` until `shutdown` flips, then once more.
    pub async fn run(mut self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(topic = %self.topic, ?period, "sync publisher started");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.flush_logged().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.flush_logged().await;
        if !self.pending.is_empty() {
            warn!(left = self.pending.len(), "sync publisher stopped with unsent events");
        }
        info!(topic = %self.topic, "sync publisher stopped");
    }

    async fn flush_logged(&mut self) {
        if let Err(err) = self.flush().await {
            debug!(pending = self.pending.len(), "sync batch kept for retry");
            warn!(topic = %self.topic, error = %err, "sync publish failed");
        }
    }
}
