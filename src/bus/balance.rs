//! Balance-update triggers.
//!
//! Anything that moves funds queues a [`BalanceUpdate`] through a
//! [`BalanceTrigger`]. The [`BalanceUpdatePublisher`] drains the bounded
//! queue on a fixed cadence and publishes everything accumulated as one
//! `balance_update_trigger` message.

use super::codec::{EventSerializer, encode_batch};
use super::{BusError, MessageBus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Default queue capacity.
pub const DEFAULT_BALANCE_CAPACITY: usize = 10_000;

/// Default drain cadence.
pub const DEFAULT_BALANCE_FLUSH_INTERVAL: Duration = Duration::from_millis(200);

/// Asks the balance service to recompute one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub user_id: u64,
    pub sub_account: u64,
    pub is_internal: bool,
}

impl BalanceUpdate {
    pub fn new(user_id: u64, sub_account: u64) -> Self {
        Self {
            user_id,
            sub_account,
            is_internal: false,
        }
    }
}

/// Producer handle. Waits for room when the queue is full.
#[derive(Debug, Clone)]
pub struct BalanceTrigger {
    tx: mpsc::Sender<BalanceUpdate>,
}

impl BalanceTrigger {
    /// Queues `update`, yielding to the runtime until the publisher has
    /// made room.
    pub async fn trigger(&self, update: BalanceUpdate) {
        match self.tx.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(update)) => {
                debug!(user_id = update.user_id, "balance update queue full, waiting for the publisher");
                if self.tx.send(update).await.is_err() {
                    warn!("balance publisher stopped, update dropped");
                }
            }
            Err(TrySendError::Closed(_)) => {
                warn!("balance publisher stopped, update dropped");
            }
        }
    }
}

/// Drains queued triggers onto the bus.
pub struct BalanceUpdatePublisher {
    rx: mpsc::Receiver<BalanceUpdate>,
    bus: Arc<dyn MessageBus>,
    topic: String,
    serializer: Arc<dyn EventSerializer>,
    pending: Vec<BalanceUpdate>,
}

impl fmt::Debug for BalanceUpdatePublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BalanceUpdatePublisher")
            .field("topic", &self.topic)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl BalanceUpdatePublisher {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        topic: &str,
        serializer: Arc<dyn EventSerializer>,
        capacity: usize,
    ) -> (Self, BalanceTrigger) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let publisher = Self {
            rx,
            bus,
            topic: topic.to_string(),
            serializer,
            pending: Vec::new(),
        };
        (publisher, BalanceTrigger { tx })
    }

    /// Updates taken off the queue but not yet published.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Publishes everything queued as one message. Returns how many updates
    /// went out. On a bus error the updates are kept for the next drain.
    pub async fn drain(&mut self) -> Result<usize, BusError> {
        while let Ok(update) = self.rx.try_recv() {
            self.pending.push(update);
        }
        if self.pending.is_empty() {
            return Ok(0);
        }
        let bodies = self
            .pending
            .iter()
            .map(|update| self.serializer.serialize_balance(update))
            .collect::<Result<Vec<_>, _>>()?;
        let message = encode_batch(bodies)?;
        self.bus.publish(&self.topic, message).await?;
        let published = self.pending.len();
        self.pending.clear();
        trace!(topic = %self.topic, published, "balance updates published");
        Ok(published)
    }

    /// Drains every `period` until `shutdown` flips, then once more.
    pub async fn run(mut self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(topic = %self.topic, ?period, "balance update publisher started");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.drain_logged().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.drain_logged().await;
        if !self.pending.is_empty() {
            warn!(left = self.pending.len(), "balance publisher stopped with unsent updates");
        }
        info!(topic = %self.topic, "balance update publisher stopped");
    }

    async fn drain_logged(&mut self) {
        if let Err(err) = self.drain().await {
            debug!(pending = self.pending.len(), "balance updates kept for retry");
            warn!(topic = %self.topic, error = %err, "balance update publish failed");
        }
    }
}
