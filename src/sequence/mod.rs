//! Process-wide order and trade id generator with periodic checkpointing.
//!
//! Ids are handed out with a lock-free `fetch_add`. A background worker
//! writes the hot counters back to the database sequences once per interval
//! so a restart resumes close to where the previous process stopped; at most
//! one interval worth of ids can be handed out again after a crash.

use crate::store::{ORDERS_SEQUENCE, Store, StoreError, TRADES_SEQUENCE};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Added to the persisted sequence values at bootstrap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceOffsets {
    pub order_offset: u64,
    pub trade_offset: u64,
}

/// What a checkpoint did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// At least one counter was written and the transaction committed.
    Committed {
        /// Order counter written, if it moved.
        orders: Option<u64>,
        /// Trade counter written, if it moved.
        trades: Option<u64>,
    },
    /// Nothing moved; the transaction was rolled back.
    Unchanged,
}

/// Monotonic id counters.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    last_order_seq: AtomicU64,
    last_trade_seq: AtomicU64,
    prev_order_seq: AtomicU64,
    prev_trade_seq: AtomicU64,
}

impl SequenceGenerator {
    /// Counters starting after the given values. Both are treated as already
    /// persisted.
    pub fn new(last_order_seq: u64, last_trade_seq: u64) -> Self {
        Self {
            last_order_seq: AtomicU64::new(last_order_seq),
            last_trade_seq: AtomicU64::new(last_trade_seq),
            prev_order_seq: AtomicU64::new(last_order_seq),
            prev_trade_seq: AtomicU64::new(last_trade_seq),
        }
    }

    /// Reads both sequences from `store` and applies `offsets`.
    ///
    /// An offset moves the hot counter only, so the first checkpoint persists
    /// the jump.
    pub fn bootstrap(store: &dyn Store, offsets: SequenceOffsets) -> Result<Self, StoreError> {
        let orders = store.sequence_last_value(ORDERS_SEQUENCE)?;
        let trades = store.sequence_last_value(TRADES_SEQUENCE)?;
        let generator = Self::new(orders, trades);
        generator
            .last_order_seq
            .fetch_add(offsets.order_offset, Ordering::SeqCst);
        generator
            .last_trade_seq
            .fetch_add(offsets.trade_offset, Ordering::SeqCst);
        info!(
            last_order_seq = orders + offsets.order_offset,
            last_trade_seq = trades + offsets.trade_offset,
            "sequence generator bootstrapped"
        );
        Ok(generator)
    }

    /// Next order id.
    #[inline]
    pub fn next_order_id(&self) -> u64 {
        self.last_order_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Next trade id.
    #[inline]
    pub fn next_trade_id(&self) -> u64 {
        self.last_trade_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    #[inline]
    pub fn last_order_id(&self) -> u64 {
        self.last_order_seq.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn last_trade_id(&self) -> u64 {
        self.last_trade_seq.load(Ordering::SeqCst)
    }

    /// Writes every counter that moved since the previous checkpoint in one
    /// transaction.
    ///
    /// `prev` only advances after the commit succeeded, so a failed
    /// checkpoint is retried in full on the next call.
    pub fn checkpoint(&self, store: &dyn Store) -> Result<CheckpointOutcome, StoreError> {
        let order_last = self.last_order_seq.load(Ordering::SeqCst);
        let trade_last = self.last_trade_seq.load(Ordering::SeqCst);
        let orders =
            (order_last > self.prev_order_seq.load(Ordering::SeqCst)).then_some(order_last);
        let trades =
            (trade_last > self.prev_trade_seq.load(Ordering::SeqCst)).then_some(trade_last);

        let mut tx = store.begin()?;
        if orders.is_none() && trades.is_none() {
            tx.rollback()?;
            return Ok(CheckpointOutcome::Unchanged);
        }

        let written = orders
            .map(|value| (ORDERS_SEQUENCE, value))
            .into_iter()
            .chain(trades.map(|value| (TRADES_SEQUENCE, value)));
        for (name, value) in written {
            if let Err(err) = tx.set_sequence(name, value, true) {
                tx.rollback()?;
                return Err(err);
            }
        }
        tx.commit()?;

        if let Some(value) = orders {
            self.prev_order_seq.fetch_max(value, Ordering::SeqCst);
        }
        if let Some(value) = trades {
            self.prev_trade_seq.fetch_max(value, Ordering::SeqCst);
        }
        debug!(?orders, ?trades, "sequence checkpoint committed");
        Ok(CheckpointOutcome::Committed { orders, trades })
    }

    /// Checkpoints every `period` until `shutdown` flips, then once more.
    pub async fn run_checkpointer(
        self: Arc<Self>,
        store: Arc<dyn Store>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(?period, "sequence checkpointer started");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.checkpoint_logged(store.as_ref()),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.checkpoint_logged(store.as_ref());
        info!("sequence checkpointer stopped");
    }

    fn checkpoint_logged(&self, store: &dyn Store) {
        if let Err(err) = self.checkpoint(store) {
            warn!(error = %err, "sequence checkpoint failed");
        }
    }
}
