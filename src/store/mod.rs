//! Persistence interface used by bootstrap, the sequence checkpointer, the
//! last-price fallback and the reference pollers.
//!
//! The core only reads from the database, apart from the sequence `setval`
//! issued by the checkpointer. [`MemoryStore`] backs tests and the default
//! binary wiring.

mod memory;

pub use memory::{MemoryStore, StoreOp};

use crate::cache::{ApiKey, Coin, Market, Referral, SubAccount};
use crate::orderbook::{FeeSchedule, Order, Trade};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Sequence backing order ids.
pub const ORDERS_SEQUENCE: &str = "orders_id_seq";
/// Sequence backing trade ids.
pub const TRADES_SEQUENCE: &str = "trades_id_seq";

/// Persistence failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The backend rejected or failed the call.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// No such sequence.
    #[error("unknown sequence: {0}")]
    UnknownSequence(String),

    /// A migration file could not be applied.
    #[error("migration failed: {0}")]
    Migration(String),

    /// A previous migration run stopped half way.
    #[error("database is dirty at migration version {0}")]
    Dirty(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read side of the database plus the sequence write used by checkpoints.
pub trait Store: Send + Sync {
    /// `SELECT last_value FROM <name>`.
    fn sequence_last_value(&self, name: &str) -> Result<u64, StoreError>;

    /// Opens a transaction.
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError>;

    /// Orders whose status is pending, untouched or partially filled.
    fn load_active_orders(&self) -> Result<Vec<Order>, StoreError>;

    /// Most recent trade of `market_id` by `seq_id`.
    fn last_trade(&self, market_id: &str) -> Result<Option<Trade>, StoreError>;

    fn load_markets(&self) -> Result<Vec<Market>, StoreError>;

    fn load_coins(&self) -> Result<Vec<Coin>, StoreError>;

    fn load_api_keys(&self) -> Result<Vec<ApiKey>, StoreError>;

    fn load_sub_accounts(&self) -> Result<Vec<SubAccount>, StoreError>;

    /// Per-user fee overrides keyed by user id.
    fn load_user_fees(&self) -> Result<HashMap<u64, FeeSchedule>, StoreError>;

    fn load_referrals(&self) -> Result<Vec<Referral>, StoreError>;
}

/// A unit of work. Dropping it without [`commit`](Self::commit) discards it.
pub trait StoreTransaction {
    /// `SELECT setval(name, value, is_called)`.
    fn set_sequence(&mut self, name: &str, value: u64, is_called: bool)
    -> Result<(), StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Result of a migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Nothing to apply.
    NoChange,
    /// Migrations were applied up to `version`.
    Applied {
        /// Names of the applied files, in order.
        files: Vec<String>,
        /// Version after the run.
        version: u64,
    },
}

/// Applies forward migrations from a directory of `NNNN_name.up.sql` files.
pub trait Migrator {
    fn migrate_up(&self, dir: &Path) -> Result<MigrationOutcome, StoreError>;
}
