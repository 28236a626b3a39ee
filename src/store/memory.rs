use super::{
    MigrationOutcome, Migrator, ORDERS_SEQUENCE, Store, StoreError, StoreTransaction,
    TRADES_SEQUENCE,
};
use crate::cache::{ApiKey, Coin, Market, Referral, SubAccount};
use crate::orderbook::{FeeSchedule, Order, Trade};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Marker file naming a migration version that failed half way.
const DIRTY_MARKER: &str = ".dirty";

/// Operation recorded by [`MemoryStore`] for inspection in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Begin,
    SetSequence {
        name: String,
        value: u64,
        is_called: bool,
    },
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
struct State {
    sequences: HashMap<String, u64>,
    orders: Vec<Order>,
    trades: Vec<Trade>,
    markets: Vec<Market>,
    coins: Vec<Coin>,
    api_keys: Vec<ApiKey>,
    sub_accounts: Vec<SubAccount>,
    user_fees: HashMap<u64, FeeSchedule>,
    referrals: Vec<Referral>,
    migration_version: Option<u64>,
    ops: Vec<StoreOp>,
    failing: bool,
}

/// In-memory [`Store`] and [`Migrator`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Store with both id sequences at zero.
    pub fn new() -> Self {
        let store = Self::default();
        store.set_sequence_value(ORDERS_SEQUENCE, 0);
        store.set_sequence_value(TRADES_SEQUENCE, 0);
        store
    }

    pub fn set_sequence_value(&self, name: &str, value: u64) {
        self.state.lock().sequences.insert(name.to_string(), value);
    }

    pub fn insert_order(&self, order: Order) {
        self.state.lock().orders.push(order);
    }

    pub fn insert_trade(&self, trade: Trade) {
        self.state.lock().trades.push(trade);
    }

    pub fn set_markets(&self, markets: Vec<Market>) {
        self.state.lock().markets = markets;
    }

    pub fn set_coins(&self, coins: Vec<Coin>) {
        self.state.lock().coins = coins;
    }

    pub fn set_api_keys(&self, api_keys: Vec<ApiKey>) {
        self.state.lock().api_keys = api_keys;
    }

    pub fn set_sub_accounts(&self, sub_accounts: Vec<SubAccount>) {
        self.state.lock().sub_accounts = sub_accounts;
    }

    pub fn set_user_fees(&self, user_fees: HashMap<u64, FeeSchedule>) {
        self.state.lock().user_fees = user_fees;
    }

    pub fn set_referrals(&self, referrals: Vec<Referral>) {
        self.state.lock().referrals = referrals;
    }

    /// Makes every call fail with [`StoreError::Persistence`].
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Operations recorded so far.
    pub fn ops(&self) -> Vec<StoreOp> {
        self.state.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.lock().ops.clear();
    }

    pub fn migration_version(&self) -> Option<u64> {
        self.state.lock().migration_version
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.state.lock().failing {
            return Err(StoreError::Persistence("store unavailable".to_string()));
        }
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, StoreError> {
        self.check()?;
        let state = self.state.lock();
        Ok(f(&state))
    }
}

impl Store for MemoryStore {
    fn sequence_last_value(&self, name: &str) -> Result<u64, StoreError> {
        self.read(|s| s.sequences.get(name).copied())?
            .ok_or_else(|| StoreError::UnknownSequence(name.to_string()))
    }

    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        self.check()?;
        self.state.lock().ops.push(StoreOp::Begin);
        Ok(Box::new(MemoryTransaction {
            store: self,
            pending: Vec::new(),
        }))
    }

    fn load_active_orders(&self) -> Result<Vec<Order>, StoreError> {
        self.read(|s| {
            s.orders
                .iter()
                .filter(|o| !o.is_terminal())
                .cloned()
                .collect()
        })
    }

    fn last_trade(&self, market_id: &str) -> Result<Option<Trade>, StoreError> {
        self.read(|s| {
            s.trades
                .iter()
                .filter(|t| t.market_id == market_id)
                .max_by_key(|t| t.seq_id)
                .cloned()
        })
    }

    fn load_markets(&self) -> Result<Vec<Market>, StoreError> {
        self.read(|s| s.markets.clone())
    }

    fn load_coins(&self) -> Result<Vec<Coin>, StoreError> {
        self.read(|s| s.coins.clone())
    }

    fn load_api_keys(&self) -> Result<Vec<ApiKey>, StoreError> {
        self.read(|s| s.api_keys.clone())
    }

    fn load_sub_accounts(&self) -> Result<Vec<SubAccount>, StoreError> {
        self.read(|s| s.sub_accounts.clone())
    }

    fn load_user_fees(&self) -> Result<HashMap<u64, FeeSchedule>, StoreError> {
        self.read(|s| s.user_fees.clone())
    }

    fn load_referrals(&self) -> Result<Vec<Referral>, StoreError> {
        self.read(|s| s.referrals.clone())
    }
}

/// Buffers `setval` calls until commit.
struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    pending: Vec<(String, u64, bool)>,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn set_sequence(
        &mut self,
        name: &str,
        value: u64,
        is_called: bool,
    ) -> Result<(), StoreError> {
        self.store.check()?;
        let mut state = self.store.state.lock();
        if !state.sequences.contains_key(name) {
            return Err(StoreError::UnknownSequence(name.to_string()));
        }
        state.ops.push(StoreOp::SetSequence {
            name: name.to_string(),
            value,
            is_called,
        });
        self.pending.push((name.to_string(), value, is_called));
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { store, pending } = *self;
        store.check()?;
        let mut state = store.state.lock();
        for (name, value, _) in pending {
            state.sequences.insert(name, value);
        }
        state.ops.push(StoreOp::Commit);
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.store.state.lock().ops.push(StoreOp::Rollback);
        Ok(())
    }
}

/// Parses `NNNN_name.up.sql` into its version.
fn migration_version(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(".up.sql")?;
    let (version, name) = stem.split_once('_')?;
    if name.is_empty() {
        return None;
    }
    version.parse().ok()
}

impl Migrator for MemoryStore {
    fn migrate_up(&self, dir: &Path) -> Result<MigrationOutcome, StoreError> {
        let dirty = dir.join(DIRTY_MARKER);
        if dirty.exists() {
            let content = fs::read_to_string(&dirty)?;
            let version = content.trim().parse().unwrap_or(0);
            return Err(StoreError::Dirty(version));
        }

        let mut files: Vec<(u64, String)> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if let Some(version) = migration_version(&name) {
                files.push((version, name));
            }
        }
        files.sort();

        let current = self.state.lock().migration_version;
        let mut applied = Vec::new();
        let mut version = current.unwrap_or(0);
        for (file_version, name) in files {
            if current.is_some_and(|v| file_version <= v) {
                continue;
            }
            let sql = fs::read_to_string(dir.join(&name))?;
            if sql.trim().is_empty() {
                fs::write(&dirty, file_version.to_string())?;
                return Err(StoreError::Migration(format!("{name} is empty")));
            }
            debug!(file = %name, "applying migration");
            version = file_version;
            applied.push(name);
        }

        if applied.is_empty() {
            return Ok(MigrationOutcome::NoChange);
        }
        self.state.lock().migration_version = Some(version);
        info!(count = applied.len(), version, "migrations applied");
        Ok(MigrationOutcome::Applied {
            files: applied,
            version,
        })
    }
}
