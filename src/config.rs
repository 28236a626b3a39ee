//! Service configuration.
//!
//! One YAML document, deserialized into [`Config`]. Environment variables
//! named `CFG_<PATH>` override single keys; path segments are separated by
//! `__` and matched lower case, so `CFG_SEQUENCE__ORDER_OFFSET=10` sets
//! `sequence.order_offset`. Numeric segments index into lists.

use crate::bus::WireFormat;
use crate::cache::Market;
use crate::pollers::Schedule;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Prefix of overriding environment variables.
pub const ENV_PREFIX: &str = "CFG_";

/// Separator between path segments in an override name.
pub const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("cannot apply override {key}: {message}")]
    Override { key: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub writer: String,
    pub reader: String,
    pub reader_admin: String,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("./db/migrations")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusBackend {
    #[default]
    Memory,
    Nats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Topics {
    pub sync_data: String,
    pub balance_update_trigger: String,
    pub orders: String,
    pub cancel_orders: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            sync_data: "sync_data".to_string(),
            balance_update_trigger: "balance_update_trigger".to_string(),
            orders: "orders".to_string(),
            cancel_orders: "cancel_orders".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub brokers: Vec<String>,
    #[serde(default)]
    pub topics: Topics,
    #[serde(default)]
    pub backend: BusBackend,
    #[serde(default)]
    pub format: WireFormat,
    /// Per-topic buffer of the in-memory backend.
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

fn default_bus_capacity() -> usize {
    crate::bus::memory::DEFAULT_TOPIC_CAPACITY
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossRatesConfig {
    pub url_coin_values: String,
    pub url_last_prices: String,
    #[serde(default = "default_cross_rate_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_http_timeout")]
    pub timeout_ms: u64,
    /// Disables the HTTP poller, e.g. in offline setups.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_cross_rate_interval() -> u64 {
    200
}

fn default_http_timeout() -> u64 {
    2_000
}

fn default_true() -> bool {
    true
}

impl CrossRatesConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One scheduled job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronConfig {
    pub id: String,
    pub schedule: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceConfig {
    #[serde(default)]
    pub order_offset: u64,
    #[serde(default)]
    pub trade_offset: u64,
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_ms: u64,
}

fn default_checkpoint_interval() -> u64 {
    1_000
}

impl SequenceConfig {
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_millis(self.checkpoint_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OmsConfig {
    pub compaction_interval_secs: u64,
    pub monitor_interval_ms: u64,
}

impl Default for OmsConfig {
    fn default() -> Self {
        Self {
            compaction_interval_secs: 300,
            monitor_interval_ms: 1_000,
        }
    }
}

impl OmsConfig {
    pub fn compaction_interval(&self) -> Duration {
        Duration::from_secs(self.compaction_interval_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthConfig {
    pub refresh_interval_ms: u64,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 250,
        }
    }
}

impl DepthConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    pub capacity: usize,
    pub flush_interval_ms: u64,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            capacity: crate::bus::balance::DEFAULT_BALANCE_CAPACITY,
            flush_interval_ms: 200,
        }
    }
}

impl BalanceConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub flush_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 100,
        }
    }
}

impl SyncConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub json: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: "info".to_string(),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub bus: BusConfig,
    pub cross_rates: CrossRatesConfig,
    pub cron: Vec<CronConfig>,
    pub sequence: SequenceConfig,
    #[serde(default)]
    pub oms: OmsConfig,
    #[serde(default)]
    pub depth: DepthConfig,
    #[serde(default)]
    pub balance: BalanceConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    /// Markets served until the market poller first runs.
    #[serde(default)]
    pub markets: Vec<Market>,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Reads `path` and applies the process environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw, std::env::vars())
    }

    /// Parses `raw` and applies the `CFG_` entries among `vars`.
    pub fn from_yaml(
        raw: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ConfigError> {
        let mut root: Value = serde_yaml::from_str(raw)?;
        if root.is_null() {
            root = Value::Mapping(Mapping::new());
        }
        for (key, value) in vars {
            if let Some(path) = key.strip_prefix(ENV_PREFIX) {
                apply_override(&mut root, &key, path, &value)?;
            }
        }
        let config: Config = serde_yaml::from_value(root)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks what serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for job in &self.cron {
            job.schedule
                .parse::<Schedule>()
                .map_err(|e| ConfigError::Invalid(format!("cron job {}: {e}", job.id)))?;
        }
        if self.bus.backend == BusBackend::Nats && self.bus.brokers.is_empty() {
            return Err(ConfigError::Invalid(
                "bus.brokers is empty for the nats backend".to_string(),
            ));
        }
        let topics = &self.bus.topics;
        for (name, topic) in [
            ("sync_data", &topics.sync_data),
            ("balance_update_trigger", &topics.balance_update_trigger),
            ("orders", &topics.orders),
            ("cancel_orders", &topics.cancel_orders),
        ] {
            if topic.is_empty() {
                return Err(ConfigError::Invalid(format!("bus.topics.{name} is empty")));
            }
        }
        if self.sequence.checkpoint_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sequence.checkpoint_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sets the node at `path` (`a__b__0__c`) to `value` parsed as a YAML
/// scalar, creating missing mapping keys.
fn apply_override(root: &mut Value, key: &str, path: &str, value: &str) -> Result<(), ConfigError> {
    let fail = |message: &str| ConfigError::Override {
        key: key.to_string(),
        message: message.to_string(),
    };
    let segments: Vec<String> = path
        .split(ENV_SEPARATOR)
        .map(str::to_lowercase)
        .collect();
    if segments.iter().any(String::is_empty) {
        return Err(fail("empty path segment"));
    }

    let mut node = root;
    for segment in &segments {
        if node.is_null() {
            *node = Value::Mapping(Mapping::new());
        }
        node = match node {
            Value::Sequence(items) => {
                let index: usize = segment
                    .parse()
                    .map_err(|_| fail("list segment is not an index"))?;
                items.get_mut(index).ok_or_else(|| fail("index out of range"))?
            }
            Value::Mapping(map) => descend(map, segment),
            _ => return Err(fail("path crosses a scalar")),
        };
    }

    *node = serde_yaml::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok(())
}

fn descend<'a>(map: &'a mut Mapping, segment: &str) -> &'a mut Value {
    map.entry(Value::String(segment.to_string()))
        .or_insert(Value::Null)
}
