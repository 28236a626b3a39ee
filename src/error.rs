//! Crate-level error aggregating every subsystem.

use crate::bus::{BusError, CodecError};
use crate::config::ConfigError;
use crate::oms::OmsError;
use crate::orderbook::OrderBookError;
use crate::pollers::PollerError;
use crate::store::StoreError;
use thiserror::Error;

/// Exit code for configuration, migration and bootstrap failures.
pub const EXIT_CONFIG: i32 = 1;
/// Exit code for failures after startup.
pub const EXIT_RUNTIME: i32 = 2;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Oms(#[from] OmsError),

    #[error(transparent)]
    OrderBook(#[from] OrderBookError),

    #[error(transparent)]
    Poller(#[from] PollerError),

    /// Startup cannot continue.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl CoreError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::Config(_) | CoreError::Fatal(_) => EXIT_CONFIG,
            CoreError::Store(StoreError::Migration(_) | StoreError::Dirty(_)) => EXIT_CONFIG,
            _ => EXIT_RUNTIME,
        }
    }
}
