//! `exchange-core` service binary.
//!
//! Exit codes: 0 success, 1 configuration or migration failure, 2 fatal
//! runtime failure.

use clap::{Parser, Subcommand};
use exchange_core::app::{Exchange, run_migrations};
use exchange_core::bus::{MemoryBus, MessageBus};
use exchange_core::config::{BusBackend, Config, LogConfig};
use exchange_core::error::{CoreError, EXIT_CONFIG};
use exchange_core::store::{MemoryStore, StoreError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "exchange-core", version, about = "Exchange trading core")]
struct Cli {
    /// YAML configuration file.
    #[arg(long, short, default_value = "config.yaml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply migrations, then run the service until interrupted.
    Start,
    /// Apply forward migrations and exit.
    Migrate {
        /// Directory of `NNNN_name.up.sql` files.
        #[arg(long, default_value = "./db/migrations")]
        dir: PathBuf,
    },
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let registry = tracing_subscriber::registry().with(filter);
    if log.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX))
}

async fn connect_bus(config: &Config) -> Result<Arc<dyn MessageBus>, CoreError> {
    match config.bus.backend {
        BusBackend::Memory => Ok(Arc::new(MemoryBus::with_capacity(config.bus.capacity))),
        #[cfg(feature = "nats")]
        BusBackend::Nats => Ok(Arc::new(
            exchange_core::bus::nats::NatsBus::connect(&config.bus.brokers).await?,
        )),
        #[cfg(not(feature = "nats"))]
        BusBackend::Nats => Err(CoreError::Fatal(
            "nats backend requires the `nats` feature".to_string(),
        )),
    }
}

async fn start(config: Config) -> Result<(), CoreError> {
    let store = Arc::new(MemoryStore::new());
    run_migrations(store.as_ref(), &config.database.migrations_dir)?;

    let bus = connect_bus(&config).await?;
    let exchange = Exchange::bootstrap(config, store, bus)?;
    let (stop, shutdown) = watch::channel(false);
    let running = exchange.start(shutdown)?;

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "cannot listen for the interrupt signal");
    }
    info!("shutdown requested");
    let _ = stop.send(true);
    running.join().await;
    Ok(())
}

fn migrate(dir: PathBuf) -> Result<(), CoreError> {
    let store = MemoryStore::new();
    match run_migrations(&store, &dir) {
        Err(CoreError::Store(StoreError::Dirty(version))) => {
            error!(version, "database is dirty, fix migration {version} manually");
            Err(StoreError::Dirty(version).into())
        }
        other => other.map(|_| ()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            init_tracing(&LogConfig::default());
            error!(error = %err, path = %cli.config.display(), "cannot load configuration");
            return exit_code(EXIT_CONFIG);
        }
    };
    init_tracing(&config.log);

    let result = match cli.command {
        Command::Start => start(config).await,
        Command::Migrate { dir } => migrate(dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "exchange core failed");
            exit_code(err.exit_code())
        }
    }
}
