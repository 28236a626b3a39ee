//! Root composition: builds every component once, starts the workers and
//! stops them on the shutdown signal.

pub mod dispatcher;

pub use dispatcher::{Dispatcher, EventApplier};

use crate::bus::{
    BalanceTrigger, BalanceUpdatePublisher, EventSerializer, MessageBus, SyncPublisher,
    SyncSender,
};
use crate::cache::Caches;
use crate::config::Config;
use crate::error::CoreError;
use crate::market_data::{DepthCache, LastPriceTracker};
use crate::oms::{Oms, run_compaction, run_monitor};
use crate::orderbook::{MarketId, Order, OrderBook, TradingEngine};
use crate::pollers::{CrossRateClient, Scheduler, reference_jobs, run_cross_rate_poller};
use crate::sequence::{SequenceGenerator, SequenceOffsets};
use crate::store::{Migrator, MigrationOutcome, Store};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Applies pending migrations. `NoChange` counts as success.
pub fn run_migrations(migrator: &dyn Migrator, dir: &Path) -> Result<MigrationOutcome, CoreError> {
    let outcome = migrator.migrate_up(dir)?;
    match &outcome {
        MigrationOutcome::NoChange => info!(dir = %dir.display(), "no migrations to apply"),
        MigrationOutcome::Applied { files, version } => {
            info!(count = files.len(), version, "migrations applied")
        }
    }
    Ok(outcome)
}

/// Every long-lived component, built once at startup.
pub struct Exchange {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub bus: Arc<dyn MessageBus>,
    pub serializer: Arc<dyn EventSerializer>,
    pub sequences: Arc<SequenceGenerator>,
    pub oms: Arc<Oms>,
    pub caches: Arc<Caches>,
    pub last_prices: Arc<LastPriceTracker>,
    pub depth: Arc<DepthCache>,
    engines: Vec<TradingEngine>,
    sync: SyncSender,
    sync_publisher: SyncPublisher,
    balance: BalanceTrigger,
    balance_publisher: BalanceUpdatePublisher,
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("markets", &self.markets())
            .field("live_orders", &self.oms.len())
            .field("bus", &self.bus)
            .finish()
    }
}

impl Exchange {
    /// Loads reference data, the id sequences and the live orders, and
    /// rebuilds one book per market. Any failure is fatal.
    pub fn bootstrap(
        config: Config,
        store: Arc<dyn Store>,
        bus: Arc<dyn MessageBus>,
    ) -> Result<Self, CoreError> {
        let caches = Arc::new(Caches::default());
        let mut markets = store.load_markets()?;
        if markets.is_empty() {
            markets = config.markets.clone();
        }
        caches.markets.set_all(markets, &caches.cross_rates);
        caches.user_fees.set_all(store.load_user_fees()?);

        let sequences = Arc::new(SequenceGenerator::bootstrap(
            store.as_ref(),
            SequenceOffsets {
                order_offset: config.sequence.order_offset,
                trade_offset: config.sequence.trade_offset,
            },
        )?);

        let orders = store.load_active_orders()?;
        let mut by_market: HashMap<MarketId, Vec<Order>> = HashMap::new();
        for order in &orders {
            by_market
                .entry(order.market_id.clone())
                .or_default()
                .push(order.clone());
        }

        let mut engines = Vec::new();
        for market in caches.markets.all() {
            let book = OrderBook::new(&market.id, Arc::clone(&sequences))
                .with_fees(market.fees)
                .with_user_fees(Arc::clone(&caches.user_fees));
            let mut engine = TradingEngine::from_book(book);
            let report = engine.load_market(
                &market.id,
                by_market.remove(&market.id).unwrap_or_default(),
                0,
                sequences.last_trade_id(),
            );
            info!(
                market = %market.id,
                resting = report.resting,
                armed = report.armed,
                skipped = report.skipped,
                "market loaded"
            );
            engines.push(engine);
        }
        for (market, orders) in &by_market {
            warn!(market = %market, orders = orders.len(), "live orders for unconfigured market");
        }
        if engines.is_empty() {
            return Err(CoreError::Fatal("no markets configured".to_string()));
        }

        let serializer = config.bus.format.serializer();
        let (sync_publisher, sync) = SyncPublisher::new(
            Arc::clone(&bus),
            &config.bus.topics.sync_data,
            Arc::clone(&serializer),
        );
        let (balance_publisher, balance) = BalanceUpdatePublisher::new(
            Arc::clone(&bus),
            &config.bus.topics.balance_update_trigger,
            Arc::clone(&serializer),
            config.balance.capacity,
        );

        let oms = Arc::new(Oms::with_sync(sync.clone()));
        let restored = oms.restore(orders);
        info!(orders = restored, "oms restored");

        Ok(Self {
            last_prices: Arc::new(LastPriceTracker::with_store(Arc::clone(&store))),
            depth: Arc::new(DepthCache::new()),
            config,
            store,
            bus,
            serializer,
            sequences,
            oms,
            caches,
            engines,
            sync,
            sync_publisher,
            balance,
            balance_publisher,
        })
    }

    /// Markets with a book.
    pub fn markets(&self) -> Vec<MarketId> {
        self.engines
            .iter()
            .map(|engine| engine.market_id().to_string())
            .collect()
    }

    /// Spawns every worker. They run until `shutdown` flips.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> Result<Running, CoreError> {
        let config = &self.config;
        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        // Flushing workers stop after the dispatcher so the last commands'
        // ids and events are persisted.
        let (drain, drain_signal) = watch::channel(false);
        let mut flushers: Vec<JoinHandle<()>> = Vec::new();

        flushers.push(tokio::spawn(Arc::clone(&self.sequences).run_checkpointer(
            Arc::clone(&self.store),
            config.sequence.checkpoint_interval(),
            drain_signal.clone(),
        )));
        workers.push(tokio::spawn(run_monitor(
            Arc::clone(&self.oms),
            config.oms.monitor_interval(),
            shutdown.clone(),
        )));
        workers.push(tokio::spawn(run_compaction(
            Arc::clone(&self.oms),
            config.oms.compaction_interval(),
            shutdown.clone(),
        )));
        workers.push(tokio::spawn(Arc::clone(&self.depth).run(
            Arc::clone(&self.oms),
            Arc::clone(&self.caches.markets),
            Arc::clone(&self.last_prices),
            config.depth.refresh_interval(),
            shutdown.clone(),
        )));
        flushers.push(tokio::spawn(self.sync_publisher.run(
            config.sync.flush_interval(),
            drain_signal.clone(),
        )));
        flushers.push(tokio::spawn(self.balance_publisher.run(
            config.balance.flush_interval(),
            drain_signal,
        )));

        if config.cross_rates.enabled {
            let client = CrossRateClient::new(
                &config.cross_rates.url_coin_values,
                &config.cross_rates.url_last_prices,
                config.cross_rates.timeout(),
            )?;
            workers.push(tokio::spawn(run_cross_rate_poller(
                client,
                Arc::clone(&self.caches.markets),
                Arc::clone(&self.caches.cross_rates),
                config.cross_rates.interval(),
                shutdown.clone(),
            )));
        }

        let mut scheduler = Scheduler::new();
        reference_jobs(&mut scheduler, Arc::clone(&self.store), Arc::clone(&self.caches));
        workers.extend(scheduler.spawn(&config.cron, &shutdown)?);

        let applier = Arc::new(EventApplier::new(
            Arc::clone(&self.oms),
            Arc::clone(&self.last_prices),
            self.sync,
            self.balance,
        ));
        let dispatcher = Dispatcher::spawn(self.engines, applier, Arc::clone(&self.sequences));
        let bus = Arc::clone(&self.bus);
        let topics = config.bus.topics.clone();
        let serializer = Arc::clone(&self.serializer);
        let dispatch = tokio::spawn(async move {
            match dispatcher.run(bus, &topics, serializer, shutdown).await {
                Ok(engines) => engines,
                Err(err) => {
                    error!(error = %err, "dispatcher failed to subscribe");
                    Vec::new()
                }
            }
        });

        info!(
            workers = workers.len() + flushers.len() + 1,
            "exchange core started"
        );
        Ok(Running {
            workers,
            flushers,
            drain,
            dispatch,
            oms: self.oms,
            depth: self.depth,
            last_prices: self.last_prices,
        })
    }
}

/// Handles of a started [`Exchange`].
#[derive(Debug)]
pub struct Running {
    workers: Vec<JoinHandle<()>>,
    flushers: Vec<JoinHandle<()>>,
    drain: watch::Sender<bool>,
    dispatch: JoinHandle<Vec<TradingEngine>>,
    pub oms: Arc<Oms>,
    pub depth: Arc<DepthCache>,
    pub last_prices: Arc<LastPriceTracker>,
}

impl Running {
    /// Waits for every worker after the shutdown signal and returns the
    /// engines in their final state.
    ///
    /// The dispatcher is awaited first. Only then are the publishers and the
    /// sequence checkpointer told to flush and stop.
    pub async fn join(self) -> Vec<TradingEngine> {
        let engines = match self.dispatch.await {
            Ok(engines) => engines,
            Err(err) => {
                warn!(error = %err, "dispatcher task failed");
                Vec::new()
            }
        };
        let _ = self.drain.send(true);
        for worker in self.workers.into_iter().chain(self.flushers) {
            if let Err(err) = worker.await {
                warn!(error = %err, "worker task failed");
            }
        }
        info!("exchange core stopped");
        engines
    }
}
