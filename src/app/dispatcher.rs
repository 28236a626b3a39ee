//! Inbound command routing.
//!
//! Commands arrive on the `orders` and `cancel_orders` topics. Each market
//! has one worker task that owns its [`TradingEngine`], so commands of one
//! market are matched in arrival order. The worker hands every command's
//! events to the [`EventApplier`] before it takes the next command.

use crate::bus::{
    BalanceTrigger, BalanceUpdate, EventSerializer, MessageBus, SyncEvent, SyncSender,
    split_frames,
};
use crate::config::Topics;
use crate::market_data::LastPriceTracker;
use crate::oms::{Oms, OmsError};
use crate::orderbook::{ErrorCode, Event, EventType, MarketId, Order, OrderStatus, TradingEngine};
use crate::sequence::SequenceGenerator;
use crate::utils::current_time_millis;
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Commands buffered per market worker.
const MARKET_QUEUE: usize = 1_024;

/// Applies engine output to the OMS, the last-price tracker and the
/// outbound queues.
pub struct EventApplier {
    oms: Arc<Oms>,
    last_prices: Arc<LastPriceTracker>,
    sync: SyncSender,
    balance: BalanceTrigger,
}

impl fmt::Debug for EventApplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventApplier")
            .field("live_orders", &self.oms.len())
            .finish()
    }
}

impl EventApplier {
    pub fn new(
        oms: Arc<Oms>,
        last_prices: Arc<LastPriceTracker>,
        sync: SyncSender,
        balance: BalanceTrigger,
    ) -> Self {
        Self {
            oms,
            last_prices,
            sync,
            balance,
        }
    }

    /// Records the outcome of `command`.
    ///
    /// An accepted new order is saved to the OMS before its events are
    /// applied. A rejected command stores nothing. An activated stop is
    /// persisted with its stop cleared so a restart restores it as a plain
    /// order.
    pub async fn apply(&self, command: &Order, events: &[Event]) {
        let mut accounts = BTreeSet::new();
        if let Some(Event::Error { code, order }) = events.iter().find(|e| e.is_error()) {
            debug!(order_id = order.id, market = %order.market_id, %code, "command rejected");
            return;
        }
        if command.event_type == EventType::NewOrder {
            self.oms.save_order(command.clone());
            accounts.insert((command.owner_id, command.sub_account));
        }

        for event in events {
            match event {
                Event::Trade(trade) => {
                    self.last_prices.record_trade(trade);
                    let (ask, bid) =
                        self.oms
                            .get_trade_orders(&trade.market_id, trade.ask_id, trade.bid_id);
                    for side in [ask, bid].into_iter().flatten() {
                        accounts.insert((side.owner_id, side.sub_account));
                    }
                    self.sync.send(SyncEvent::save_trade(trade));
                    for revenue in SyncEvent::revenues(trade) {
                        self.sync.send(revenue);
                    }
                }
                Event::OrderStatusChange(order) => {
                    if order.status == OrderStatus::Cancelled {
                        accounts.insert((order.owner_id, order.sub_account));
                    }
                    self.update(order);
                }
                Event::OrderActivated(order) => {
                    match self.oms.update_custom_order(order.clone()) {
                        Ok(true) => self.sync.send(SyncEvent::update_order(order)),
                        Ok(false) => {}
                        Err(err) => {
                            warn!(order_id = order.id, error = %err, "activated stop not in oms");
                        }
                    }
                }
                Event::Error { .. } => {}
            }
        }

        for (user_id, sub_account) in accounts {
            self.balance
                .trigger(BalanceUpdate::new(user_id, sub_account))
                .await;
        }
    }

    fn update(&self, order: &Order) {
        match self.oms.update_order(order) {
            Ok(_) => {}
            Err(OmsError::NotFound { .. }) if !order.is_terminal() => {
                self.oms.save_order(order.clone());
            }
            Err(err) => warn!(order_id = order.id, error = %err, "oms update failed"),
        }
    }
}

/// Owns one market's engine and serializes its commands.
async fn market_worker(
    mut engine: TradingEngine,
    applier: Arc<EventApplier>,
    mut commands: mpsc::Receiver<Order>,
) -> TradingEngine {
    info!(market = engine.market_id(), "market worker started");
    while let Some(command) = commands.recv().await {
        let events = engine.process_event(command.clone());
        trace!(market = engine.market_id(), order_id = command.id, events = events.len(), "command processed");
        applier.apply(&command, &events).await;
    }
    info!(market = engine.market_id(), "market worker stopped");
    engine
}

/// Routes commands to per-market workers.
#[derive(Debug)]
pub struct Dispatcher {
    workers: HashMap<MarketId, mpsc::Sender<Order>>,
    handles: Vec<JoinHandle<TradingEngine>>,
    applier: Arc<EventApplier>,
    sequences: Arc<SequenceGenerator>,
}

impl Dispatcher {
    /// Spawns one worker per engine.
    pub fn spawn(
        engines: Vec<TradingEngine>,
        applier: Arc<EventApplier>,
        sequences: Arc<SequenceGenerator>,
    ) -> Self {
        let mut workers = HashMap::with_capacity(engines.len());
        let mut handles = Vec::with_capacity(engines.len());
        for engine in engines {
            let (tx, rx) = mpsc::channel(MARKET_QUEUE);
            workers.insert(engine.market_id().to_string(), tx);
            handles.push(tokio::spawn(market_worker(engine, Arc::clone(&applier), rx)));
        }
        Self {
            workers,
            handles,
            applier,
            sequences,
        }
    }

    /// Markets with a worker.
    pub fn markets(&self) -> Vec<MarketId> {
        let mut markets: Vec<_> = self.workers.keys().cloned().collect();
        markets.sort_unstable();
        markets
    }

    /// Assigns an id to new orders that lack one and queues the command on
    /// its market's worker.
    pub async fn dispatch(&self, mut order: Order) {
        if order.event_type == EventType::NewOrder && order.id == 0 {
            order.id = self.sequences.next_order_id();
        }
        if order.created_at == 0 {
            order.created_at = current_time_millis();
            order.updated_at = order.created_at;
        }
        let Some(worker) = self.workers.get(&order.market_id) else {
            warn!(
                market = %order.market_id,
                order_id = order.id,
                code = %ErrorCode::UnknownMarket,
                "order rejected"
            );
            return;
        };
        if worker.send(order).await.is_err() {
            warn!("market worker stopped, command dropped");
        }
    }

    /// Decodes every frame of `message` and dispatches it.
    pub async fn dispatch_message(&self, message: &Bytes, serializer: &dyn EventSerializer) {
        let frames = match split_frames(message) {
            Ok(frames) => frames,
            Err(err) => {
                warn!(error = %err, "malformed command message");
                return;
            }
        };
        for frame in frames {
            match serializer.deserialize_order(&frame) {
                Ok(order) => self.dispatch(order).await,
                Err(err) => warn!(error = %err, "undecodable command"),
            }
        }
    }

    /// Consumes both command topics until `shutdown` flips, then stops the
    /// workers once their queues are drained and returns their engines.
    pub async fn run(
        self,
        bus: Arc<dyn MessageBus>,
        topics: &Topics,
        serializer: Arc<dyn EventSerializer>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<Vec<TradingEngine>, crate::bus::BusError> {
        let mut orders = bus.subscribe(&topics.orders).await?;
        let mut cancels = bus.subscribe(&topics.cancel_orders).await?;
        info!(markets = self.workers.len(), "dispatcher started");

        loop {
            tokio::select! {
                Some(message) = orders.next() => {
                    self.dispatch_message(&message, serializer.as_ref()).await;
                }
                Some(message) = cancels.next() => {
                    self.dispatch_message(&message, serializer.as_ref()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                else => break,
            }
        }

        info!("dispatcher stopping");
        Ok(self.shutdown().await)
    }

    /// Closes every queue and waits for the workers.
    pub async fn shutdown(self) -> Vec<TradingEngine> {
        let Self {
            workers, handles, ..
        } = self;
        drop(workers);
        let mut engines = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(engine) => engines.push(engine),
                Err(err) => warn!(error = %err, "market worker failed"),
            }
        }
        engines
    }

    pub fn applier(&self) -> &Arc<EventApplier> {
        &self.applier
    }
}
