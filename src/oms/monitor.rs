//! Background OMS workers: the active-order gauge and index compaction.

use super::registry::Oms;
use crate::orderbook::MarketId;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, trace};

/// Gauge holding the live order count per market.
pub const ACTIVE_ORDERS_GAUGE: &str = "active_orders";

/// Publishes the current counts. Markets reported before but empty now are
/// set to zero. Returns the markets reported this round.
pub fn export_active_orders(oms: &Oms, reported: &HashSet<MarketId>) -> HashSet<MarketId> {
    let counts = oms.market_counts();
    let mut current = HashSet::with_capacity(counts.len());
    for (market, count) in counts {
        metrics::gauge!(ACTIVE_ORDERS_GAUGE, "market" => market.clone()).set(count as f64);
        current.insert(market);
    }
    for market in reported.difference(&current) {
        metrics::gauge!(ACTIVE_ORDERS_GAUGE, "market" => market.clone()).set(0.0);
    }
    trace!(markets = current.len(), "active orders exported");
    current
}

/// Exports the gauge every `period` until `shutdown` flips.
pub async fn run_monitor(oms: Arc<Oms>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    info!(?period, "active order monitor started");
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut reported = HashSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => reported = export_active_orders(&oms, &reported),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("active order monitor stopped");
}

/// Compacts the OMS indexes every `period` until `shutdown` flips.
pub async fn run_compaction(oms: Arc<Oms>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    info!(?period, "oms compaction started");
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                oms.compact();
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("oms compaction stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::{Order, Side};

    #[test]
    fn test_vanished_markets_are_tracked() {
        let oms = Oms::new();
        oms.save_order(Order::limit(1, "btcusdt", Side::Buy, 1, 1));
        oms.save_order(Order::limit(2, "ethusdt", Side::Buy, 1, 1));
        let reported = export_active_orders(&oms, &HashSet::new());
        assert_eq!(reported.len(), 2);

        oms.remove_order(2);
        let reported = export_active_orders(&oms, &reported);
        assert!(reported.contains("btcusdt"));
        assert!(!reported.contains("ethusdt"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_workers_stop_on_shutdown() {
        let oms = Arc::new(Oms::new());
        let (stop, shutdown) = watch::channel(false);
        let monitor = tokio::spawn(run_monitor(
            Arc::clone(&oms),
            Duration::from_secs(1),
            shutdown.clone(),
        ));
        let compaction = tokio::spawn(run_compaction(
            Arc::clone(&oms),
            Duration::from_secs(300),
            shutdown,
        ));
        tokio::time::sleep(Duration::from_secs(301)).await;
        stop.send(true).expect("signal");
        assert!(monitor.await.is_ok());
        assert!(compaction.await.is_ok());
    }
}
