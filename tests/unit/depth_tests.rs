use exchange_core::app::EventApplier;
use exchange_core::bus::{
    BalanceUpdatePublisher, MemoryBus, MessageBus, SyncEvent, SyncModel, SyncSender, WireFormat,
};
use exchange_core::cache::{CrossRatesCache, Market, MarketsCache};
use exchange_core::decimal::ONE;
use exchange_core::market_data::{DepthCache, LastPriceTracker};
use exchange_core::oms::Oms;
use exchange_core::orderbook::{Order, Side, StopKind, TradingEngine};
use exchange_core::sequence::SequenceGenerator;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;

    struct Pipeline {
        engine: TradingEngine,
        applier: EventApplier,
        oms: Arc<Oms>,
        last_prices: Arc<LastPriceTracker>,
        markets: MarketsCache,
        sync_rx: crossbeam::channel::Receiver<SyncEvent>,
        _balance: BalanceUpdatePublisher,
    }

    impl Pipeline {
        fn new() -> Self {
            let (sync, sync_rx) = SyncSender::channel();
            let oms = Arc::new(Oms::with_sync(sync.clone()));
            let last_prices = Arc::new(LastPriceTracker::new());
            let bus: Arc<dyn MessageBus> = Arc::new(MemoryBus::new());
            let (balance, trigger) = BalanceUpdatePublisher::new(
                bus,
                "balance_update_trigger",
                WireFormat::Json.serializer(),
                64,
            );
            let markets = MarketsCache::new();
            markets.set_all(
                vec![Market {
                    price_precision: 2,
                    volume_precision: 3,
                    ..Market::new("btcusdt", "btc", "usdt")
                }],
                &CrossRatesCache::new(),
            );
            Self {
                engine: TradingEngine::new("btcusdt", Arc::new(SequenceGenerator::new(0, 0))),
                applier: EventApplier::new(
                    Arc::clone(&oms),
                    Arc::clone(&last_prices),
                    sync,
                    trigger,
                ),
                oms,
                last_prices,
                markets,
                sync_rx,
                _balance: balance,
            }
        }

        async fn submit(&mut self, order: Order) {
            let events = self.engine.process_event(order.clone());
            self.applier.apply(&order, &events).await;
        }

        fn order_rows(&self, id: u64) -> Vec<SyncEvent> {
            self.sync_rx
                .try_iter()
                .filter(|row| row.model == SyncModel::Orders && row.get_u64("id") == Some(id))
                .collect()
        }

        fn depth(&self) -> DepthCache {
            let cache = DepthCache::new();
            cache.refresh(&self.oms, &self.markets, &self.last_prices);
            cache
        }
    }

    fn pv(price: &str, volume: &str) -> [String; 2] {
        [price.to_string(), volume.to_string()]
    }

    #[tokio::test]
    async fn test_depth_tracks_fills_and_cancels() {
        let mut pipeline = Pipeline::new();
        pipeline
            .submit(Order::limit(1, "btcusdt", Side::Sell, 101 * ONE, 2 * ONE).with_owner(7))
            .await;
        pipeline
            .submit(Order::limit(2, "btcusdt", Side::Sell, 102 * ONE, ONE).with_owner(7))
            .await;
        pipeline
            .submit(Order::limit(3, "btcusdt", Side::Buy, 99 * ONE, ONE).with_owner(8))
            .await;
        pipeline
            .submit(Order::limit(4, "btcusdt", Side::Buy, 101 * ONE, ONE / 2).with_owner(8))
            .await;

        let l2 = pipeline.depth().get_level2("btcusdt", None).expect("depth");
        assert_eq!(l2.asks, vec![pv("101.00", "1.500"), pv("102.00", "1.000")]);
        assert_eq!(l2.bids, vec![pv("99.00", "1.000")]);
        assert_eq!(l2.last_price, "101.00");
        assert_eq!(l2.last_volume, "0.500");

        let cancel = Order::limit(3, "btcusdt", Side::Buy, 99 * ONE, ONE).into_cancel();
        pipeline.submit(cancel).await;
        let l1 = pipeline.depth().get_level1("btcusdt").expect("depth");
        assert_eq!(l1.bid, None);
        assert_eq!(l1.ask, Some(pv("101.00", "1.500")));
    }

    #[tokio::test]
    async fn test_armed_stops_stay_out_of_depth() {
        let mut pipeline = Pipeline::new();
        pipeline
            .submit(
                Order::limit(1, "btcusdt", Side::Buy, 120 * ONE, ONE)
                    .with_owner(3)
                    .with_stop(StopKind::Entry, 110 * ONE),
            )
            .await;
        assert!(pipeline.oms.get_order_by_id(1).is_ok());

        let l2 = pipeline.depth().get_level2("btcusdt", None).expect("depth");
        assert!(l2.bids.is_empty());
        assert!(l2.asks.is_empty());
    }

    #[tokio::test]
    async fn test_activated_stop_is_persisted_without_stop() {
        let mut pipeline = Pipeline::new();
        pipeline
            .submit(Order::limit(1, "btcusdt", Side::Buy, 110 * ONE, ONE).with_owner(3))
            .await;
        pipeline
            .submit(
                Order::limit(2, "btcusdt", Side::Buy, 100 * ONE, ONE)
                    .with_owner(3)
                    .with_stop(StopKind::Entry, 110 * ONE),
            )
            .await;
        pipeline
            .submit(Order::limit(3, "btcusdt", Side::Sell, 110 * ONE, ONE).with_owner(4))
            .await;

        let rows = pipeline.order_rows(2);
        let last = rows.last().expect("order 2 persisted");
        assert_eq!(last.get_str("stop"), Some("none"));
        assert_eq!(last.get_str("status"), Some("pending"));

        let stored = pipeline.oms.get_order_by_id(2).expect("live order");
        assert_eq!(stored.stop, StopKind::None);
        let mut restarted = TradingEngine::new("btcusdt", Arc::new(SequenceGenerator::new(0, 0)));
        let report = restarted.load_market("btcusdt", vec![stored], 0, 0);
        assert_eq!(report.resting, 1);
        assert_eq!(restarted.book().best_bid(), Some(100 * ONE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refresh() {
        let oms = Arc::new(Oms::new());
        let markets = Arc::new(MarketsCache::new());
        markets.set_all(vec![Market::new("ethusdt", "eth", "usdt")], &CrossRatesCache::new());
        let last_prices = Arc::new(LastPriceTracker::new());
        let cache = Arc::new(DepthCache::new());
        let (stop, shutdown) = tokio::sync::watch::channel(false);
        let worker = tokio::spawn(Arc::clone(&cache).run(
            Arc::clone(&oms),
            markets,
            last_prices,
            Duration::from_millis(250),
            shutdown,
        ));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.get_level2("ethusdt", None).map(|d| d.asks.len()), Some(0));

        oms.save_order(Order::limit(1, "ethusdt", Side::Sell, 3 * ONE, ONE));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(cache.get_level2("ethusdt", None).map(|d| d.asks.len()), Some(1));

        stop.send(true).expect("updater alive");
        worker.await.expect("updater task");
    }
}
