use bytes::Bytes;
use exchange_core::app::{Exchange, run_migrations};
use exchange_core::bus::{
    BalanceUpdate, EventSerializer, JsonEventSerializer, MemoryBus, MessageBus, Subscription,
    SyncCommand, SyncEvent, SyncModel, encode_frame, split_frames,
};
use exchange_core::config::Config;
use exchange_core::decimal::ONE;
use exchange_core::error::EXIT_CONFIG;
use exchange_core::orderbook::{Order, OrderStatus, Side};
use exchange_core::store::{
    MemoryStore, MigrationOutcome, ORDERS_SEQUENCE, Store, StoreError, TRADES_SEQUENCE,
};
use exchange_core::CoreError;
use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
database:
  writer: postgres://writer
  reader: postgres://reader
  reader_admin: postgres://admin
bus:
  backend: memory
cross_rates:
  url_coin_values: http://127.0.0.1:9/coins
  url_last_prices: http://127.0.0.1:9/last
  enabled: false
cron: []
sequence:
  checkpoint_interval_ms: 50
sync:
  flush_interval_ms: 10
balance:
  capacity: 100
  flush_interval_ms: 10
markets:
  - id: btcusdt
    base_coin: btc
    quote_coin: usdt
    fees:
      maker_fee_bps: 10
      taker_fee_bps: 20
"#;

    fn config() -> Config {
        Config::from_yaml(CONFIG, Vec::new()).expect("config")
    }

    /// Store holding one resting ask of user 1.
    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.set_sequence_value(ORDERS_SEQUENCE, 100);
        store.insert_order(Order::limit(50, "btcusdt", Side::Sell, 100 * ONE, ONE).with_owner(1));
        store
    }

    fn encode(orders: &[Order]) -> Bytes {
        let serializer = JsonEventSerializer::new();
        let mut message = Vec::new();
        for order in orders {
            let body = serializer.serialize_order(order).expect("serialize");
            message.extend_from_slice(&encode_frame(&body).expect("frame"));
        }
        Bytes::from(message)
    }

    /// Every message already queued on `subscription`.
    async fn drain(subscription: &mut Subscription) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Ok(Some(message)) =
            tokio::time::timeout(Duration::from_millis(50), subscription.next()).await
        {
            frames.extend(split_frames(&message).expect("frames"));
        }
        frames
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_bootstrap_restores_books_and_oms() {
        let store = seeded_store();
        let exchange = Exchange::bootstrap(
            config(),
            store as Arc<dyn Store>,
            Arc::new(MemoryBus::new()),
        )
        .expect("bootstrap");
        assert_eq!(exchange.markets(), vec!["btcusdt".to_string()]);
        assert_eq!(exchange.oms.len(), 1);
        assert_eq!(exchange.sequences.last_order_id(), 100);
    }

    #[test]
    fn test_bootstrap_without_markets_is_fatal() {
        let raw = CONFIG.split("markets:").next().unwrap_or_default().to_string();
        let config = Config::from_yaml(&raw, Vec::new()).expect("config");
        let err = Exchange::bootstrap(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryBus::new()),
        )
        .expect_err("no markets");
        assert!(matches!(err, CoreError::Fatal(_)));
        assert_eq!(err.exit_code(), EXIT_CONFIG);
    }

    #[tokio::test]
    async fn test_orders_flow_end_to_end() {
        let store = seeded_store();
        let bus = Arc::new(MemoryBus::new());
        let mut sync_data = bus.subscribe("sync_data").await.expect("subscribe");
        let mut balances = bus
            .subscribe("balance_update_trigger")
            .await
            .expect("subscribe");

        let exchange = Exchange::bootstrap(
            config(),
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&bus) as Arc<dyn MessageBus>,
        )
        .expect("bootstrap");
        let (stop, shutdown) = tokio::sync::watch::channel(false);
        let running = exchange.start(shutdown).expect("start");
        let oms = Arc::clone(&running.oms);

        let taker = Order::limit(0, "btcusdt", Side::Buy, 100 * ONE, ONE).with_owner(2);
        let resting = Order::limit(0, "btcusdt", Side::Buy, 90 * ONE, ONE).with_owner(3);
        let unknown = Order::limit(0, "dogeusdt", Side::Buy, ONE, ONE).with_owner(4);
        let mut invalid = Order::limit(0, "btcusdt", Side::Sell, 100 * ONE, ONE).with_owner(5);
        invalid.amount = 0;
        bus.publish("orders", encode(&[taker, resting, unknown, invalid]))
            .await
            .expect("publish");

        wait_for(|| oms.get_order_by_id(50).is_err() && oms.get_order_by_id(102).is_ok()).await;
        assert!(oms.get_order_by_id(101).is_err());
        assert_eq!(oms.len(), 1);

        let cancel = Order::limit(102, "btcusdt", Side::Buy, 90 * ONE, ONE)
            .with_owner(3)
            .into_cancel();
        bus.publish("cancel_orders", encode(&[cancel]))
            .await
            .expect("publish");
        wait_for(|| oms.is_empty()).await;

        stop.send(true).expect("exchange running");
        let engines = running.join().await;
        assert_eq!(engines.len(), 1);
        assert_eq!(engines[0].book().order_count(), 0);

        assert_eq!(store.sequence_last_value(ORDERS_SEQUENCE).ok(), Some(104));
        assert_eq!(store.sequence_last_value(TRADES_SEQUENCE).ok(), Some(1));

        let serializer = JsonEventSerializer::new();
        let events: Vec<SyncEvent> = drain(&mut sync_data)
            .await
            .iter()
            .map(|frame| serializer.deserialize_sync(frame).expect("sync event"))
            .collect();
        let rows: Vec<(SyncCommand, SyncModel, Option<u64>)> = events
            .iter()
            .filter(|e| e.model != SyncModel::Revenues)
            .map(|e| {
                let key = if e.model == SyncModel::Trades { "seq_id" } else { "id" };
                (e.command, e.model, e.get_u64(key))
            })
            .collect();
        assert_eq!(
            rows,
            vec![
                (SyncCommand::Save, SyncModel::Orders, Some(101)),
                (SyncCommand::Save, SyncModel::Trades, Some(1)),
                (SyncCommand::Update, SyncModel::Orders, Some(50)),
                (SyncCommand::Update, SyncModel::Orders, Some(101)),
                (SyncCommand::Save, SyncModel::Orders, Some(102)),
                (SyncCommand::Update, SyncModel::Orders, Some(102)),
            ]
        );
        let revenues: Vec<_> = events
            .iter()
            .filter(|e| e.model == SyncModel::Revenues)
            .map(|e| (e.get_u64("owner_id"), e.get_str("fee_unit")))
            .collect();
        assert_eq!(revenues, vec![(Some(1), Some("quote")), (Some(2), Some("base"))]);
        assert_eq!(
            events.last().and_then(|e| e.get_str("status")),
            Some(OrderStatus::Cancelled.as_str())
        );

        let users: BTreeSet<u64> = drain(&mut balances)
            .await
            .iter()
            .map(|frame| {
                serializer
                    .deserialize_balance(frame)
                    .map(|update: BalanceUpdate| update.user_id)
                    .expect("balance update")
            })
            .collect();
        assert_eq!(users, BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn test_migrations_apply_once_then_report_dirty() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("0001_init.up.sql"), "CREATE TABLE orders (id BIGINT);")
            .expect("write");
        fs::write(dir.path().join("0001_init.down.sql"), "DROP TABLE orders;").expect("write");
        fs::write(dir.path().join("0002_trades.up.sql"), "CREATE TABLE trades (id BIGINT);")
            .expect("write");
        let store = MemoryStore::new();

        let outcome = run_migrations(&store, dir.path()).expect("migrate");
        assert_eq!(
            outcome,
            MigrationOutcome::Applied {
                files: vec!["0001_init.up.sql".to_string(), "0002_trades.up.sql".to_string()],
                version: 2,
            }
        );
        assert_eq!(
            run_migrations(&store, dir.path()).ok(),
            Some(MigrationOutcome::NoChange)
        );

        fs::write(dir.path().join("0003_broken.up.sql"), "  \n").expect("write");
        let err = run_migrations(&store, dir.path()).expect_err("broken migration");
        assert!(matches!(err, CoreError::Store(StoreError::Migration(_))));
        let err = run_migrations(&store, dir.path()).expect_err("dirty");
        assert!(matches!(err, CoreError::Store(StoreError::Dirty(3))));
        assert_eq!(err.exit_code(), EXIT_CONFIG);
        assert_eq!(store.migration_version(), Some(2));
    }
}
