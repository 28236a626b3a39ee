use exchange_core::sequence::{CheckpointOutcome, SequenceGenerator, SequenceOffsets};
use exchange_core::store::{MemoryStore, ORDERS_SEQUENCE, Store, StoreOp, TRADES_SEQUENCE};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;

    fn store_at(orders: u64, trades: u64) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.set_sequence_value(ORDERS_SEQUENCE, orders);
        store.set_sequence_value(TRADES_SEQUENCE, trades);
        store
    }

    fn set_orders(value: u64) -> StoreOp {
        StoreOp::SetSequence {
            name: ORDERS_SEQUENCE.to_string(),
            value,
            is_called: true,
        }
    }

    #[test]
    fn test_checkpoint_persists_only_moved_counter() {
        let store = store_at(20_000_000, 500);
        let generator =
            SequenceGenerator::bootstrap(store.as_ref(), SequenceOffsets::default())
                .expect("bootstrap");
        assert_eq!(generator.next_order_id(), 20_000_001);

        let outcome = generator.checkpoint(store.as_ref()).expect("checkpoint");
        assert_eq!(
            outcome,
            CheckpointOutcome::Committed {
                orders: Some(20_000_001),
                trades: None
            }
        );
        assert_eq!(
            store.ops(),
            vec![StoreOp::Begin, set_orders(20_000_001), StoreOp::Commit]
        );
        assert_eq!(store.sequence_last_value(ORDERS_SEQUENCE).ok(), Some(20_000_001));
        assert_eq!(store.sequence_last_value(TRADES_SEQUENCE).ok(), Some(500));

        store.clear_ops();
        assert_eq!(
            generator.checkpoint(store.as_ref()).ok(),
            Some(CheckpointOutcome::Unchanged)
        );
        assert_eq!(store.ops(), vec![StoreOp::Begin, StoreOp::Rollback]);
    }

    #[test]
    fn test_offset_jump_is_persisted_by_first_checkpoint() {
        let store = store_at(100, 40);
        let generator = SequenceGenerator::bootstrap(
            store.as_ref(),
            SequenceOffsets {
                order_offset: 1_000,
                trade_offset: 10,
            },
        )
        .expect("bootstrap");
        assert_eq!(
            generator.checkpoint(store.as_ref()).ok(),
            Some(CheckpointOutcome::Committed {
                orders: Some(1_100),
                trades: Some(50)
            })
        );
        assert_eq!(generator.next_trade_id(), 51);
    }

    #[test]
    fn test_bootstrap_fails_on_store_error() {
        let store = store_at(1, 1);
        store.set_failing(true);
        assert!(SequenceGenerator::bootstrap(store.as_ref(), SequenceOffsets::default()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkpointer_ticks_and_flushes_on_shutdown() {
        let store = store_at(20_000_000, 0);
        let generator = Arc::new(
            SequenceGenerator::bootstrap(store.as_ref(), SequenceOffsets::default())
                .expect("bootstrap"),
        );
        let (stop, shutdown) = tokio::sync::watch::channel(false);
        let worker = tokio::spawn(Arc::clone(&generator).run_checkpointer(
            Arc::clone(&store) as Arc<dyn Store>,
            Duration::from_secs(1),
            shutdown,
        ));

        assert_eq!(generator.next_order_id(), 20_000_001);
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(
            store.ops(),
            vec![StoreOp::Begin, set_orders(20_000_001), StoreOp::Commit]
        );

        store.clear_ops();
        generator.next_order_id();
        stop.send(true).expect("checkpointer alive");
        worker.await.expect("checkpointer task");
        assert_eq!(
            store.ops(),
            vec![StoreOp::Begin, set_orders(20_000_002), StoreOp::Commit]
        );
    }
}
