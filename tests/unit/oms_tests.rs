use exchange_core::bus::{SyncCommand, SyncModel, SyncSender};
use exchange_core::oms::{Oms, OmsError, StatusChange, is_valid_change};
use exchange_core::orderbook::{Order, OrderStatus, Side};

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 5] = [
        OrderStatus::Untouched,
        OrderStatus::Pending,
        OrderStatus::PartiallyFilled,
        OrderStatus::Filled,
        OrderStatus::Cancelled,
    ];

    fn order(id: u64, market: &str, owner: u64) -> Order {
        Order::limit(id, market, Side::Sell, 500, 10).with_owner(owner)
    }

    #[test]
    fn test_guard_ok_implies_same_on_target() {
        for from in ALL {
            for to in ALL {
                if is_valid_change(from, to) == StatusChange::Ok {
                    assert_eq!(is_valid_change(to, to), StatusChange::Same);
                }
            }
        }
    }

    #[test]
    fn test_no_way_out_of_terminal() {
        for from in [OrderStatus::Filled, OrderStatus::Cancelled] {
            for to in ALL {
                assert_ne!(is_valid_change(from, to), StatusChange::Ok);
            }
        }
    }

    #[test]
    fn test_terminal_orders_leave_every_index() {
        let (sync, events) = SyncSender::channel();
        let oms = Oms::with_sync(sync);
        for id in 1..=4 {
            oms.save_order(order(id, "btcusdt", 9));
        }

        let mut filled = order(1, "btcusdt", 9);
        filled.status = OrderStatus::Filled;
        filled.filled_amount = 10;
        assert_eq!(oms.update_order(&filled), Ok(true));
        assert_eq!(
            oms.update_order_status("btcusdt", 2, OrderStatus::Cancelled, 1, true),
            Ok(true)
        );

        for id in [1, 2] {
            assert_eq!(oms.get_order_by_id(id), Err(OmsError::NotFound { id }));
            assert!(oms.get_order("btcusdt", id).is_err());
        }
        let by_user = oms.get_orders_by_user(9);
        assert_eq!(by_user["btcusdt"].len(), 2);
        assert_eq!(
            oms.get_orders_by_market_id("btcusdt")
                .map(|orders| orders.into_iter().map(|o| o.id).collect::<Vec<_>>()),
            Ok(vec![3, 4])
        );

        let updates: Vec<_> = events
            .try_iter()
            .filter(|e| e.command == SyncCommand::Update)
            .collect();
        assert_eq!(updates.len(), 2);
        assert!(updates.iter().all(|e| e.model == SyncModel::Orders));
    }

    #[test]
    fn test_update_after_terminal_is_not_found() {
        let oms = Oms::new();
        oms.save_order(order(1, "btcusdt", 9));
        let mut cancelled = order(1, "btcusdt", 9);
        cancelled.status = OrderStatus::Cancelled;
        assert_eq!(oms.update_order(&cancelled), Ok(true));

        let mut again = cancelled.clone();
        again.status = OrderStatus::PartiallyFilled;
        assert_eq!(oms.update_order(&again), Err(OmsError::NotFound { id: 1 }));
    }

    #[test]
    fn test_custom_update_ignores_backward_move() {
        let oms = Oms::new();
        oms.save_order(order(1, "btcusdt", 9));
        let mut custom = order(1, "btcusdt", 9);
        custom.status = OrderStatus::PartiallyFilled;
        assert_eq!(oms.update_custom_order(custom.clone()), Ok(true));

        custom.status = OrderStatus::Untouched;
        assert_eq!(oms.update_custom_order(custom), Ok(false));
        assert_eq!(
            oms.get_order_by_id(1).map(|o| o.status),
            Ok(OrderStatus::PartiallyFilled)
        );
    }

    #[test]
    fn test_status_update_without_save_emits_nothing() {
        let (sync, events) = SyncSender::channel();
        let oms = Oms::with_sync(sync);
        oms.restore(vec![order(1, "btcusdt", 9)]);
        assert_eq!(events.try_iter().count(), 0);

        assert_eq!(
            oms.update_order_status("btcusdt", 1, OrderStatus::PartiallyFilled, 2, false),
            Ok(true)
        );
        assert_eq!(events.try_iter().count(), 0);
        assert_eq!(
            oms.update_order_status("ethusdt", 1, OrderStatus::Filled, 2, false),
            Err(OmsError::NotFound { id: 1 })
        );
    }

    #[test]
    fn test_concurrent_saves() {
        let oms = std::sync::Arc::new(Oms::new());
        let handles: Vec<_> = (0..4u64)
            .map(|worker| {
                let oms = std::sync::Arc::clone(&oms);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        let id = worker * 1_000 + i + 1;
                        oms.save_order(order(id, if i % 2 == 0 { "a" } else { "b" }, worker));
                    }
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().is_ok());
        }
        assert_eq!(oms.len(), 1_000);
        assert_eq!(oms.get_orders_by_market_id("a").map(|v| v.len()), Ok(500));
        assert_eq!(oms.get_orders_by_user(3).values().map(|m| m.len()).sum::<usize>(), 250);
    }
}
