//! Snapshot load and checksummed package round trips.

#[cfg(test)]
mod tests {
    use crate::orderbook::tests::test_helpers::*;
    use crate::orderbook::{
        Order, OrderBookError, OrderStatus, OrderType, Side, SnapshotPackage, StopKind,
    };

    fn snapshot_orders() -> Vec<Order> {
        let mut partial = limit(5, Side::Sell, 1_050, 10);
        partial.status = OrderStatus::PartiallyFilled;
        partial.filled_amount = 4;

        let mut stop = limit(6, Side::Buy, 1_200, 3).with_stop(StopKind::Entry, 1_150);
        stop.status = OrderStatus::Pending;

        let mut done = limit(7, Side::Buy, 900, 3);
        done.status = OrderStatus::Filled;

        let mut market = limit(8, Side::Buy, 900, 3);
        market.order_type = OrderType::Market;

        vec![
            limit(3, Side::Buy, 1_000, 2),
            partial,
            stop,
            done,
            market,
            Order::limit(9, "ethusdt", Side::Buy, 10, 1),
            // Would cross the 1050 ask.
            limit(10, Side::Buy, 1_100, 1),
            limit(2, Side::Buy, 990, 1),
            limit(2, Side::Buy, 991, 1),
        ]
    }

    #[test]
    fn test_load_from_orders_routes_and_skips() {
        let mut book = new_book();
        place(&mut book, limit(1, Side::Sell, 5, 5));

        let report = book.load_from_orders(MARKET, snapshot_orders(), 77, 55);
        assert_eq!(report.resting, 3);
        assert_eq!(report.armed, 1);
        assert_eq!(report.skipped, 5);

        assert!(!book.contains(1));
        assert_eq!(book.best_bid(), Some(1_000));
        assert_eq!(book.best_ask(), Some(1_050));
        assert_eq!(book.lowest_entry_price(), Some(1_150));
        assert_eq!(book.get_order(2).map(|o| o.price), Some(990));
        assert!(book.is_armed(6));
        assert_eq!(book.ask_levels(), vec![(1_050, 6)]);
        assert_eq!(book.last_event_seq_id(), 77);
        assert_eq!(book.last_trade_seq_id(), 55);
    }

    #[test]
    fn test_package_round_trip() {
        let mut book = new_book();
        book.load_from_orders(MARKET, snapshot_orders(), 10, 20);
        let json = book
            .snapshot_package()
            .and_then(|p| p.to_json())
            .expect("package");

        let mut restored = new_book();
        let package = SnapshotPackage::from_json(&json).expect("decode");
        let report = restored.restore_from_package(package).expect("restore");
        assert_eq!(report.resting + report.armed, 4);
        assert_eq!(restored.bid_levels(), book.bid_levels());
        assert_eq!(restored.ask_levels(), book.ask_levels());
        assert_eq!(restored.stop_orders(), book.stop_orders());
        assert_eq!(restored.last_trade_seq_id(), 20);
    }

    #[test]
    fn test_package_rejects_tampering() {
        let mut book = new_book();
        place(&mut book, limit(1, Side::Buy, 100, 1));
        let mut package = book.snapshot_package().expect("package");
        package.snapshot.bids[0].amount = 1_000;
        assert!(matches!(
            package.validate(),
            Err(OrderBookError::ChecksumMismatch { .. })
        ));

        let mut package = book.snapshot_package().expect("package");
        package.version = 99;
        assert!(matches!(
            package.validate(),
            Err(OrderBookError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_restore_rejects_foreign_market() {
        let mut other = crate::orderbook::OrderBook::new(
            "ethusdt",
            std::sync::Arc::new(crate::sequence::SequenceGenerator::new(0, 0)),
        );
        let mut events = Vec::new();
        other.process(Order::limit(1, "ethusdt", Side::Buy, 10, 1), &mut events);
        let package = other.snapshot_package().expect("package");

        let mut book = new_book();
        assert!(matches!(
            book.restore_from_package(package),
            Err(OrderBookError::MarketMismatch { .. })
        ));
    }
}
