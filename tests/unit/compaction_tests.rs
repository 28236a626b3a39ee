use exchange_core::oms::Oms;
use exchange_core::orderbook::{Order, Side};
use std::collections::HashSet;

#[cfg(test)]
mod tests {
    use super::*;

    const MARKETS: [&str; 8] = [
        "btcusdt", "ethusdt", "xrpusdt", "ltcusdt", "dogeusdt", "adausdt", "solusdt", "dotusdt",
    ];

    fn populate(oms: &Oms, count: u64) {
        let orders = (1..=count).map(|id| {
            let market = MARKETS[(id % MARKETS.len() as u64) as usize];
            let side = if id % 2 == 0 { Side::Buy } else { Side::Sell };
            Order::limit(id, market, side, 1_000 + id % 50, 1 + id % 7).with_owner(id % 997)
        });
        assert_eq!(oms.restore(orders), count as usize);
    }

    #[test]
    fn test_compaction_preserves_set_equality() {
        let oms = Oms::new();
        populate(&oms, 20_000);
        for id in (1..=20_000).filter(|id| id % 3 == 0) {
            oms.remove_order(id);
        }
        let before: HashSet<u64> = oms.order_ids();
        let counts_before = oms.market_counts();

        let report = oms.compact();

        assert_eq!(report.orders, before.len());
        assert_eq!(report.markets, MARKETS.len());
        assert_eq!(oms.order_ids(), before);
        assert_eq!(oms.market_counts(), counts_before);
        for id in before.iter().take(100) {
            assert!(oms.get_order_by_id(*id).is_ok());
        }
    }

    #[test]
    fn test_populate_drain_compact() {
        let oms = Oms::new();
        populate(&oms, 125_000);
        for id in 1..=125_000 {
            assert!(oms.remove_order(id).is_some());
        }
        let report = oms.compact();
        assert_eq!(report.orders, 0);
        assert_eq!(report.markets, 0);
        assert_eq!(report.users, 0);
        assert!(oms.is_empty());
        assert!(oms.markets().is_empty());
    }
}
