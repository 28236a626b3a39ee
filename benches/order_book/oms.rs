use criterion::{BenchmarkId, Criterion};
use exchange_core::oms::Oms;
use exchange_core::orderbook::{Order, OrderStatus, Side};
use std::hint::black_box;

const MARKETS: [&str; 4] = ["btcusdt", "ethusdt", "xrpusdt", "ltcusdt"];

fn order(id: u64) -> Order {
    Order::limit(id, MARKETS[(id % 4) as usize], Side::Buy, 1_000, 10).with_owner(id % 100)
}

/// Register OMS index benchmarks.
pub fn register_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("OMS");

    for &order_count in &[1_000u64, 10_000] {
        group.bench_with_input(
            BenchmarkId::new("save_then_fill", order_count),
            &order_count,
            |b, &count| {
                b.iter(|| {
                    let oms = Oms::new();
                    for id in 1..=count {
                        oms.save_order(order(id));
                    }
                    for id in 1..=count {
                        let mut filled = order(id);
                        filled.status = OrderStatus::Filled;
                        filled.filled_amount = filled.amount;
                        let _ = black_box(oms.update_order(&filled));
                    }
                    oms
                });
            },
        );
    }

    group.bench_function("compact_50000", |b| {
        b.iter_with_setup(
            || {
                let oms = Oms::new();
                oms.restore((1..=50_000).map(order));
                oms
            },
            |oms| black_box(oms.compact()),
        );
    });

    group.finish();
}
