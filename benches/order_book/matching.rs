use criterion::{BenchmarkId, Criterion};
use exchange_core::orderbook::{Order, Side, TradingEngine};
use exchange_core::sequence::SequenceGenerator;
use std::hint::black_box;
use std::sync::Arc;

/// Engine with `count` asks spread over 500 price levels from 1000.
fn populated(count: u64) -> TradingEngine {
    let mut engine = TradingEngine::new("BENCH", Arc::new(SequenceGenerator::new(0, 0)));
    for id in 1..=count {
        let price = 1_000 + id % 500;
        engine.process(Order::limit(id, "BENCH", Side::Sell, price, 10));
    }
    engine
}

/// Register matching and cancel benchmarks.
pub fn register_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("OrderBook - Matching");

    for &order_count in &[100u64, 1_000, 10_000] {
        group.bench_with_input(
            BenchmarkId::new("add_resting_limit", order_count),
            &order_count,
            |b, &count| {
                b.iter(|| black_box(populated(count)));
            },
        );
    }

    // A buy sweeping a tenth of the resting volume.
    for &order_count in &[1_000u64, 10_000] {
        group.bench_with_input(
            BenchmarkId::new("sweep_asks", order_count),
            &order_count,
            |b, &count| {
                b.iter_with_setup(
                    || populated(count),
                    |mut engine| {
                        let sweep = Order::limit(count + 1, "BENCH", Side::Buy, 1_500, count);
                        black_box(engine.process(sweep))
                    },
                );
            },
        );
    }

    group.bench_function("cancel_resting_10000", |b| {
        b.iter_with_setup(
            || populated(10_000),
            |mut engine| {
                for id in (1..=10_000).step_by(10) {
                    let cancel = Order::limit(id, "BENCH", Side::Sell, 1_000, 10).into_cancel();
                    black_box(engine.cancel_order(cancel));
                }
            },
        );
    });

    group.finish();
}
