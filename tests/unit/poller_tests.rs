use exchange_core::cache::{Caches, CrossRatesCache, Market, MarketsCache};
use exchange_core::config::CronConfig;
use exchange_core::orderbook::FeeSchedule;
use exchange_core::pollers::{CrossRateClient, Scheduler, reference_jobs, run_cross_rate_poller};
use exchange_core::store::{MemoryStore, Store};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[cfg(test)]
mod tests {
    use super::*;

    fn cron(id: &str, schedule: &str) -> CronConfig {
        CronConfig {
            id: id.to_string(),
            schedule: schedule.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reference_jobs_reload_on_schedule() {
        let store = Arc::new(MemoryStore::new());
        store.set_markets(vec![Market::new("btcusdt", "btc", "usdt")]);
        let caches = Arc::new(Caches::default());

        let mut scheduler = Scheduler::new();
        reference_jobs(
            &mut scheduler,
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&caches),
        );
        let (stop, shutdown) = tokio::sync::watch::channel(false);
        let handles = scheduler
            .spawn(
                &[cron("markets", "@every 30s"), cron("user_fees", "@every 1m")],
                &shutdown,
            )
            .expect("spawn");
        assert_eq!(handles.len(), 2);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(caches.markets.ids(), vec!["btcusdt".to_string()]);
        assert!(caches.user_fees.is_empty());

        store.set_markets(vec![
            Market::new("btcusdt", "btc", "usdt"),
            Market::new("ethusdt", "eth", "usdt"),
        ]);
        store.set_user_fees(HashMap::from([(7, FeeSchedule::new(5, 10))]));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(caches.markets.len(), 2);
        assert!(caches.user_fees.is_empty());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(caches.user_fees.get(7), Some(FeeSchedule::new(5, 10)));

        stop.send(true).expect("jobs alive");
        for handle in handles {
            handle.await.expect("job task");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reload_keeps_previous_data() {
        let store = Arc::new(MemoryStore::new());
        store.set_markets(vec![Market::new("btcusdt", "btc", "usdt")]);
        let caches = Arc::new(Caches::default());
        let mut scheduler = Scheduler::new();
        reference_jobs(
            &mut scheduler,
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&caches),
        );
        let (stop, shutdown) = tokio::sync::watch::channel(false);
        let handles = scheduler
            .spawn(&[cron("markets", "@every 5s")], &shutdown)
            .expect("spawn");

        tokio::time::sleep(Duration::from_millis(10)).await;
        store.set_failing(true);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(caches.markets.contains("btcusdt"));

        stop.send(true).expect("jobs alive");
        for handle in handles {
            handle.await.expect("job task");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_job_waits_one_period() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        let counter = Arc::clone(&runs);
        scheduler.register("update_balance24h_stats", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (stop, shutdown) = tokio::sync::watch::channel(false);
        let handles = scheduler
            .spawn(&[cron("update_balance24h_stats", "@hourly")], &shutdown)
            .expect("spawn");

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        stop.send(true).expect("job alive");
        for handle in handles {
            handle.await.expect("job task");
        }
    }

    async fn serve_json(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_cross_rate_poller_installs_rates() {
        let url = serve_json(r#"{"BTC":{"USDT":"65000"},"eth":{"usdt":"3200.5"}}"#).await;
        let client = CrossRateClient::new(&url, &url, Duration::from_secs(2)).expect("client");
        let rates = Arc::new(CrossRatesCache::new());
        let (stop, shutdown) = tokio::sync::watch::channel(false);
        let poller = tokio::spawn(run_cross_rate_poller(
            client,
            Arc::new(MarketsCache::new()),
            Arc::clone(&rates),
            Duration::from_millis(20),
            shutdown,
        ));

        for _ in 0..100 {
            if !rates.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(rates.rate("btc", "usdt"), Some(Decimal::from(65_000)));
        assert_eq!(rates.rate("ETH", "USDT"), Some(Decimal::new(32_005, 1)));

        stop.send(true).expect("poller alive");
        poller.await.expect("poller task");
    }
}
