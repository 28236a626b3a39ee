//! Cross-rate provider client and its poller.
//!
//! Coin values come from one provider endpoint. A market whose base coin has
//! no value in its quote coin is filled in from the provider's last price of
//! that market.

use super::PollerError;
use crate::cache::{CrossRates, CrossRatesCache, MarketsCache};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// HTTP client for the cross-rate provider.
#[derive(Debug, Clone)]
pub struct CrossRateClient {
    http: reqwest::Client,
    url_coin_values: String,
    url_last_prices: String,
}

impl CrossRateClient {
    pub fn new(
        url_coin_values: &str,
        url_last_prices: &str,
        timeout: Duration,
    ) -> Result<Self, PollerError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url_coin_values: url_coin_values.to_string(),
            url_last_prices: url_last_prices.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, PollerError> {
        let response = self.http.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(PollerError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    /// `symbol -> quote -> rate` for every listed coin.
    pub async fn fetch_coin_values(&self) -> Result<CrossRates, PollerError> {
        self.get_json(&self.url_coin_values).await
    }

    /// Provider's last price of `market_id`.
    pub async fn last_price(&self, market_id: &str) -> Result<Decimal, PollerError> {
        let url = format!("{}/{}", self.url_last_prices, market_id);
        self.get_json(&url).await
    }

    /// Coin values with gaps filled from market last prices.
    ///
    /// Symbols come back lower case. A market whose last price cannot be
    /// fetched is left without a rate.
    pub async fn fetch_rates(&self, markets: &MarketsCache) -> Result<CrossRates, PollerError> {
        let mut rates: CrossRates = self
            .fetch_coin_values()
            .await?
            .into_iter()
            .map(|(symbol, quotes)| {
                let quotes = quotes
                    .into_iter()
                    .map(|(quote, rate)| (quote.to_lowercase(), rate))
                    .collect();
                (symbol.to_lowercase(), quotes)
            })
            .collect();

        for market in markets.all() {
            let base = market.base_coin.to_lowercase();
            let quote = market.quote_coin.to_lowercase();
            if rates.get(&base).is_some_and(|quotes| quotes.contains_key(&quote)) {
                continue;
            }
            match self.last_price(&market.id).await {
                Ok(price) => {
                    debug!(market = %market.id, %price, "rate taken from market last price");
                    rates.entry(base).or_default().insert(quote, price);
                }
                Err(err) => warn!(market = %market.id, error = %err, "market last price fetch failed"),
            }
        }
        Ok(rates)
    }
}

/// Installs fresh cross rates every `period` until `shutdown` flips. Failed
/// fetches keep the previous rates.
pub async fn run_cross_rate_poller(
    client: CrossRateClient,
    markets: Arc<MarketsCache>,
    rates: Arc<CrossRatesCache>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(?period, "cross rate poller started");
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => match client.fetch_rates(&markets).await {
                Ok(values) => {
                    trace!(symbols = values.len(), "cross rates refreshed");
                    rates.set_all(values);
                }
                Err(err) => warn!(error = %err, "cross rate fetch failed"),
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("cross rate poller stopped");
}
