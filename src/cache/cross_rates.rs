//! Coin exchange rates against other coins, refreshed by the cross-rate
//! poller.

use super::reference::RefCache;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// `symbol -> quote symbol -> rate`.
pub type CrossRates = HashMap<String, HashMap<String, Decimal>>;

/// Latest cross rates. Symbols are stored lower case.
#[derive(Debug, Default)]
pub struct CrossRatesCache {
    rates: RefCache<String, HashMap<String, Decimal>>,
}

impl CrossRatesCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_all(&self, rates: CrossRates) {
        let normalized = rates
            .into_iter()
            .map(|(symbol, quotes)| {
                let quotes = quotes
                    .into_iter()
                    .map(|(quote, rate)| (quote.to_lowercase(), rate))
                    .collect();
                (symbol.to_lowercase(), quotes)
            })
            .collect();
        self.rates.set_all(normalized);
    }

    /// Price of one `symbol` in `quote`.
    pub fn rate(&self, symbol: &str, quote: &str) -> Option<Decimal> {
        if symbol.eq_ignore_ascii_case(quote) {
            return Some(Decimal::ONE);
        }
        self.rates
            .get(&symbol.to_lowercase())?
            .get(&quote.to_lowercase())
            .copied()
    }

    pub fn get_all(&self) -> std::sync::Arc<CrossRates> {
        self.rates.get_all()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_rate_lookup_is_case_insensitive() {
        let cache = CrossRatesCache::new();
        let rate = Decimal::from_str("65000.5").unwrap_or_default();
        cache.set_all(HashMap::from([(
            "BTC".to_string(),
            HashMap::from([("USDT".to_string(), rate)]),
        )]));
        assert_eq!(cache.rate("btc", "usdt"), Some(rate));
        assert_eq!(cache.rate("eth", "usdt"), None);
        assert_eq!(cache.rate("usdt", "USDT"), Some(Decimal::ONE));
    }
}
