use super::reference::RefCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A listed asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// Ticker, lower case.
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    /// Fractional digits shown for amounts of this coin.
    #[serde(default)]
    pub precision: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Coins keyed by symbol.
#[derive(Debug, Default)]
pub struct CoinsCache {
    coins: RefCache<String, Coin>,
}

impl CoinsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_all(&self, coins: Vec<Coin>) {
        let map: HashMap<String, Coin> = coins
            .into_iter()
            .map(|coin| (coin.symbol.clone(), coin))
            .collect();
        self.coins.set_all(map);
    }

    pub fn get(&self, symbol: &str) -> Option<Coin> {
        self.coins.get(&symbol.to_string())
    }

    /// Symbols of every enabled coin, sorted.
    pub fn enabled_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .coins
            .get_all()
            .values()
            .filter(|c| c.enabled)
            .map(|c| c.symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }
}
