//! Derived market data: depth snapshots and last traded prices.

pub mod depth;
pub mod last_price;

pub use depth::{DepthCache, DepthLevel1, DepthLevel2, PriceVolume};
pub use last_price::{LastPrice, LastPriceTracker};
