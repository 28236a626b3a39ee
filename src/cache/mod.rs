//! Reference-data caches.
//!
//! Every cache shares one shape: a map behind a read/write lock that pollers
//! replace wholesale with `set_all`, read with `get`. Readers clone an `Arc`
//! of the current map, so a replacement never blocks behind a long read.

use std::sync::Arc;

pub mod api_keys;
pub mod coins;
pub mod cross_rates;
pub mod markets;
pub mod reference;
pub mod referrals;
pub mod sub_accounts;
pub mod user_fees;

pub use api_keys::{ApiKey, ApiKeyOwner, ApiKeysCache};
pub use coins::{Coin, CoinsCache};
pub use cross_rates::{CrossRates, CrossRatesCache};
pub use markets::{Market, MarketsCache};
pub use reference::RefCache;
pub use referrals::{Referral, ReferralLevel, ReferralsCache};
pub use sub_accounts::{SubAccount, SubAccountsCache};
pub use user_fees::UserFeesCache;

/// Every reference cache of the process, built once and shared.
#[derive(Debug, Default)]
pub struct Caches {
    pub markets: Arc<MarketsCache>,
    pub coins: Arc<CoinsCache>,
    pub api_keys: Arc<ApiKeysCache>,
    pub sub_accounts: Arc<SubAccountsCache>,
    pub user_fees: Arc<UserFeesCache>,
    pub referrals: Arc<ReferralsCache>,
    pub cross_rates: Arc<CrossRatesCache>,
}
