//! Periodic refresh of the reference caches.
//!
//! The [`Scheduler`] runs named jobs on cron-like schedules. The jobs that
//! reload reference data from the store are built by [`reference_jobs`].
//! Cross rates come from an HTTP provider polled by
//! [`run_cross_rate_poller`].

pub mod cross_rate;
pub mod scheduler;

pub use cross_rate::{CrossRateClient, run_cross_rate_poller};
pub use scheduler::{CronJob, DEFERRED_JOBS, Job, Schedule, Scheduler};

use crate::cache::Caches;
use crate::store::{Store, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Poller failures. Jobs log these and retry on their next run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PollerError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-200 status.
    #[error("unexpected http status {0}")]
    Status(u16),

    #[error("invalid schedule {0:?}")]
    InvalidSchedule(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Job ids that reload a reference cache from the store.
pub const REFERENCE_JOBS: [&str; 6] = [
    "markets",
    "coins",
    "api_keys",
    "sub_accounts",
    "user_fees",
    "referrals",
];

/// Reloads the cache named by `id` from `store`.
///
/// An empty market list leaves the installed markets in place, so markets
/// taken from the configuration at bootstrap survive a store without rows.
pub fn reload(id: &str, store: &dyn Store, caches: &Caches) -> Result<(), PollerError> {
    match id {
        "markets" => {
            let markets = store.load_markets()?;
            if markets.is_empty() {
                debug!(installed = caches.markets.len(), "store has no markets, keeping current");
                return Ok(());
            }
            caches.markets.set_all(markets, &caches.cross_rates)
        }
        "coins" => caches.coins.set_all(store.load_coins()?),
        "api_keys" => caches.api_keys.set_all(store.load_api_keys()?),
        "sub_accounts" => caches.sub_accounts.set_all(store.load_sub_accounts()?),
        "user_fees" => caches.user_fees.set_all(store.load_user_fees()?),
        "referrals" => caches.referrals.set_all(store.load_referrals()?),
        other => {
            warn!(job = other, "no reference cache for job");
            return Ok(());
        }
    }
    debug!(job = id, "reference cache reloaded");
    Ok(())
}

/// Registers one reload job per entry of [`REFERENCE_JOBS`] on `scheduler`.
pub fn reference_jobs(scheduler: &mut Scheduler, store: Arc<dyn Store>, caches: Arc<Caches>) {
    for id in REFERENCE_JOBS {
        let store = Arc::clone(&store);
        let caches = Arc::clone(&caches);
        scheduler.register(id, move || {
            if let Err(err) = reload(id, store.as_ref(), &caches) {
                warn!(job = id, error = %err, "reference reload failed");
            }
        });
    }
}
