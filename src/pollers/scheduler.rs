//! Named jobs on cron-like schedules.
//!
//! Accepted schedules are `@every <n><unit>` with unit `ms`, `s`, `m` or
//! `h`, `@hourly` and `@daily`. Hourly and daily jobs run at that period from
//! process start.

use super::PollerError;
use crate::config::CronConfig;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Jobs that must not run at startup.
pub const DEFERRED_JOBS: [&str; 2] = ["revert_frozen_orders", "update_balance24h_stats"];

/// How often a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Every(Duration),
    Hourly,
    Daily,
}

impl Schedule {
    pub fn period(self) -> Duration {
        match self {
            Schedule::Every(period) => period,
            Schedule::Hourly => Duration::from_secs(3_600),
            Schedule::Daily => Duration::from_secs(86_400),
        }
    }
}

impl FromStr for Schedule {
    type Err = PollerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PollerError::InvalidSchedule(s.to_string());
        let spec = s.trim();
        match spec {
            "@hourly" => return Ok(Schedule::Hourly),
            "@daily" => return Ok(Schedule::Daily),
            _ => {}
        }
        let every = spec.strip_prefix("@every").ok_or_else(invalid)?.trim();
        let split = every
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (amount, unit) = every.split_at(split);
        let amount: u64 = amount.parse().map_err(|_| invalid())?;
        let period = match unit {
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => Duration::from_secs(amount.saturating_mul(60)),
            "h" => Duration::from_secs(amount.saturating_mul(3_600)),
            _ => return Err(invalid()),
        };
        if period.is_zero() {
            return Err(invalid());
        }
        Ok(Schedule::Every(period))
    }
}

/// Job body.
pub type Job = Arc<dyn Fn() + Send + Sync>;

/// A job bound to its schedule.
#[derive(Clone)]
pub struct CronJob {
    pub id: String,
    pub schedule: Schedule,
    pub deferred: bool,
    job: Job,
}

impl fmt::Debug for CronJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronJob")
            .field("id", &self.id)
            .field("schedule", &self.schedule)
            .field("deferred", &self.deferred)
            .finish()
    }
}

impl CronJob {
    /// Runs every tick until `shutdown` flips. Non-deferred jobs also run
    /// once immediately.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(job = %self.id, schedule = ?self.schedule, deferred = self.deferred, "cron job started");
        let mut ticker = tokio::time::interval(self.schedule.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        if self.deferred {
            ticker.tick().await;
        }

        loop {
            tokio::select! {
                _ = ticker.tick() => self.fire(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(job = %self.id, "cron job stopped");
    }

    fn fire(&self) {
        debug!(job = %self.id, "running cron job");
        (self.job)();
    }
}

/// Registry of job bodies by id.
#[derive(Default)]
pub struct Scheduler {
    jobs: HashMap<String, Job>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.jobs.keys().collect();
        ids.sort();
        f.debug_struct("Scheduler").field("jobs", &ids).finish()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: &str, job: impl Fn() + Send + Sync + 'static) {
        self.jobs.insert(id.to_string(), Arc::new(job));
    }

    /// Binds every configured entry to its registered body.
    ///
    /// Entries without a body are skipped with a warning. A malformed
    /// schedule is an error.
    pub fn plan(&self, entries: &[CronConfig]) -> Result<Vec<CronJob>, PollerError> {
        let mut planned = Vec::with_capacity(entries.len());
        for entry in entries {
            let schedule: Schedule = entry.schedule.parse()?;
            let Some(job) = self.jobs.get(&entry.id) else {
                warn!(job = %entry.id, "no callback registered for cron job");
                continue;
            };
            planned.push(CronJob {
                id: entry.id.clone(),
                schedule,
                deferred: DEFERRED_JOBS.contains(&entry.id.as_str()),
                job: Arc::clone(job),
            });
        }
        Ok(planned)
    }

    /// Plans `entries` and spawns one task per job.
    pub fn spawn(
        &self,
        entries: &[CronConfig],
        shutdown: &watch::Receiver<bool>,
    ) -> Result<Vec<JoinHandle<()>>, PollerError> {
        Ok(self
            .plan(entries)?
            .into_iter()
            .map(|job| tokio::spawn(job.run(shutdown.clone())))
            .collect())
    }
}
