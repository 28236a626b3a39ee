use super::reference::RefCache;
use crate::orderbook::FeeSchedule;
use std::collections::HashMap;

/// Per-user fee overrides. Users without an entry pay the market schedule.
#[derive(Debug, Default)]
pub struct UserFeesCache {
    fees: RefCache<u64, FeeSchedule>,
}

impl UserFeesCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_all(&self, fees: HashMap<u64, FeeSchedule>) {
        self.fees.set_all(fees);
    }

    #[inline]
    pub fn get(&self, user_id: u64) -> Option<FeeSchedule> {
        self.fees.get(&user_id)
    }

    pub fn len(&self) -> usize {
        self.fees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fees.is_empty()
    }
}
