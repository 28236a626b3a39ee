//! Referral graph: who referred whom, up to three levels, and the inverse.
//!
//! The graph is rebuilt wholesale from the flat `(user, referrer)` list on
//! every refresh. Walks stop at a repeated node, so malformed cyclic input
//! yields truncated chains instead of looping.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Deepest level tracked.
pub const MAX_REFERRAL_DEPTH: usize = 3;

/// Direct referral link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referral {
    pub user_id: u64,
    pub referrer_id: u64,
}

/// Distance between a user and a referrer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReferralLevel {
    L1,
    L2,
    L3,
}

impl ReferralLevel {
    fn from_depth(depth: usize) -> Option<Self> {
        match depth {
            1 => Some(Self::L1),
            2 => Some(Self::L2),
            3 => Some(Self::L3),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct ReferralGraph {
    /// user -> referrers, nearest first.
    uplines: HashMap<u64, Vec<u64>>,
    /// referrer -> level -> referred users, ascending.
    downlines: HashMap<u64, HashMap<ReferralLevel, Vec<u64>>>,
}

#[derive(Debug, Default)]
pub struct ReferralsCache {
    graph: RwLock<Arc<ReferralGraph>>,
}

impl ReferralsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_all(&self, referrals: Vec<Referral>) {
        let direct: HashMap<u64, u64> = referrals
            .into_iter()
            .filter(|r| r.user_id != r.referrer_id)
            .map(|r| (r.user_id, r.referrer_id))
            .collect();

        let mut graph = ReferralGraph::default();
        for &user in direct.keys() {
            let mut chain = Vec::with_capacity(MAX_REFERRAL_DEPTH);
            let mut seen = HashSet::from([user]);
            let mut current = user;
            while chain.len() < MAX_REFERRAL_DEPTH {
                let Some(&referrer) = direct.get(&current) else {
                    break;
                };
                if !seen.insert(referrer) {
                    break;
                }
                chain.push(referrer);
                current = referrer;
            }
            for (depth, &referrer) in chain.iter().enumerate() {
                if let Some(level) = ReferralLevel::from_depth(depth + 1) {
                    graph
                        .downlines
                        .entry(referrer)
                        .or_default()
                        .entry(level)
                        .or_default()
                        .push(user);
                }
            }
            graph.uplines.insert(user, chain);
        }
        for levels in graph.downlines.values_mut() {
            for users in levels.values_mut() {
                users.sort_unstable();
            }
        }
        *self.graph.write() = Arc::new(graph);
    }

    /// Referrers of `user_id` with their level, nearest first.
    pub fn uplines(&self, user_id: u64) -> Vec<(ReferralLevel, u64)> {
        let graph = Arc::clone(&self.graph.read());
        graph
            .uplines
            .get(&user_id)
            .map(|chain| {
                chain
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &r)| ReferralLevel::from_depth(i + 1).map(|l| (l, r)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Users `referrer_id` referred at `level`.
    pub fn downlines(&self, referrer_id: u64, level: ReferralLevel) -> Vec<u64> {
        let graph = Arc::clone(&self.graph.read());
        graph
            .downlines
            .get(&referrer_id)
            .and_then(|levels| levels.get(&level))
            .cloned()
            .unwrap_or_default()
    }
}
