use super::reference::RefCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A trading sub-account of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAccount {
    pub id: u64,
    pub user_id: u64,
    #[serde(default)]
    pub label: String,
    /// The account orders default to.
    #[serde(default)]
    pub is_main: bool,
}

/// Sub-accounts keyed by id.
#[derive(Debug, Default)]
pub struct SubAccountsCache {
    accounts: RefCache<u64, SubAccount>,
}

impl SubAccountsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_all(&self, accounts: Vec<SubAccount>) {
        let map: HashMap<u64, SubAccount> = accounts.into_iter().map(|a| (a.id, a)).collect();
        self.accounts.set_all(map);
    }

    pub fn get(&self, id: u64) -> Option<SubAccount> {
        self.accounts.get(&id)
    }

    /// Whether `id` exists and belongs to `user_id`.
    pub fn belongs_to(&self, id: u64, user_id: u64) -> bool {
        self.get(id).is_some_and(|a| a.user_id == user_id)
    }

    /// Main sub-account of `user_id`.
    pub fn main_account(&self, user_id: u64) -> Option<SubAccount> {
        self.accounts
            .get_all()
            .values()
            .find(|a| a.user_id == user_id && a.is_main)
            .cloned()
    }
}
