//! API keys with a table of decoded entries.
//!
//! Keys are stored as loaded: the SHA-256 of the secret and a
//! comma-separated permission list. The first successful verification of a
//! key decodes it into an [`ApiKeyOwner`]; later lookups reuse the decoded
//! entry. The decoded table is cleared whenever the key set is replaced so a
//! re-issued key never inherits a stale verification.

use super::reference::RefCache;
use crate::utils::to_hex;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};

/// Persisted API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Public key id.
    pub key: String,
    /// Lower-case hex SHA-256 of the secret.
    pub secret_hash: String,
    pub user_id: u64,
    #[serde(default)]
    pub sub_account: u64,
    /// Comma-separated permissions, e.g. `"read,trade"`.
    #[serde(default)]
    pub permissions: String,
}

/// A verified key resolved to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyOwner {
    pub user_id: u64,
    pub sub_account: u64,
    pub permissions: BTreeSet<String>,
}

impl ApiKeyOwner {
    pub fn can(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Hex digest stored in [`ApiKey::secret_hash`].
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    to_hex(&hasher.finalize())
}

#[derive(Debug, Default)]
pub struct ApiKeysCache {
    keys: RefCache<String, ApiKey>,
    decoded: RwLock<HashMap<String, ApiKeyOwner>>,
}

impl ApiKeysCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every key and forgets all decoded entries.
    pub fn set_all(&self, keys: Vec<ApiKey>) {
        let map: HashMap<String, ApiKey> = keys.into_iter().map(|k| (k.key.clone(), k)).collect();
        let mut decoded = self.decoded.write();
        self.keys.set_all(map);
        decoded.clear();
    }

    pub fn get(&self, key: &str) -> Option<ApiKey> {
        self.keys.get(&key.to_string())
    }

    /// Resolves `key` when `secret` matches its stored hash.
    ///
    /// The decoded table lock is held across the key lookup and the insert,
    /// so an owner is only recorded for the key set it was decoded from.
    pub fn verify(&self, key: &str, secret: &str) -> Option<ApiKeyOwner> {
        let hash = hash_secret(secret);
        {
            let decoded = self.decoded.read();
            let stored = self.get(key)?;
            if hash != stored.secret_hash {
                return None;
            }
            if let Some(owner) = decoded.get(key) {
                return Some(owner.clone());
            }
        }

        let mut decoded = self.decoded.write();
        let stored = self.get(key)?;
        if hash != stored.secret_hash {
            return None;
        }
        let owner = decoded
            .entry(key.to_string())
            .or_insert_with(|| decode(&stored));
        Some(owner.clone())
    }

    /// Number of keys verified since the last `set_all`.
    pub fn decoded_len(&self) -> usize {
        self.decoded.read().len()
    }
}

fn decode(stored: &ApiKey) -> ApiKeyOwner {
    ApiKeyOwner {
        user_id: stored.user_id,
        sub_account: stored.sub_account,
        permissions: stored
            .permissions
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
    }
}
