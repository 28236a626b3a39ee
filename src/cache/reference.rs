//! Copy-on-replace map shared by all reference caches.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// A map replaced wholesale under a write lock and read under a read lock.
pub struct RefCache<K, V> {
    inner: RwLock<Arc<HashMap<K, V>>>,
}

impl<K, V> RefCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Installs `map`, dropping the previous contents.
    pub fn set_all(&self, map: HashMap<K, V>) {
        *self.inner.write() = Arc::new(map);
    }

    /// Clone of the entry for `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.read().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.read().contains_key(key)
    }

    /// The current map. Later `set_all` calls do not affect it.
    pub fn get_all(&self) -> Arc<HashMap<K, V>> {
        Arc::clone(&self.inner.read())
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl<K: Eq + Hash, V: Clone> Default for RefCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for RefCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefCache")
            .field("len", &self.inner.read().len())
            .finish()
    }
}
