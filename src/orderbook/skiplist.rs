//! Ordered price index.
//!
//! A skip list keyed by `u64` price units. Nodes live in an arena and link to
//! each other by slot index, which keeps the structure free of `unsafe` and
//! lets deleted slots be recycled. Slot `0` is the header; it doubles as the
//! "nil" link because no node ever points forward to the header.
//!
//! Key `0` is reserved for the header and rejected by [`SkipList::set`].
//!
//! The list is not thread-safe. The order book serialises access.

use super::error::OrderBookError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::ops::{Bound, RangeBounds};

/// Maximum tower height.
pub const MAX_LEVEL: usize = 32;

/// Promotion probability, `1/e`.
pub const PROBABILITY: f64 = 1.0 / std::f64::consts::E;

const HEAD: usize = 0;

struct Node<V> {
    key: u64,
    value: Option<V>,
    forward: Vec<usize>,
    backward: usize,
}

/// Sorted map from price key to `V`.
pub struct SkipList<V> {
    nodes: Vec<Node<V>>,
    free: Vec<usize>,
    level: usize,
    len: usize,
    tail: usize,
    prob_table: [f64; MAX_LEVEL],
    rng: StdRng,
}

impl<V> SkipList<V> {
    /// Creates an empty list seeded from OS entropy.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Creates an empty list with a deterministic level generator.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let mut prob_table = [0.0; MAX_LEVEL];
        for (i, p) in prob_table.iter_mut().enumerate() {
            *p = PROBABILITY.powi(i as i32);
        }
        Self {
            nodes: vec![Node {
                key: 0,
                value: None,
                forward: vec![HEAD; MAX_LEVEL],
                backward: HEAD,
            }],
            free: Vec::new(),
            level: 1,
            len: 0,
            tail: HEAD,
            prob_table,
            rng,
        }
    }

    /// Number of keys stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when no keys are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn random_level(&mut self) -> usize {
        let r: f64 = self.rng.gen_range(0.0..1.0);
        let mut level = 1;
        while level < MAX_LEVEL && r < self.prob_table[level] {
            level += 1;
        }
        level
    }

    /// Fills `update` with the rightmost node before `key` on every level and
    /// returns the candidate node at level 0.
    fn find_predecessors(&self, key: u64, update: &mut [usize; MAX_LEVEL]) -> usize {
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            loop {
                let next = self.nodes[x].forward[i];
                if next != HEAD && self.nodes[next].key < key {
                    x = next;
                } else {
                    break;
                }
            }
            update[i] = x;
        }
        self.nodes[x].forward[0]
    }

    /// Finds the first node whose key is `>= key`, or `HEAD`.
    fn lower_bound(&self, key: u64) -> usize {
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            loop {
                let next = self.nodes[x].forward[i];
                if next != HEAD && self.nodes[next].key < key {
                    x = next;
                } else {
                    break;
                }
            }
        }
        self.nodes[x].forward[0]
    }

    fn find(&self, key: u64) -> Option<usize> {
        if key == 0 {
            return None;
        }
        let candidate = self.lower_bound(key);
        (candidate != HEAD && self.nodes[candidate].key == key).then_some(candidate)
    }

    /// Returns the value stored at `key`.
    pub fn get(&self, key: u64) -> Option<&V> {
        self.find(key).and_then(|idx| self.nodes[idx].value.as_ref())
    }

    /// Returns a mutable reference to the value stored at `key`.
    pub fn get_mut(&mut self, key: u64) -> Option<&mut V> {
        let idx = self.find(key)?;
        self.nodes[idx].value.as_mut()
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: u64) -> bool {
        self.find(key).is_some()
    }

    /// Inserts or replaces the value at `key`, returning the previous value.
    ///
    /// # Errors
    /// Returns [`OrderBookError::InvalidKey`] for key `0`.
    pub fn set(&mut self, key: u64, value: V) -> Result<Option<V>, OrderBookError> {
        if key == 0 {
            return Err(OrderBookError::InvalidKey);
        }

        let mut update = [HEAD; MAX_LEVEL];
        let candidate = self.find_predecessors(key, &mut update);
        if candidate != HEAD && self.nodes[candidate].key == key {
            return Ok(self.nodes[candidate].value.replace(value));
        }

        let level = self.random_level();
        if level > self.level {
            for slot in update.iter_mut().take(level).skip(self.level) {
                *slot = HEAD;
            }
            self.level = level;
        }

        let node = Node {
            key,
            value: Some(value),
            forward: vec![HEAD; level],
            backward: update[0],
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };

        for (i, &prev) in update.iter().enumerate().take(level) {
            self.nodes[idx].forward[i] = self.nodes[prev].forward[i];
            self.nodes[prev].forward[i] = idx;
        }

        let next = self.nodes[idx].forward[0];
        if next == HEAD {
            self.tail = idx;
        } else {
            self.nodes[next].backward = idx;
        }

        self.len += 1;
        Ok(None)
    }

    /// Removes `key`, returning its value.
    pub fn delete(&mut self, key: u64) -> Option<V> {
        if key == 0 {
            return None;
        }
        let mut update = [HEAD; MAX_LEVEL];
        let target = self.find_predecessors(key, &mut update);
        if target == HEAD || self.nodes[target].key != key {
            return None;
        }

        let height = self.nodes[target].forward.len();
        for (i, &prev) in update.iter().enumerate().take(height) {
            if self.nodes[prev].forward[i] == target {
                self.nodes[prev].forward[i] = self.nodes[target].forward[i];
            }
        }

        let next = self.nodes[target].forward[0];
        let back = self.nodes[target].backward;
        if next == HEAD {
            self.tail = back;
        } else {
            self.nodes[next].backward = back;
        }

        while self.level > 1 && self.nodes[HEAD].forward[self.level - 1] == HEAD {
            self.level -= 1;
        }

        let value = self.nodes[target].value.take();
        self.nodes[target].forward.clear();
        self.free.push(target);
        self.len -= 1;
        value
    }

    /// Smallest key.
    pub fn first_key(&self) -> Option<u64> {
        let first = self.nodes[HEAD].forward[0];
        (first != HEAD).then(|| self.nodes[first].key)
    }

    /// Largest key.
    pub fn last_key(&self) -> Option<u64> {
        (self.tail != HEAD).then(|| self.nodes[self.tail].key)
    }

    /// Cursor on the first key `>= key`.
    pub fn seek(&self, key: u64) -> Cursor<'_, V> {
        Cursor {
            list: self,
            node: self.lower_bound(key.max(1)),
        }
    }

    /// Cursor on the smallest key.
    pub fn seek_to_first(&self) -> Cursor<'_, V> {
        Cursor {
            list: self,
            node: self.nodes[HEAD].forward[0],
        }
    }

    /// Cursor on the largest key.
    pub fn seek_to_last(&self) -> Cursor<'_, V> {
        Cursor {
            list: self,
            node: self.tail,
        }
    }

    /// Double-ended iterator over all entries in ascending key order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            list: self,
            front: self.nodes[HEAD].forward[0],
            back: self.tail,
            remaining: self.len,
        }
    }

    /// Double-ended iterator over the entries whose keys fall in `range`.
    pub fn range<R: RangeBounds<u64>>(&self, range: R) -> Iter<'_, V> {
        let lo = match range.start_bound() {
            Bound::Included(&k) => Some(k),
            Bound::Excluded(&k) => k.checked_add(1),
            Bound::Unbounded => Some(1),
        };
        let hi = match range.end_bound() {
            Bound::Included(&k) => Some(k),
            Bound::Excluded(&k) => k.checked_sub(1),
            Bound::Unbounded => Some(u64::MAX),
        };
        let (Some(lo), Some(hi)) = (lo, hi) else {
            return self.empty_iter();
        };
        if lo > hi {
            return self.empty_iter();
        }

        let front = self.lower_bound(lo.max(1));
        if front == HEAD || self.nodes[front].key > hi {
            return self.empty_iter();
        }
        // Walk to the last node <= hi.
        let mut back = match hi.checked_add(1) {
            Some(bound) => self.lower_bound(bound),
            None => HEAD,
        };
        back = if back == HEAD {
            self.tail
        } else {
            self.nodes[back].backward
        };

        let mut remaining = 1;
        let mut x = front;
        while x != back {
            x = self.nodes[x].forward[0];
            remaining += 1;
        }
        Iter {
            list: self,
            front,
            back,
            remaining,
        }
    }

    fn empty_iter(&self) -> Iter<'_, V> {
        Iter {
            list: self,
            front: HEAD,
            back: HEAD,
            remaining: 0,
        }
    }

    /// All keys in ascending order.
    pub fn keys(&self) -> Vec<u64> {
        self.iter().map(|(k, _)| k).collect()
    }
}

impl<V> Default for SkipList<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: fmt::Debug> fmt::Debug for SkipList<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Positioned view into a [`SkipList`], used for seek-style walks.
pub struct Cursor<'a, V> {
    list: &'a SkipList<V>,
    node: usize,
}

impl<'a, V> Cursor<'a, V> {
    /// Whether the cursor points at an entry.
    #[inline]
    pub fn valid(&self) -> bool {
        self.node != HEAD
    }

    /// Key under the cursor.
    pub fn key(&self) -> Option<u64> {
        self.valid().then(|| self.list.nodes[self.node].key)
    }

    /// Value under the cursor.
    pub fn value(&self) -> Option<&'a V> {
        if self.valid() {
            self.list.nodes[self.node].value.as_ref()
        } else {
            None
        }
    }

    /// Advances to the next larger key.
    pub fn next(&mut self) {
        if self.valid() {
            self.node = self.list.nodes[self.node].forward[0];
        }
    }

    /// Steps back to the next smaller key.
    pub fn prev(&mut self) {
        if self.valid() {
            self.node = self.list.nodes[self.node].backward;
        }
    }
}

/// Iterator returned by [`SkipList::iter`] and [`SkipList::range`].
pub struct Iter<'a, V> {
    list: &'a SkipList<V>,
    front: usize,
    back: usize,
    remaining: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (u64, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = &self.list.nodes[self.front];
        self.front = node.forward[0];
        self.remaining -= 1;
        node.value.as_ref().map(|v| (node.key, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> DoubleEndedIterator for Iter<'_, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = &self.list.nodes[self.back];
        self.back = node.backward;
        self.remaining -= 1;
        node.value.as_ref().map(|v| (node.key, v))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}
