//! Generic LRU container.
//!
//! A hash map from key to arena slot plus a doubly linked list threaded
//! through the arena by index. The list keeps recency order with the least
//! recently used key at the head and the most recently used key at the tail.
//! Lookup, insert, remove and eviction are all O(1) amortized.
//!
//! The container has no notion of capacity: the owner decides when an
//! insertion must evict (a byte budget in the caches built on top of it) and
//! passes that decision to [`LruContainer::insert`].
//!
//! # Example
//! ```
//! use tilecache::core::LruContainer;
//!
//! let mut lru = LruContainer::new();
//! lru.insert(1u64, "one", false);
//! lru.insert(2u64, "two", false);
//!
//! // Looking a key up counts as a use
//! lru.lookup(&1);
//!
//! let evicted = lru.insert(3u64, "three", true);
//! assert_eq!(evicted, Some((2, "two")));
//! ```

use ahash::AHashMap;
use std::hash::Hash;

/// Null link in the arena list
const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    /// `None` while the slot sits on the free list
    value: Option<V>,
    prev: usize,
    next: usize,
}

/// Map + recency list, always mutated together.
pub struct LruContainer<K, V> {
    map: AHashMap<K, usize>,
    nodes: Vec<Node<K, V>>,
    /// Least recently used
    head: usize,
    /// Most recently used
    tail: usize,
    free: Vec<usize>,
}

impl<K, V> std::fmt::Debug for LruContainer<K, V>
where
    K: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruContainer")
            .field("len", &self.map.len())
            .field("slots", &self.nodes.len())
            .field("free", &self.free.len())
            .finish()
    }
}

impl<K: Hash + Eq + Clone, V> Default for LruContainer<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone, V> LruContainer<K, V> {
    /// Create an empty container
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty container with room for `capacity` entries before reallocating
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: AHashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            head: NIL,
            tail: NIL,
            free: Vec::new(),
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Look up a key and mark it as the most recently used entry.
    ///
    /// This is the only operation that updates recency for an existing key.
    pub fn lookup(&mut self, key: &K) -> Option<&mut V> {
        let idx = *self.map.get(key)?;
        self.move_to_back(idx);
        self.nodes[idx].value.as_mut()
    }

    /// Access a value without touching recency
    pub fn peek(&self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.nodes[idx].value.as_ref()
    }

    /// Mutable access without touching recency
    pub fn peek_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = *self.map.get(key)?;
        self.nodes[idx].value.as_mut()
    }

    /// The least recently used entry, if any
    pub fn peek_lru(&self) -> Option<(&K, &V)> {
        if self.head == NIL {
            return None;
        }
        let node = &self.nodes[self.head];
        node.value.as_ref().map(|value| (&node.key, value))
    }

    /// Insert `key` as the most recently used entry.
    ///
    /// When `must_evict` is set and the container is not empty, the least
    /// recently used entry is removed *before* the insertion and handed back
    /// to the caller.
    ///
    /// If `key` is already present its value is swapped in place, the key
    /// moves to the most recently used end, and the displaced pair is
    /// returned instead of evicting anything.
    pub fn insert(&mut self, key: K, value: V, must_evict: bool) -> Option<(K, V)> {
        if let Some(&idx) = self.map.get(&key) {
            let old = self.nodes[idx].value.replace(value);
            self.move_to_back(idx);
            return old.map(|old| (key, old));
        }

        let evicted = if must_evict { self.pop_lru() } else { None };

        let idx = self.alloc(key.clone(), value);
        self.push_back(idx);
        self.map.insert(key, idx);

        evicted
    }

    /// Remove a key, returning its value
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        self.free.push(idx);
        self.nodes[idx].value.take()
    }

    /// Remove and return the least recently used entry.
    ///
    /// # Panics
    ///
    /// Panics if the container is empty. Callers check `len()` first.
    pub fn evict_lru(&mut self) -> (K, V) {
        match self.pop_lru() {
            Some(pair) => pair,
            None => panic!("evict_lru called on an empty LruContainer"),
        }
    }

    /// Remove and return the least recently used entry, if any
    pub fn pop_lru(&mut self) -> Option<(K, V)> {
        if self.head == NIL {
            return None;
        }
        let idx = self.head;
        let key = self.nodes[idx].key.clone();
        self.map.remove(&key);
        self.unlink(idx);
        self.free.push(idx);
        self.nodes[idx].value.take().map(|value| (key, value))
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    /// Empty the container, returning every entry from least to most recently used
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut out = Vec::with_capacity(self.len());
        while let Some(pair) = self.pop_lru() {
            out.push(pair);
        }
        self.clear();
        out
    }

    /// Iterate from least to most recently used without touching recency
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            container: self,
            cursor: self.head,
        }
    }

    /// Keys from least to most recently used
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    fn alloc(&mut self, key: K, value: V) -> usize {
        let node = Node {
            key,
            value: Some(value),
            prev: NIL,
            next: NIL,
        };
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = &self.nodes[idx];
            (node.prev, node.next)
        };

        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }

        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }

        let node = &mut self.nodes[idx];
        node.prev = NIL;
        node.next = NIL;
    }

    fn push_back(&mut self, idx: usize) {
        self.nodes[idx].prev = self.tail;
        self.nodes[idx].next = NIL;

        if self.tail == NIL {
            self.head = idx;
        } else {
            let tail = self.tail;
            self.nodes[tail].next = idx;
        }
        self.tail = idx;
    }

    fn move_to_back(&mut self, idx: usize) {
        if idx != self.tail {
            self.unlink(idx);
            self.push_back(idx);
        }
    }

    /// Walk the list and confirm it agrees with the map
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        let mut count = 0;
        let mut prev = NIL;
        let mut cursor = self.head;
        while cursor != NIL {
            let node = &self.nodes[cursor];
            if node.prev != prev || node.value.is_none() {
                return false;
            }
            if self.map.get(&node.key) != Some(&cursor) {
                return false;
            }
            count += 1;
            prev = cursor;
            cursor = node.next;
        }
        prev == self.tail && count == self.map.len()
    }
}

/// Iterator over an [`LruContainer`], least recently used first
pub struct Iter<'a, K, V> {
    container: &'a LruContainer<K, V>,
    cursor: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor != NIL {
            let node = &self.container.nodes[self.cursor];
            self.cursor = node.next;
            if let Some(value) = node.value.as_ref() {
                return Some((&node.key, value));
            }
        }
        None
    }
}
