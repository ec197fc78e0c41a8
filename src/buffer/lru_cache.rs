use std::collections::HashMap;
use std::hash::Hash;

use crate::common::{HeapStoreError, Result};

/// Index of the head sentinel (most recently used side)
const HEAD: usize = 0;
/// Index of the tail sentinel (least recently used side)
const TAIL: usize = 1;

/// A node of the recency list. Sentinels carry no entry.
#[derive(Debug)]
struct Node<K, V> {
    entry: Option<(K, V)>,
    prev: usize,
    next: usize,
}

/// Fixed-capacity map that evicts its least recently used entry.
///
/// Entries live in an arena of nodes linked into a doubly linked list by index,
/// ordered from most recently used (after `HEAD`) to least recently used
/// (before `TAIL`). A hash map from key to node index gives O(1) lookup, and
/// freed nodes are recycled through a free list.
///
/// `get` and `put` count as uses; `peek`, `contains` and iteration do not.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    nodes: Vec<Node<K, V>>,
    index: HashMap<K, usize>,
    free: Vec<usize>,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    /// Creates an empty cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(HeapStoreError::InvalidArgument(
                "cache capacity must be positive".to_string(),
            ));
        }

        let mut nodes = Vec::with_capacity(capacity + 2);
        nodes.push(Node {
            entry: None,
            prev: HEAD,
            next: TAIL,
        });
        nodes.push(Node {
            entry: None,
            prev: HEAD,
            next: TAIL,
        });

        Ok(Self {
            capacity,
            nodes,
            index: HashMap::with_capacity(capacity),
            free: Vec::new(),
        })
    }

    /// Returns the value for `key` and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.unlink(idx);
        self.push_front(idx);
        self.nodes[idx].entry.as_ref().map(|(_, v)| v)
    }

    /// Returns the value for `key` without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.nodes[idx].entry.as_ref().map(|(_, v)| v)
    }

    /// Inserts or overwrites `key`, making it most recently used.
    ///
    /// Returns the previous value for `key`, if any. Inserting a new key into
    /// a full cache first evicts the least recently used entry.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&idx) = self.index.get(&key) {
            self.unlink(idx);
            self.push_front(idx);
            let old = self.nodes[idx].entry.replace((key, value));
            return old.map(|(_, v)| v);
        }

        if self.index.len() >= self.capacity {
            self.pop_lru();
        }

        let node = Node {
            entry: Some((key.clone(), value)),
            prev: HEAD,
            next: TAIL,
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
        self.push_front(idx);
        self.index.insert(key, idx);
        None
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.index.remove(key)?;
        self.release(idx).map(|(_, v)| v)
    }

    /// Removes and returns the least recently used entry for which `pred`
    /// holds, scanning from the least recently used end.
    pub fn evict_lru_where<F>(&mut self, mut pred: F) -> Option<(K, V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut idx = self.nodes[TAIL].prev;
        while idx != HEAD {
            if let Some((k, v)) = &self.nodes[idx].entry {
                if pred(k, v) {
                    self.index.remove(k);
                    return self.release(idx);
                }
            }
            idx = self.nodes[idx].prev;
        }
        None
    }

    /// Iterates over entries from most to least recently used.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            cache: self,
            idx: self.nodes[HEAD].next,
        }
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.nodes.truncate(2);
        self.nodes[HEAD].next = TAIL;
        self.nodes[TAIL].prev = HEAD;
        self.index.clear();
        self.free.clear();
    }

    fn pop_lru(&mut self) -> Option<(K, V)> {
        let idx = self.nodes[TAIL].prev;
        if idx == HEAD {
            return None;
        }
        if let Some((k, _)) = &self.nodes[idx].entry {
            self.index.remove(k);
        }
        self.release(idx)
    }

    /// Unlinks node `idx`, returns it to the free list and hands back its entry.
    fn release(&mut self, idx: usize) -> Option<(K, V)> {
        self.unlink(idx);
        self.free.push(idx);
        self.nodes[idx].entry.take()
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
    }

    fn push_front(&mut self, idx: usize) {
        let first = self.nodes[HEAD].next;
        self.nodes[idx].prev = HEAD;
        self.nodes[idx].next = first;
        self.nodes[first].prev = idx;
        self.nodes[HEAD].next = idx;
    }
}

/// Iterator over a cache's entries in recency order.
pub struct Iter<'a, K, V> {
    cache: &'a LruCache<K, V>,
    idx: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.idx == TAIL {
            return None;
        }
        let node = &self.cache.nodes[self.idx];
        self.idx = node.next;
        node.entry.as_ref().map(|(k, v)| (k, v))
    }
}
