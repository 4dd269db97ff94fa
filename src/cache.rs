//! Bounded LRU cache for decoded message bodies.
//!
//! A message body may be decoded several times across pipeline phases
//! (enrichment, re-indexing), so decode results are memoized per rowid.
//! The cache is a hash index over a slab-backed intrusive doubly-linked
//! list, giving O(1) get-and-promote and O(1) evict-oldest without relying
//! on ordered-map semantics. It is a pure performance layer: a hit must
//! equal a cold decode.

use std::collections::HashMap;

use crate::models::ParsedBody;

const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Entry {
    key: i64,
    value: ParsedBody,
    prev: usize,
    next: usize,
}

/// Fixed-capacity LRU cache keyed by message rowid.
#[derive(Debug)]
pub struct MessageBodyCache {
    capacity: usize,
    index: HashMap<i64, usize>,
    slab: Vec<Entry>,
    /// Most recently used slot
    head: usize,
    /// Least recently used slot
    tail: usize,
    free: Vec<usize>,
    hits: u64,
    misses: u64,
}

impl MessageBodyCache {
    /// Create a cache holding at most `capacity` decoded bodies.
    ///
    /// A capacity of zero is clamped to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            index: HashMap::with_capacity(capacity),
            slab: Vec::with_capacity(capacity),
            head: NIL,
            tail: NIL,
            free: Vec::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a decoded body, promoting the entry to most-recently-used.
    pub fn get(&mut self, key: i64) -> Option<ParsedBody> {
        let Some(&slot) = self.index.get(&key) else {
            self.misses += 1;
            return None;
        };
        self.hits += 1;
        self.detach(slot);
        self.attach_front(slot);
        Some(self.slab[slot].value.clone())
    }

    /// Insert or replace a decoded body, evicting the LRU entry if full.
    pub fn insert(&mut self, key: i64, value: ParsedBody) {
        if let Some(&slot) = self.index.get(&key) {
            self.slab[slot].value = value;
            self.detach(slot);
            self.attach_front(slot);
            return;
        }

        if self.index.len() >= self.capacity {
            self.evict_oldest();
        }

        let entry = Entry {
            key,
            value,
            prev: NIL,
            next: NIL,
        };
        let slot = if let Some(free) = self.free.pop() {
            self.slab[free] = entry;
            free
        } else {
            self.slab.push(entry);
            self.slab.len() - 1
        };
        self.index.insert(key, slot);
        self.attach_front(slot);
    }

    /// Fetch a body, decoding and caching it on a miss.
    pub fn get_or_insert_with<F>(&mut self, key: i64, decode: F) -> ParsedBody
    where
        F: FnOnce() -> ParsedBody,
    {
        if let Some(hit) = self.get(key) {
            return hit;
        }
        let value = decode();
        self.insert(key, value.clone());
        value
    }

    /// Number of entries currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// True if the key is currently cached (without promoting it).
    #[must_use]
    pub fn contains(&self, key: i64) -> bool {
        self.index.contains_key(&key)
    }

    /// (hits, misses) counters for this cache instance.
    #[must_use]
    pub const fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    fn evict_oldest(&mut self) {
        let slot = self.tail;
        if slot == NIL {
            return;
        }
        self.detach(slot);
        let key = self.slab[slot].key;
        self.index.remove(&key);
        self.slab[slot].value = ParsedBody::default();
        self.free.push(slot);
    }

    fn detach(&mut self, slot: usize) {
        let (prev, next) = (self.slab[slot].prev, self.slab[slot].next);
        if prev == NIL {
            if self.head == slot {
                self.head = next;
            }
        } else {
            self.slab[prev].next = next;
        }
        if next == NIL {
            if self.tail == slot {
                self.tail = prev;
            }
        } else {
            self.slab[next].prev = prev;
        }
        self.slab[slot].prev = NIL;
        self.slab[slot].next = NIL;
    }

    fn attach_front(&mut self, slot: usize) {
        self.slab[slot].prev = NIL;
        self.slab[slot].next = self.head;
        if self.head != NIL {
            self.slab[self.head].prev = slot;
        }
        self.head = slot;
        if self.tail == NIL {
            self.tail = slot;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(text: &str) -> ParsedBody {
        ParsedBody {
            text: Some(text.to_string()),
            ..ParsedBody::default()
        }
    }

    #[test]
    fn hit_returns_inserted_value() {
        let mut cache = MessageBodyCache::new(4);
        cache.insert(1, body("one"));
        assert_eq!(cache.get(1), Some(body("one")));
        assert_eq!(cache.get(2), None);
    }

    #[test]
    fn promotion_changes_eviction_order() {
        // capacity 2, access order [1, 2, 1, 3]: 2 must be evicted, not 1
        let mut cache = MessageBodyCache::new(2);
        cache.insert(1, body("one"));
        cache.insert(2, body("two"));
        assert!(cache.get(1).is_some());
        cache.insert(3, body("three"));

        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.contains(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reinsert_replaces_value() {
        let mut cache = MessageBodyCache::new(2);
        cache.insert(1, body("old"));
        cache.insert(1, body("new"));
        assert_eq!(cache.get(1), Some(body("new")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut cache = MessageBodyCache::new(0);
        cache.insert(1, body("one"));
        assert!(cache.contains(1));
        cache.insert(2, body("two"));
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
    }

    #[test]
    fn get_or_insert_with_decodes_once() {
        let mut cache = MessageBodyCache::new(2);
        let mut calls = 0;
        let first = cache.get_or_insert_with(7, || {
            calls += 1;
            body("seven")
        });
        assert_eq!(first, body("seven"));
        let second = cache.get_or_insert_with(7, || {
            calls += 1;
            body("never")
        });
        assert_eq!(second, body("seven"));
        assert_eq!(calls, 1);
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn eviction_reuses_slots() {
        let mut cache = MessageBodyCache::new(2);
        for key in 0..100 {
            cache.insert(key, body(&key.to_string()));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(98));
        assert!(cache.contains(99));
    }
}
