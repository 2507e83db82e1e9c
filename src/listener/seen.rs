//! Bounded dedupe cache for observed events.
//!
//! Both listener paths (subscription and poll) funnel through one cache so
//! an event is forwarded once no matter how many times it is observed.
//!
//! - **Max capacity:** when full, the oldest entry is evicted on insert.
//! - **TTL:** expired entries are dropped from the front on insert.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::types::EventKey;

const DEFAULT_TTL_SECS: u64 = 86_400; // 24 hours

pub struct SeenCache {
    map: HashMap<EventKey, Instant>,
    order: VecDeque<(EventKey, Instant)>,
    max_size: usize,
    ttl: Duration,
}

impl SeenCache {
    pub fn new(max_size: usize) -> Self {
        Self::with_ttl(max_size, DEFAULT_TTL_SECS)
    }

    pub fn with_ttl(max_size: usize, ttl_secs: u64) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_size: max_size.max(1),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.map.get(key).is_some_and(|t| t.elapsed() < self.ttl)
    }

    /// Record `key`; returns false if it was already present
    pub fn insert(&mut self, key: EventKey) -> bool {
        if self.contains(&key) {
            return false;
        }
        let now = Instant::now();
        self.evict(now);
        self.map.insert(key.clone(), now);
        self.order.push_back((key, now));
        true
    }

    fn evict(&mut self, now: Instant) {
        while let Some((key, inserted)) = self.order.front().cloned() {
            let expired = now.duration_since(inserted) >= self.ttl;
            if !expired && self.map.len() < self.max_size {
                break;
            }
            self.order.pop_front();
            // only drop the map entry if it was not re-inserted later
            if self.map.get(&key) == Some(&inserted) {
                self.map.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    fn key(n: u8) -> EventKey {
        EventKey::Message(B256::repeat_byte(n))
    }

    #[test]
    fn test_insert_and_contains() {
        let mut cache = SeenCache::new(10);
        assert!(cache.insert(key(1)));
        assert!(cache.contains(&key(1)));
        assert!(!cache.insert(key(1)));
        assert!(!cache.contains(&key(2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_block_keys_are_distinct_by_kind() {
        let mut cache = SeenCache::new(10);
        let executed = EventKey::Block {
            chain_id: 1,
            block_number: 5,
            kind: "message_executed",
            log_index: 0,
        };
        let failed = EventKey::Block {
            chain_id: 1,
            block_number: 5,
            kind: "message_failed",
            log_index: 0,
        };
        assert!(cache.insert(executed.clone()));
        assert!(cache.insert(failed));
        assert!(!cache.insert(executed));
    }

    #[test]
    fn test_evicts_oldest_at_capacity() {
        let mut cache = SeenCache::new(3);
        cache.insert(key(1));
        cache.insert(key(2));
        cache.insert(key(3));
        cache.insert(key(4));
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&key(1)));
        assert!(cache.contains(&key(4)));
    }

    #[test]
    fn test_ttl_expiry() {
        let mut cache = SeenCache::with_ttl(10, 0);
        cache.insert(key(1));
        assert!(!cache.contains(&key(1)));
        // expired entries can be re-recorded
        assert!(cache.insert(key(1)));
    }

    #[test]
    fn test_clear() {
        let mut cache = SeenCache::new(10);
        cache.insert(key(1));
        cache.clear();
        assert!(cache.is_empty());
    }
}
