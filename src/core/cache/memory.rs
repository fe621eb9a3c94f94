//! In-process LRU cache store with per-entry TTL
//!
//! Reference [`CacheStore`] for single-node deployments and tests. Entries
//! expire lazily on read; the LRU bound keeps memory flat under key churn.

use super::CacheStore;
use crate::error::CacheError;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// LRU + TTL key-value store
pub struct InMemoryCacheStore {
    cache: Mutex<LruCache<String, CacheEntry>>,
}

impl InMemoryCacheStore {
    /// Create a store holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        InMemoryCacheStore {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Create a store with the default capacity (10,000 entries)
    pub fn new_default() -> Self {
        Self::new(10_000)
    }

    /// Entries currently held, including ones that expired but were not read yet
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    /// Whether a live (unexpired) entry exists for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.cache
            .lock()
            .peek(key)
            .is_some_and(|entry| entry.expires_at > Instant::now())
    }

    /// All keys currently held, most recently used first
    pub fn keys(&self) -> Vec<String> {
        self.cache.lock().iter().map(|(k, _)| k.clone()).collect()
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new_default()
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut cache = self.cache.lock();
        let expired = match cache.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()))
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.pop(key);
        }
        Ok(None)
    }

    fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.cache.lock().put(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.cache.lock().pop(key);
        Ok(())
    }

    /// `pattern` is a key prefix, optionally written with a trailing `*`
    fn delete_by_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        let mut cache = self.cache.lock();

        let doomed: Vec<String> = cache
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &doomed {
            cache.pop(key);
        }
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_cache_basic() {
        let cache = InMemoryCacheStore::new(10);

        assert!(cache.get("a").unwrap().is_none());

        cache.set_with_ttl("a", "1".into(), MINUTE).unwrap();
        assert_eq!(cache.get("a").unwrap().as_deref(), Some("1"));

        cache.set_with_ttl("a", "2".into(), MINUTE).unwrap();
        assert_eq!(cache.get("a").unwrap().as_deref(), Some("2"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_lru_eviction() {
        let cache = InMemoryCacheStore::new(2);

        cache.set_with_ttl("a", "1".into(), MINUTE).unwrap();
        cache.set_with_ttl("b", "2".into(), MINUTE).unwrap();
        cache.set_with_ttl("c", "3".into(), MINUTE).unwrap(); // Should evict a

        assert!(cache.get("a").unwrap().is_none());
        assert!(cache.get("b").unwrap().is_some());
        assert!(cache.get("c").unwrap().is_some());
    }

    #[test]
    fn test_entries_expire() {
        let cache = InMemoryCacheStore::new(10);
        cache
            .set_with_ttl("short", "x".into(), Duration::from_millis(20))
            .unwrap();
        cache.set_with_ttl("long", "y".into(), MINUTE).unwrap();

        std::thread::sleep(Duration::from_millis(40));

        assert!(!cache.contains("short"));
        assert!(cache.get("short").unwrap().is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long").unwrap().as_deref(), Some("y"));
    }

    #[test]
    fn test_delete() {
        let cache = InMemoryCacheStore::new(10);
        cache.set_with_ttl("a", "1".into(), MINUTE).unwrap();
        cache.delete("a").unwrap();
        cache.delete("missing").unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_delete_by_pattern() {
        let cache = InMemoryCacheStore::new(10);
        cache.set_with_ttl("policy_evaluation:EC2:CREATE:alice", "1".into(), MINUTE).unwrap();
        cache.set_with_ttl("policy_evaluation:EC2:CREATE:bob", "1".into(), MINUTE).unwrap();
        cache.set_with_ttl("policy_evaluation:EC2:DELETE:alice", "1".into(), MINUTE).unwrap();

        assert_eq!(cache.delete_by_pattern("policy_evaluation:EC2:CREATE:*").unwrap(), 2);
        assert_eq!(cache.keys(), vec!["policy_evaluation:EC2:DELETE:alice".to_string()]);

        assert_eq!(cache.delete_by_pattern("policy_evaluation:").unwrap(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_still_usable() {
        let cache = InMemoryCacheStore::new(0);
        cache.set_with_ttl("a", "1".into(), MINUTE).unwrap();
        assert_eq!(cache.len(), 1);
    }
}
