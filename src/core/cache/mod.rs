//! Decision cache
//!
//! Wraps an injected TTL-capable key-value store with the engine's key
//! scheme. Every failure here degrades: a broken read is a miss, a broken
//! write skips caching, both are logged and neither reaches the caller.
//!
//! Key scheme:
//! - decisions: `policy_evaluation:{resourceType}:{action}:{userId}[:{tenantKey}]`
//! - candidates: `policy_candidates:global` or `policy_candidates:tenant:{tenantKey}`
//!
//! Components must not contain `:`; requests are validated for this before
//! a key is built.

mod memory;

pub use memory::InMemoryCacheStore;

use crate::core::model::{Policy, PolicyEvaluationRequest, PolicyEvaluationResult};
use crate::error::CacheError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DECISION_CACHE_PREFIX: &str = "policy_evaluation:";
pub const CANDIDATE_CACHE_PREFIX: &str = "policy_candidates:";

/// Key-value store with TTL (external collaborator)
///
/// Implementations must be safe to call from many threads at once and
/// should bound their own I/O latency.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Delete every key starting with `pattern`; returns how many were removed
    fn delete_by_pattern(&self, pattern: &str) -> Result<usize, CacheError>;
}

/// Decision key for a request
pub fn decision_key(request: &PolicyEvaluationRequest) -> String {
    let mut key = format!(
        "{}{}:{}:{}",
        DECISION_CACHE_PREFIX, request.resource_type, request.action, request.user_id
    );
    if let Some(tenant) = request.tenant() {
        key.push(':');
        key.push_str(tenant);
    }
    key
}

/// Prefix covering every decision for a resource type and action
pub fn decision_prefix(resource_type: &str, action: &str) -> String {
    format!("{}{}:{}:", DECISION_CACHE_PREFIX, resource_type, action)
}

/// Candidate-list key for a tenant scope
///
/// The global scope and tenant scopes use different key shapes, so no
/// tenant key can alias the global list.
pub fn candidate_key(tenant_key: Option<&str>) -> String {
    match tenant_key {
        Some(tenant) => format!("{}tenant:{}", CANDIDATE_CACHE_PREFIX, tenant),
        None => format!("{}global", CANDIDATE_CACHE_PREFIX),
    }
}

fn minutes(m: u32) -> Duration {
    Duration::from_secs(u64::from(m) * 60)
}

/// Engine-facing view of the cache store
pub struct DecisionCache {
    store: Arc<dyn CacheStore>,
    default_ttl_minutes: u32,
    candidate_ttl_minutes: u32,
    read_budget: Duration,
}

impl DecisionCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        default_ttl_minutes: u32,
        candidate_ttl_minutes: u32,
        read_budget: Duration,
    ) -> Self {
        DecisionCache {
            store,
            default_ttl_minutes,
            candidate_ttl_minutes,
            read_budget,
        }
    }

    pub fn default_ttl_minutes(&self) -> u32 {
        self.default_ttl_minutes
    }

    /// Cached decision for `request`, if any
    pub fn get_decision(&self, request: &PolicyEvaluationRequest) -> Option<PolicyEvaluationResult> {
        self.read(&decision_key(request))
    }

    /// Cache `result` using its expiration hint, or the default TTL
    ///
    /// A hint of zero minutes means "do not cache".
    pub fn put_decision(&self, request: &PolicyEvaluationRequest, result: &PolicyEvaluationResult) {
        let ttl_minutes = result.expiration_minutes.unwrap_or(self.default_ttl_minutes);
        if ttl_minutes == 0 {
            debug!("decision not cached: zero ttl");
            return;
        }
        self.write(&decision_key(request), result, minutes(ttl_minutes));
    }

    pub fn get_candidates(&self, tenant_key: Option<&str>) -> Option<Vec<Policy>> {
        self.read(&candidate_key(tenant_key))
    }

    /// Cache a candidate list; `max_ttl` shortens the configured TTL
    ///
    /// A zero `max_ttl` skips caching.
    pub fn put_candidates(
        &self,
        tenant_key: Option<&str>,
        policies: &[Policy],
        max_ttl: Option<Duration>,
    ) {
        let ttl = match max_ttl {
            Some(cap) => cap.min(minutes(self.candidate_ttl_minutes)),
            None => minutes(self.candidate_ttl_minutes),
        };
        if ttl.is_zero() {
            debug!("candidate list not cached: zero ttl");
            return;
        }
        self.write(&candidate_key(tenant_key), policies, ttl);
    }

    /// Drop one cached decision
    pub fn evict_decision(&self, request: &PolicyEvaluationRequest) {
        let key = decision_key(request);
        if let Err(e) = self.store.delete(&key) {
            warn!(key = %key, error = %e, "cache delete failed");
        }
    }

    /// Drop every cached decision for `resource_type`/`action`
    pub fn evict_policy_cache(&self, resource_type: &str, action: &str) -> usize {
        self.delete_prefix(&decision_prefix(resource_type, action))
    }

    /// Drop every cached decision and candidate list
    pub fn evict_all_policy_cache(&self) -> usize {
        self.delete_prefix(DECISION_CACHE_PREFIX) + self.delete_prefix(CANDIDATE_CACHE_PREFIX)
    }

    fn delete_prefix(&self, prefix: &str) -> usize {
        match self.store.delete_by_pattern(prefix) {
            Ok(removed) => {
                debug!(prefix, removed, "evicted cache entries");
                removed
            }
            Err(e) => {
                warn!(prefix, error = %e, "cache eviction failed");
                0
            }
        }
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let started = Instant::now();
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "cache read failed, evaluating directly");
                return None;
            }
        };

        let elapsed = started.elapsed();
        if elapsed > self.read_budget {
            warn!(
                key,
                elapsed_ms = elapsed.as_millis() as u64,
                "cache read over budget, treating as miss"
            );
            return None;
        }

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "undecodable cache entry, treating as miss");
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %CacheError::Serialization(e.to_string()), "cache write skipped");
                return;
            }
        };
        if let Err(e) = self.store.set_with_ttl(key, raw, ttl) {
            warn!(key, error = %e, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Decision;
    use chrono::Utc;

    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection reset".into()))
        }
        fn set_with_ttl(&self, _: &str, _: String, _: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection reset".into()))
        }
        fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection reset".into()))
        }
        fn delete_by_pattern(&self, _pattern: &str) -> Result<usize, CacheError> {
            Err(CacheError::Unavailable("connection reset".into()))
        }
    }

    fn cache(store: Arc<dyn CacheStore>) -> DecisionCache {
        DecisionCache::new(store, 5, 5, Duration::from_secs(1))
    }

    fn request() -> PolicyEvaluationRequest {
        PolicyEvaluationRequest::new("EC2_INSTANCE", "CREATE", "alice")
    }

    #[test]
    fn test_key_scheme() {
        assert_eq!(
            decision_key(&request()),
            "policy_evaluation:EC2_INSTANCE:CREATE:alice"
        );
        assert_eq!(
            decision_key(&request().with_tenant("acme")),
            "policy_evaluation:EC2_INSTANCE:CREATE:alice:acme"
        );
        assert_eq!(
            decision_prefix("EC2_INSTANCE", "CREATE"),
            "policy_evaluation:EC2_INSTANCE:CREATE:"
        );
        assert_eq!(candidate_key(None), "policy_candidates:global");
        assert_eq!(candidate_key(Some("acme")), "policy_candidates:tenant:acme");
        assert_ne!(candidate_key(Some("global")), candidate_key(None));
    }

    #[test]
    fn test_decision_round_trip() {
        let store = Arc::new(InMemoryCacheStore::new(16));
        let cache = cache(store.clone());
        let result = PolicyEvaluationResult::new(Decision::Deny, "blocked", Utc::now());

        assert!(cache.get_decision(&request()).is_none());
        cache.put_decision(&request(), &result);

        let cached = cache.get_decision(&request()).unwrap();
        assert_eq!(cached.decision, Decision::Deny);
        assert_eq!(cached.reason, "blocked");
        assert!(cache.get_decision(&request().with_tenant("acme")).is_none());
    }

    #[test]
    fn test_zero_ttl_is_not_cached() {
        let store = Arc::new(InMemoryCacheStore::new(16));
        let cache = cache(store.clone());
        let mut result = PolicyEvaluationResult::new(Decision::Allow, "ok", Utc::now());
        result.expiration_minutes = Some(0);

        cache.put_decision(&request(), &result);
        assert!(store.is_empty());
    }

    #[test]
    fn test_broken_store_degrades() {
        let cache = cache(Arc::new(BrokenStore));
        let result = PolicyEvaluationResult::new(Decision::Allow, "ok", Utc::now());

        cache.put_decision(&request(), &result);
        assert!(cache.get_decision(&request()).is_none());
        assert!(cache.get_candidates(None).is_none());
        assert_eq!(cache.evict_all_policy_cache(), 0);
        cache.evict_decision(&request());
    }

    #[test]
    fn test_garbage_entry_is_a_miss() {
        let store = Arc::new(InMemoryCacheStore::new(16));
        store
            .set_with_ttl(&decision_key(&request()), "not json".into(), Duration::from_secs(60))
            .unwrap();
        assert!(cache(store).get_decision(&request()).is_none());
    }

    #[test]
    fn test_candidate_ttl_cap() {
        let store = Arc::new(InMemoryCacheStore::new(16));
        let cache = cache(store.clone());
        let policies = [Policy::new("p1", "P1", 1)];

        cache.put_candidates(None, &policies, Some(Duration::ZERO));
        assert!(store.is_empty());

        cache.put_candidates(None, &policies, Some(Duration::from_millis(20)));
        assert!(cache.get_candidates(None).is_some());
        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get_candidates(None).is_none());
    }

    #[test]
    fn test_evict_all_covers_candidates() {
        let store = Arc::new(InMemoryCacheStore::new(16));
        let cache = cache(store.clone());
        let result = PolicyEvaluationResult::new(Decision::Allow, "ok", Utc::now());

        cache.put_decision(&request(), &result);
        cache.put_candidates(Some("acme"), &[Policy::new("p1", "P1", 1)], None);
        store
            .set_with_ttl("session:alice", "x".into(), Duration::from_secs(60))
            .unwrap();

        assert_eq!(cache.get_candidates(Some("acme")).unwrap().len(), 1);
        assert_eq!(cache.evict_all_policy_cache(), 2);
        assert_eq!(store.keys(), vec!["session:alice".to_string()]);
    }
}
