//! Policy store contract and an in-memory implementation
//!
//! The engine only reads policies. Creating, updating and deleting them
//! belongs to the policy-management path, which must evict the decision
//! cache before acknowledging a write.

use crate::core::model::Policy;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Read side of the policy store (external collaborator)
///
/// `now` is the evaluation instant. The engine applies the validity window
/// itself and may cache the returned list, so implementations should return
/// policies whose window opens later too; dropping them hides the policy
/// until the cached list expires.
pub trait PolicyStore: Send + Sync {
    /// Policies without a tenant
    fn find_global_policies(&self, now: DateTime<Utc>) -> Result<Vec<Policy>, StoreError>;

    /// Enabled, active policies scoped to `tenant_key`
    fn find_active_policies(
        &self,
        tenant_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Policy>, StoreError>;
}

/// Policy store backed by a vector, with query accounting
///
/// Returns policies whatever their validity window; the window is checked
/// at evaluation time.
#[derive(Default)]
pub struct InMemoryPolicyStore {
    policies: RwLock<Vec<Policy>>,
    queries: AtomicU64,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policies(policies: impl IntoIterator<Item = Policy>) -> Self {
        let store = Self::new();
        for policy in policies {
            store.upsert(policy);
        }
        store
    }

    /// Insert or replace by `policy_key`
    pub fn upsert(&self, policy: Policy) {
        let mut policies = self.policies.write();
        match policies.iter_mut().find(|p| p.policy_key == policy.policy_key) {
            Some(existing) => *existing = policy,
            None => policies.push(policy),
        }
    }

    pub fn remove(&self, policy_key: &str) -> bool {
        let mut policies = self.policies.write();
        let before = policies.len();
        policies.retain(|p| p.policy_key != policy_key);
        policies.len() != before
    }

    pub fn get(&self, policy_key: &str) -> Option<Policy> {
        self.policies
            .read()
            .iter()
            .find(|p| p.policy_key == policy_key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.policies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.read().is_empty()
    }

    /// Number of find_* queries served so far
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    fn select(&self, filter: impl Fn(&Policy) -> bool) -> Vec<Policy> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.policies
            .read()
            .iter()
            .filter(|p| filter(*p))
            .cloned()
            .collect()
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn find_global_policies(&self, _now: DateTime<Utc>) -> Result<Vec<Policy>, StoreError> {
        Ok(self.select(|p| p.is_global()))
    }

    fn find_active_policies(
        &self,
        tenant_key: &str,
        _now: DateTime<Utc>,
    ) -> Result<Vec<Policy>, StoreError> {
        Ok(self.select(|p| p.tenant_key.as_deref() == Some(tenant_key) && p.is_candidate()))
    }
}
