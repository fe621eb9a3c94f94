//! Policy evaluation service
//!
//! Orchestrates one decision: validate, consult the decision cache, load
//! and order candidate policies, search them highest priority first,
//! cache the outcome, then hand the winner's actions to the dispatcher.
//!
//! # Example
//!
//! ```rust
//! use gatekeeper_rs::{
//!     Decision, InMemoryCacheStore, InMemoryPolicyStore, Policy, PolicyEvaluationRequest,
//!     PolicyEvaluationService,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> gatekeeper_rs::Result<()> {
//! let store = Arc::new(InMemoryPolicyStore::with_policies([Policy::new(
//!     "deny-night-deletes",
//!     "No deletes",
//!     100,
//! )
//! .with_rules(r#"{"defaultAction":"DENY"}"#)]));
//!
//! let service =
//!     PolicyEvaluationService::builder(store, Arc::new(InMemoryCacheStore::new_default()))
//!         .build()?;
//!
//! let result = service.evaluate(&PolicyEvaluationRequest::new("EC2_INSTANCE", "DELETE", "alice"))?;
//! assert_eq!(result.decision, Decision::Deny);
//! # Ok(())
//! # }
//! ```

use crate::config::EngineConfig;
use crate::core::cache::{CacheStore, DecisionCache};
use crate::core::dispatch::{
    ActionContext, ActionDispatcher, ActionExecutor, DispatchSnapshot, LoggingActionExecutor,
};
use crate::core::evaluator::{Clock, ConditionEvaluator, RuleEvaluator, SystemClock};
use crate::core::model::{
    Policy, PolicyEvaluationRequest, PolicyEvaluationResult, PolicyTrace,
};
use crate::core::parser::PolicyParser;
use crate::core::store::PolicyStore;
use crate::error::{EngineError, Result, StoreError};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, debug_span, warn};

/// Reason attached to the fallback decision
pub const NO_APPLICABLE_POLICY_REASON: &str = "no applicable policy";

/// Builder for [`PolicyEvaluationService`]
pub struct PolicyEvaluationServiceBuilder {
    store: Arc<dyn PolicyStore>,
    cache_store: Arc<dyn CacheStore>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    executor: Arc<dyn ActionExecutor>,
}

impl PolicyEvaluationServiceBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn action_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Validate the configuration and start the action workers
    pub fn build(self) -> Result<PolicyEvaluationService> {
        self.config.validate()?;

        let cache = DecisionCache::new(
            self.cache_store,
            self.config.default_ttl_minutes,
            self.config.candidate_ttl_minutes,
            self.config.cache_timeout(),
        );
        let conditions =
            ConditionEvaluator::new(Arc::clone(&self.clock), self.config.local_utc_offset_minutes);
        let dispatcher = ActionDispatcher::new(
            self.executor,
            self.config.action_workers,
            self.config.action_queue_capacity,
        );

        Ok(PolicyEvaluationService {
            store: self.store,
            cache,
            parser: PolicyParser::new(),
            conditions,
            rules: RuleEvaluator::new(),
            clock: self.clock,
            dispatcher,
            config: self.config,
        })
    }
}

/// Decision engine entry point
///
/// `Send + Sync`; share it behind an `Arc` and call [`evaluate`](Self::evaluate)
/// from any number of threads.
pub struct PolicyEvaluationService {
    store: Arc<dyn PolicyStore>,
    cache: DecisionCache,
    parser: PolicyParser,
    conditions: ConditionEvaluator,
    rules: RuleEvaluator,
    clock: Arc<dyn Clock>,
    dispatcher: ActionDispatcher,
    config: EngineConfig,
}

impl PolicyEvaluationService {
    /// Start building a service over the given collaborators
    pub fn builder(
        store: Arc<dyn PolicyStore>,
        cache_store: Arc<dyn CacheStore>,
    ) -> PolicyEvaluationServiceBuilder {
        PolicyEvaluationServiceBuilder {
            store,
            cache_store,
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            executor: Arc::new(LoggingActionExecutor),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decide `request`
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` when a required field is missing; nothing else is touched
    /// - `StoreUnavailable` / `StoreTimeout` when candidates cannot be loaded
    ///
    /// # Blocking
    ///
    /// Store and cache calls run inline. Their budgets are checked after each
    /// call returns, so a collaborator that hangs blocks this call for as long
    /// as it hangs. Collaborators must bound their own I/O; callers that need
    /// a hard deadline should go through `AsyncPolicyEvaluationService`
    /// (feature `async`).
    pub fn evaluate(&self, request: &PolicyEvaluationRequest) -> Result<PolicyEvaluationResult> {
        request.validate()?;

        let span = debug_span!(
            "policy_evaluation",
            resource_type = %request.resource_type,
            action = %request.action,
            user_id = %request.user_id
        );
        let _enter = span.enter();

        if let Some(cached) = self.cache.get_decision(request) {
            return Ok(cached);
        }

        // Window checks, time conditions and the result share this instant
        let now = self.clock.now();
        let local_time = self.conditions.local_time_at(now);
        let (candidates, window_change) = self.load_candidates(request.tenant(), now)?;

        let mut trace = Vec::with_capacity(candidates.len());
        let mut winner = None;

        for policy in &candidates {
            let conditions = self
                .parser
                .parse_conditions(policy.conditions.as_deref().unwrap_or_default());
            if !self.conditions.matches_at(&conditions, request, local_time) {
                debug!(policy_key = %policy.policy_key, "conditions not met, skipping policy");
                trace.push(PolicyTrace {
                    policy_key: policy.policy_key.clone(),
                    priority: policy.priority,
                    applied: false,
                    decision: None,
                    matched_rule_id: None,
                });
                continue;
            }

            let rules = self
                .parser
                .parse_rules(policy.rules.as_deref().unwrap_or_default());
            let outcome = self.rules.decide(&rules, request);
            debug!(
                policy_key = %policy.policy_key,
                decision = %outcome.action,
                rule = ?outcome.matched_rule_id,
                "policy applied"
            );
            trace.push(PolicyTrace {
                policy_key: policy.policy_key.clone(),
                priority: policy.priority,
                applied: true,
                decision: Some(outcome.action),
                matched_rule_id: outcome.matched_rule_id.clone(),
            });

            let reason = match &outcome.matched_rule_id {
                Some(rule_id) => format!("policy '{}' matched rule '{}'", policy.name, rule_id),
                None => format!("policy '{}' applied its default action", policy.name),
            };
            let mut result = PolicyEvaluationResult::new(outcome.action, reason, now);
            result.policy_key = Some(policy.policy_key.clone());
            result.policy_name = Some(policy.name.clone());
            winner = Some((policy, result));
            break;
        }

        let (mut result, applied) = match winner {
            Some((policy, result)) => (result, Some(policy)),
            None => {
                let decision = self.config.no_match_decision;
                let reason = format!(
                    "{}, defaulting to {}",
                    NO_APPLICABLE_POLICY_REASON,
                    decision.as_str().to_lowercase()
                );
                debug!(candidates = candidates.len(), "no applicable policy");
                (PolicyEvaluationResult::new(decision, reason, now), None)
            }
        };

        result.expiration_minutes = Some(self.ttl_minutes(request, window_change, now));
        if self.config.include_evaluation_details {
            result.evaluation_details = Some(trace);
        }

        self.cache.put_decision(request, &result);

        if let Some(policy) = applied {
            self.dispatch_actions(policy, request, &result);
        }

        Ok(result)
    }

    /// Decode a wire request and evaluate it
    ///
    /// `null`, non-object and undecodable input is an `InvalidRequest`.
    pub fn evaluate_json(&self, json: &str) -> Result<PolicyEvaluationResult> {
        let request = decode_request(json)?;
        self.evaluate(&request)
    }

    /// Drop cached decisions for one resource type and action
    pub fn evict_policy_cache(&self, resource_type: &str, action: &str) -> usize {
        self.cache.evict_policy_cache(resource_type, action)
    }

    /// Drop every cached decision and candidate list
    pub fn evict_all_policy_cache(&self) -> usize {
        self.cache.evict_all_policy_cache()
    }

    /// Hook for the policy-management path, to be called before a write is
    /// acknowledged
    pub fn on_policy_changed(&self, policy: &Policy) -> usize {
        let removed = self.cache.evict_all_policy_cache();
        debug!(policy_key = %policy.policy_key, removed, "policy changed, cache evicted");
        removed
    }

    pub fn dispatch_stats(&self) -> DispatchSnapshot {
        self.dispatcher.stats()
    }

    /// Stop the action workers after the queued actions finish
    pub fn shutdown(&mut self) {
        self.dispatcher.shutdown();
    }

    /// Enabled, active, effective candidates in evaluation order, plus the
    /// next instant at which a loaded policy enters or leaves its window
    fn load_candidates(
        &self,
        tenant: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Policy>, Option<DateTime<Utc>>)> {
        let cached = if self.config.cache_candidates {
            self.cache.get_candidates(tenant)
        } else {
            None
        };

        let mut policies = match cached {
            Some(policies) => policies,
            None => {
                let mut policies = self.query(|store| store.find_global_policies(now))?;
                if let Some(tenant) = tenant {
                    policies.extend(self.query(|store| store.find_active_policies(tenant, now))?);
                }

                let mut seen = HashSet::new();
                policies.retain(|p| seen.insert(p.policy_key.clone()));

                if self.config.cache_candidates {
                    let max_ttl = next_window_change(&policies, now)
                        .and_then(|at| (at - now).to_std().ok());
                    self.cache.put_candidates(tenant, &policies, max_ttl);
                }
                policies
            }
        };

        let window_change = next_window_change(&policies, now);
        policies.retain(|p| p.is_candidate() && p.is_effective_at(now));
        policies.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.policy_key.cmp(&b.policy_key))
        });
        Ok((policies, window_change))
    }

    /// Run one store query under the configured budget
    fn query<F>(&self, f: F) -> Result<Vec<Policy>>
    where
        F: FnOnce(&dyn PolicyStore) -> std::result::Result<Vec<Policy>, StoreError>,
    {
        let started = Instant::now();
        let outcome = f(self.store.as_ref());
        let elapsed = started.elapsed();

        let policies = outcome.map_err(|e| {
            warn!(error = %e, "policy store query failed");
            EngineError::from(e)
        })?;

        let budget = self.config.store_timeout();
        if elapsed > budget {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.config.store_timeout_ms,
                "policy store query over budget"
            );
            return Err(EngineError::StoreTimeout {
                elapsed_ms: elapsed.as_millis() as u64,
                budget_ms: self.config.store_timeout_ms,
            });
        }
        Ok(policies)
    }

    /// Cache lifetime for a fresh result
    ///
    /// Capped by the request's expiry and by the next policy window change,
    /// so a decision never outlives the policy set it was computed from.
    fn ttl_minutes(
        &self,
        request: &PolicyEvaluationRequest,
        window_change: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> u32 {
        [request.expires_at, window_change]
            .into_iter()
            .flatten()
            .fold(self.cache.default_ttl_minutes(), |ttl, deadline| {
                let remaining = (deadline - now).num_minutes();
                if remaining <= 0 {
                    0
                } else {
                    ttl.min(u32::try_from(remaining).unwrap_or(u32::MAX))
                }
            })
    }

    fn dispatch_actions(
        &self,
        policy: &Policy,
        request: &PolicyEvaluationRequest,
        result: &PolicyEvaluationResult,
    ) {
        let Some(raw) = policy.actions.as_deref() else {
            return;
        };
        let actions = self.parser.parse_actions(raw);
        if actions.is_empty() {
            return;
        }

        debug!(policy_key = %policy.policy_key, count = actions.len(), "dispatching policy actions");
        self.dispatcher.dispatch(
            actions,
            ActionContext {
                policy_key: policy.policy_key.clone(),
                decision: result.decision,
                user_id: request.user_id.clone(),
                tenant_key: request.tenant().map(str::to_string),
                resource_type: request.resource_type.clone(),
                resource_id: request.resource_id.clone(),
                client_ip: request.client_ip.clone(),
            },
        );
    }
}

/// Earliest `effective_from` / `effective_until` strictly after `now`
fn next_window_change(policies: &[Policy], now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    policies
        .iter()
        .flat_map(|p| [p.effective_from, p.effective_until])
        .flatten()
        .filter(|at| *at > now)
        .min()
}

/// Decode an inbound wire request
pub fn decode_request(json: &str) -> Result<PolicyEvaluationRequest> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| EngineError::InvalidRequest(format!("request is not valid JSON: {}", e)))?;

    match value {
        serde_json::Value::Null => Err(EngineError::InvalidRequest(
            "request is null".to_string(),
        )),
        serde_json::Value::Object(_) => serde_json::from_value(value)
            .map_err(|e| EngineError::InvalidRequest(format!("undecodable request: {}", e))),
        _ => Err(EngineError::InvalidRequest(
            "request must be a JSON object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::InMemoryCacheStore;
    use crate::core::evaluator::FixedClock;
    use crate::core::model::Decision;
    use crate::core::store::InMemoryPolicyStore;
    use chrono::{Duration, TimeZone};

    fn service(store: Arc<InMemoryPolicyStore>) -> PolicyEvaluationService {
        PolicyEvaluationService::builder(store, Arc::new(InMemoryCacheStore::new(64)))
            .build()
            .unwrap()
    }

    fn request() -> PolicyEvaluationRequest {
        PolicyEvaluationRequest::new("EC2_INSTANCE", "CREATE", "alice")
    }

    #[test]
    fn test_builder_rejects_bad_config() {
        let config = EngineConfig {
            action_workers: 0,
            ..EngineConfig::default()
        };
        let err = PolicyEvaluationService::builder(
            Arc::new(InMemoryPolicyStore::new()),
            Arc::new(InMemoryCacheStore::new(8)),
        )
        .config(config)
        .build()
        .err()
        .unwrap();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_tie_break_by_policy_key() {
        let store = Arc::new(InMemoryPolicyStore::with_policies([
            Policy::new("b-allow", "B", 10).with_rules(r#"{"defaultAction":"ALLOW"}"#),
            Policy::new("a-deny", "A", 10).with_rules(r#"{"defaultAction":"DENY"}"#),
        ]));
        let result = service(store).evaluate(&request()).unwrap();
        assert_eq!(result.decision, Decision::Deny);
        assert_eq!(result.policy_key.as_deref(), Some("a-deny"));
    }

    #[test]
    fn test_reason_names_rule() {
        let store = Arc::new(InMemoryPolicyStore::with_policies([Policy::new(
            "p1", "Guard", 1,
        )
        .with_rules(
            r#"{"defaultAction":"ALLOW","rules":[{"id":"r9","action":"DENY","priority":3}]}"#,
        )]));
        let result = service(store).evaluate(&request()).unwrap();
        assert_eq!(result.reason, "policy 'Guard' matched rule 'r9'");
        assert_eq!(result.policy_name.as_deref(), Some("Guard"));
    }

    #[test]
    fn test_fail_closed_when_configured() {
        let config = EngineConfig {
            no_match_decision: Decision::Deny,
            ..EngineConfig::default()
        };
        let service = PolicyEvaluationService::builder(
            Arc::new(InMemoryPolicyStore::new()),
            Arc::new(InMemoryCacheStore::new(8)),
        )
        .config(config)
        .build()
        .unwrap();

        let result = service.evaluate(&request()).unwrap();
        assert_eq!(result.decision, Decision::Deny);
        assert_eq!(result.reason, "no applicable policy, defaulting to deny");
    }

    #[test]
    fn test_expiry_caps_ttl() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let cache = Arc::new(InMemoryCacheStore::new(8));
        let service = PolicyEvaluationService::builder(Arc::new(InMemoryPolicyStore::new()), cache.clone())
            .clock(Arc::new(FixedClock::new(now)))
            .build()
            .unwrap();

        let soon = request().expiring_at(now + Duration::minutes(2));
        assert_eq!(service.evaluate(&soon).unwrap().expiration_minutes, Some(2));

        let expired = request()
            .with_tenant("acme")
            .expiring_at(now - Duration::minutes(1));
        assert_eq!(service.evaluate(&expired).unwrap().expiration_minutes, Some(0));
        assert!(!cache.contains(&crate::core::cache::decision_key(&expired)));
    }

    #[test]
    fn test_trace_lists_visited_policies() {
        let config = EngineConfig {
            include_evaluation_details: true,
            ..EngineConfig::default()
        };
        let store = Arc::new(InMemoryPolicyStore::with_policies([
            Policy::new("skip", "Skip", 100)
                .with_conditions(r#"{"userConditions":{"allowedUsers":["bob"]}}"#),
            Policy::new("hit", "Hit", 50).with_rules(r#"{"defaultAction":"DENY"}"#),
            Policy::new("never", "Never", 1),
        ]));
        let service = PolicyEvaluationService::builder(store, Arc::new(InMemoryCacheStore::new(8)))
            .config(config)
            .build()
            .unwrap();

        let details = service.evaluate(&request()).unwrap().evaluation_details.unwrap();
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].policy_key, "skip");
        assert!(!details[0].applied);
        assert_eq!(details[1].policy_key, "hit");
        assert!(details[1].applied);
        assert_eq!(details[1].decision, Some(Decision::Deny));
    }

    #[test]
    fn test_decode_request_rejects_non_objects() {
        for input in ["null", "[]", "42", "{ invalid json }", r#"{"userId":"a"}"#] {
            assert!(
                matches!(decode_request(input), Err(EngineError::InvalidRequest(_))),
                "accepted {}",
                input
            );
        }
    }
}
