//! # Gatekeeper - Policy Decision Engine
//!
//! `gatekeeper-rs` answers one question: may this actor perform this action
//! on this resource? It evaluates a prioritized set of stored policies
//! against the request and returns `ALLOW` or `DENY`.
//!
//! - **Priority search**: candidates are visited highest priority first and
//!   the first policy whose conditions match decides
//! - **Conditions**: time windows (wrapping midnight), client IP, actor and
//!   resource allow/deny lists, combined with `ALL` or `ANY`
//! - **Decision cache**: TTL-keyed, evicted by resource type and action
//! - **Actions**: side effects of a decision, executed off the hot path
//! - **Degrades, never crashes**: malformed policy data and cache outages
//!   are logged and absorbed
//!
//! ## Quick Start
//!
//! ```rust
//! use gatekeeper_rs::{
//!     Decision, InMemoryCacheStore, InMemoryPolicyStore, Policy, PolicyEvaluationRequest,
//!     PolicyEvaluationService, Result,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> Result<()> {
//! let store = Arc::new(InMemoryPolicyStore::with_policies([
//!     Policy::new("office-network", "Office network only", 100)
//!         .with_conditions(r#"{"ipConditions":{"deniedIps":["203.0.113.9"]}}"#)
//!         .with_rules(r#"{"defaultAction":"ALLOW"}"#),
//!     Policy::new("default-deny", "Deny everything else", 1)
//!         .with_rules(r#"{"defaultAction":"DENY"}"#),
//! ]));
//! let cache = Arc::new(InMemoryCacheStore::new_default());
//!
//! let service = PolicyEvaluationService::builder(store, cache).build()?;
//!
//! let request = PolicyEvaluationRequest::new("EC2_INSTANCE", "CREATE", "alice")
//!     .with_client_ip("203.0.113.9");
//! let result = service.evaluate(&request)?;
//!
//! assert_eq!(result.decision, Decision::Deny);
//! assert_eq!(result.policy_key.as_deref(), Some("default-deny"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```rust,no_run
//! use gatekeeper_rs::{EngineConfig, InMemoryCacheStore, InMemoryPolicyStore, PolicyEvaluationService};
//! use std::sync::Arc;
//!
//! # fn main() -> gatekeeper_rs::Result<()> {
//! let config = EngineConfig::from_file("/etc/gatekeeper/engine.toml")?;
//! let service = PolicyEvaluationService::builder(
//!     Arc::new(InMemoryPolicyStore::new()),
//!     Arc::new(InMemoryCacheStore::new_default()),
//! )
//! .config(config)
//! .build()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;

pub use crate::config::EngineConfig;
pub use crate::core::{
    cache::{CacheStore, DecisionCache, InMemoryCacheStore},
    dispatch::{
        ActionContext, ActionError, ActionExecutor, DispatchSnapshot, LoggingActionExecutor,
    },
    evaluator::{Clock, FixedClock, SystemClock},
    model::{
        ActionStatus, ActionType, ConditionEvaluationMode, Decision, IpConditions, Policy,
        PolicyAction, PolicyConditions, PolicyEvaluationRequest, PolicyEvaluationResult,
        PolicyRule, PolicyRules, PolicyStatus, PolicyTrace, ResourceConditions, TimeConditions,
        TimeRange, UserConditions,
    },
    parser::PolicyParser,
    service::{PolicyEvaluationService, PolicyEvaluationServiceBuilder},
    store::{InMemoryPolicyStore, PolicyStore},
};
pub use crate::error::{CacheError, EngineError, Result, StoreError};

#[cfg(feature = "async")]
pub use crate::core::service_async::AsyncPolicyEvaluationService;
