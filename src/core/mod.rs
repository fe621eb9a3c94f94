//! Decision engine internals
//!
//! Leaves first: `model` and `parser` decode policy documents, `evaluator`
//! matches them against a request, `cache` and `store` wrap the injected
//! collaborators, `dispatch` runs side effects, and `service` ties it all
//! together.

pub mod cache;
pub mod dispatch;
pub mod evaluator;
pub mod model;
pub mod parser;
pub mod service;
#[cfg(feature = "async")]
pub mod service_async;
pub mod store;


pub use cache::{CacheStore, DecisionCache, InMemoryCacheStore};
pub use dispatch::{ActionContext, ActionDispatcher, ActionError, ActionExecutor, LoggingActionExecutor};
pub use evaluator::{Clock, ConditionEvaluator, FixedClock, RuleEvaluator, SystemClock};
pub use parser::PolicyParser;
pub use service::{PolicyEvaluationService, PolicyEvaluationServiceBuilder};
#[cfg(feature = "async")]
pub use service_async::AsyncPolicyEvaluationService;
pub use store::{InMemoryPolicyStore, PolicyStore};
