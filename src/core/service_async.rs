//! Async façade over [`PolicyEvaluationService`]
//!
//! Evaluation is synchronous and may block on the collaborators. This
//! wrapper moves it onto tokio's blocking pool and enforces a hard
//! deadline, so async callers are never held longer than the store budget.

use crate::core::model::{PolicyEvaluationRequest, PolicyEvaluationResult};
use crate::core::service::PolicyEvaluationService;
use crate::error::{EngineError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Cloneable async handle to a shared service
#[derive(Clone)]
pub struct AsyncPolicyEvaluationService {
    inner: Arc<PolicyEvaluationService>,
    deadline: Duration,
}

impl AsyncPolicyEvaluationService {
    /// Deadline defaults to the configured store budget
    pub fn new(inner: Arc<PolicyEvaluationService>) -> Self {
        let deadline = inner.config().store_timeout();
        AsyncPolicyEvaluationService { inner, deadline }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn inner(&self) -> &Arc<PolicyEvaluationService> {
        &self.inner
    }

    /// Evaluate on the blocking pool
    ///
    /// An overrun yields `StoreTimeout`; the blocking task keeps running to
    /// completion and its result is discarded.
    pub async fn evaluate(&self, request: PolicyEvaluationRequest) -> Result<PolicyEvaluationResult> {
        // Reject before spawning anything
        request.validate()?;

        let service = Arc::clone(&self.inner);
        let task = tokio::task::spawn_blocking(move || service.evaluate(&request));

        match tokio::time::timeout(self.deadline, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => {
                warn!(error = %join_error, "evaluation task failed");
                Err(EngineError::Aborted(join_error.to_string()))
            }
            Err(_) => {
                let budget_ms = self.deadline.as_millis() as u64;
                warn!(budget_ms, "evaluation exceeded deadline");
                Err(EngineError::StoreTimeout {
                    elapsed_ms: budget_ms,
                    budget_ms,
                })
            }
        }
    }

    /// Decode and evaluate a wire request
    pub async fn evaluate_json(&self, json: &str) -> Result<PolicyEvaluationResult> {
        let request = crate::core::service::decode_request(json)?;
        self.evaluate(request).await
    }
}
