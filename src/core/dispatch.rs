//! Fire-and-forget execution of policy actions
//!
//! The decision path hands actions to a bounded queue and returns
//! immediately. Background workers execute them and record the outcome.
//! Nothing that happens here (slow executors, failures, panics, a full
//! queue) can delay or change a decision that was already returned.

use crate::core::model::{ActionStatus, Decision, PolicyAction};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{info, warn};

/// Failure reported by an [`ActionExecutor`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("action failed: {0}")]
pub struct ActionError(pub String);

/// What an action is executed on behalf of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionContext {
    pub policy_key: String,
    pub decision: Decision,
    pub user_id: String,
    pub tenant_key: Option<String>,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub client_ip: Option<String>,
}

/// Performs the side effect of one action
pub trait ActionExecutor: Send + Sync {
    fn execute(&self, action: &PolicyAction, context: &ActionContext) -> Result<(), ActionError>;
}

/// Executor that only records actions in the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingActionExecutor;

impl ActionExecutor for LoggingActionExecutor {
    fn execute(&self, action: &PolicyAction, context: &ActionContext) -> Result<(), ActionError> {
        info!(
            action_type = %action.action_type,
            policy_key = %context.policy_key,
            user_id = %context.user_id,
            duration_minutes = ?action.duration,
            "policy action: {}",
            action.description
        );
        Ok(())
    }
}

/// Counters for dispatched actions
#[derive(Debug, Default)]
pub struct DispatchStats {
    queued: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub queued: u64,
    pub executed: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl DispatchSnapshot {
    /// Actions that reached a terminal status
    pub fn completed(&self) -> u64 {
        self.executed + self.failed
    }
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

struct ActionJob {
    action: PolicyAction,
    context: Arc<ActionContext>,
}

/// Bounded queue plus worker threads
pub struct ActionDispatcher {
    sender: Option<Sender<ActionJob>>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<DispatchStats>,
}

impl ActionDispatcher {
    /// Start `workers` threads draining a queue of `capacity` jobs
    pub fn new(executor: Arc<dyn ActionExecutor>, workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = channel::bounded(capacity.max(1));
        let stats = Arc::new(DispatchStats::default());

        let workers = (0..workers.max(1))
            .filter_map(|idx| {
                let receiver = receiver.clone();
                let executor = Arc::clone(&executor);
                let stats = Arc::clone(&stats);
                thread::Builder::new()
                    .name(format!("policy-action-{}", idx))
                    .spawn(move || run_worker(receiver, executor, stats))
                    .map_err(|e| warn!(error = %e, "failed to spawn action worker"))
                    .ok()
            })
            .collect();

        ActionDispatcher {
            sender: Some(sender),
            workers,
            stats,
        }
    }

    /// Queue `actions` (highest priority first) without blocking
    ///
    /// Actions that do not fit in the queue are dropped and counted.
    pub fn dispatch(&self, mut actions: Vec<PolicyAction>, context: ActionContext) {
        let Some(sender) = &self.sender else {
            self.stats
                .dropped
                .fetch_add(actions.len() as u64, Ordering::Relaxed);
            warn!(policy_key = %context.policy_key, "dispatcher stopped, actions dropped");
            return;
        };

        actions.sort_by(|a, b| b.priority.cmp(&a.priority));
        let context = Arc::new(context);

        for mut action in actions {
            action.status = ActionStatus::Pending;
            let job = ActionJob {
                action,
                context: Arc::clone(&context),
            };
            match sender.try_send(job) {
                Ok(()) => {
                    self.stats.queued.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Full(job)) | Err(TrySendError::Disconnected(job)) => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        action_type = %job.action.action_type,
                        policy_key = %job.context.policy_key,
                        "action queue unavailable, action dropped"
                    );
                }
            }
        }
    }

    pub fn stats(&self) -> DispatchSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting actions and wait for queued ones to finish
    pub fn shutdown(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for ActionDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    receiver: Receiver<ActionJob>,
    executor: Arc<dyn ActionExecutor>,
    stats: Arc<DispatchStats>,
) {
    for ActionJob {
        mut action,
        context,
    } in receiver.iter()
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| executor.execute(&action, &context)))
            .unwrap_or_else(|_| Err(ActionError("executor panicked".to_string())));

        match outcome {
            Ok(()) => {
                action.status.transition(ActionStatus::Executed);
                stats.executed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                action.status.transition(ActionStatus::Failed);
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    action_type = %action.action_type,
                    policy_key = %context.policy_key,
                    status = ?action.status,
                    error = %e,
                    "policy action failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::ActionType;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    fn context() -> ActionContext {
        ActionContext {
            policy_key: "p1".into(),
            decision: Decision::Deny,
            user_id: "mallory".into(),
            tenant_key: None,
            resource_type: "EC2_INSTANCE".into(),
            resource_id: None,
            client_ip: Some("1.2.3.4".into()),
        }
    }

    fn wait_for(dispatcher: &ActionDispatcher, completed: u64) -> DispatchSnapshot {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let stats = dispatcher.stats();
            if stats.completed() >= completed || Instant::now() > deadline {
                return stats;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<ActionType>>,
    }

    impl ActionExecutor for Recorder {
        fn execute(&self, action: &PolicyAction, _: &ActionContext) -> Result<(), ActionError> {
            self.seen.lock().push(action.action_type);
            Ok(())
        }
    }

    struct Failing;

    impl ActionExecutor for Failing {
        fn execute(&self, action: &PolicyAction, _: &ActionContext) -> Result<(), ActionError> {
            match action.action_type {
                ActionType::SendAlert => panic!("pager offline"),
                _ => Err(ActionError("downstream refused".into())),
            }
        }
    }

    #[test]
    fn test_executes_in_priority_order() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = ActionDispatcher::new(recorder.clone(), 1, 16);

        dispatcher.dispatch(
            vec![
                PolicyAction::new(ActionType::LogEvent, "log").with_priority(1),
                PolicyAction::new(ActionType::BlockUser, "block").with_priority(10),
            ],
            context(),
        );

        let stats = wait_for(&dispatcher, 2);
        assert_eq!(stats.executed, 2);
        dispatcher.shutdown();
        assert_eq!(
            *recorder.seen.lock(),
            vec![ActionType::BlockUser, ActionType::LogEvent]
        );
    }

    #[test]
    fn test_failures_and_panics_are_contained() {
        let dispatcher = ActionDispatcher::new(Arc::new(Failing), 2, 16);
        dispatcher.dispatch(
            vec![
                PolicyAction::new(ActionType::BlockUser, "block"),
                PolicyAction::new(ActionType::SendAlert, "alert"),
            ],
            context(),
        );

        let stats = wait_for(&dispatcher, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.executed, 0);

        // Workers survive a panicking executor
        dispatcher.dispatch(vec![PolicyAction::new(ActionType::LogEvent, "log")], context());
        assert_eq!(wait_for(&dispatcher, 3).failed, 3);
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        struct Slow;
        impl ActionExecutor for Slow {
            fn execute(&self, _: &PolicyAction, _: &ActionContext) -> Result<(), ActionError> {
                thread::sleep(Duration::from_millis(50));
                Ok(())
            }
        }

        let dispatcher = ActionDispatcher::new(Arc::new(Slow), 1, 1);
        let actions: Vec<_> = (0..20)
            .map(|i| PolicyAction::new(ActionType::LogEvent, format!("log {}", i)))
            .collect();

        let started = Instant::now();
        dispatcher.dispatch(actions, context());
        assert!(started.elapsed() < Duration::from_millis(50));

        let stats = dispatcher.stats();
        assert_eq!(stats.queued + stats.dropped, 20);
        assert!(stats.dropped > 0);
    }

    #[test]
    fn test_dispatch_after_shutdown_drops() {
        let mut dispatcher = ActionDispatcher::new(Arc::new(LoggingActionExecutor), 1, 4);
        dispatcher.shutdown();
        dispatcher.dispatch(vec![PolicyAction::new(ActionType::LogEvent, "log")], context());
        assert_eq!(dispatcher.stats().dropped, 1);
    }
}
