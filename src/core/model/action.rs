//! Action document: side effects triggered by a winning policy

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of remediation an action performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    BlockUser,
    SendAlert,
    LogEvent,
    RequireMfa,
    NotifyAdmin,
    RevokeSession,
    /// Any type this build does not know about
    #[serde(other)]
    Unknown,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::BlockUser => "BLOCK_USER",
            ActionType::SendAlert => "SEND_ALERT",
            ActionType::LogEvent => "LOG_EVENT",
            ActionType::RequireMfa => "REQUIRE_MFA",
            ActionType::NotifyAdmin => "NOTIFY_ADMIN",
            ActionType::RevokeSession => "REVOKE_SESSION",
            ActionType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution state of an action
///
/// `Pending -> Executed | Failed`; both outcomes are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    #[default]
    Pending,
    Executed,
    Failed,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActionStatus::Pending)
    }

    /// Move to `next` if the lifecycle allows it
    ///
    /// Returns `false` and leaves the status untouched otherwise.
    pub fn transition(&mut self, next: ActionStatus) -> bool {
        match (*self, next) {
            (ActionStatus::Pending, ActionStatus::Executed)
            | (ActionStatus::Pending, ActionStatus::Failed) => {
                *self = next;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,

    #[serde(default)]
    pub description: String,

    /// Duration of the effect in minutes (e.g. how long a block lasts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,

    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub status: ActionStatus,
}

impl PolicyAction {
    pub fn new(action_type: ActionType, description: impl Into<String>) -> Self {
        PolicyAction {
            action_type,
            description: description.into(),
            duration: None,
            priority: 0,
            status: ActionStatus::Pending,
        }
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration = Some(minutes);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}
