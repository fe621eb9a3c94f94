//! Policy data model
//!
//! A stored [`Policy`] carries three opaque JSON documents (rules,
//! conditions, actions). They are decoded by the parser into the typed
//! structures in the submodules only when evaluation needs them.

mod action;
mod conditions;
mod request;
mod rules;

pub use action::{ActionStatus, ActionType, PolicyAction};
pub use conditions::{
    ConditionEvaluationMode, ConditionGroup, IpConditions, PolicyConditions, ResourceConditions,
    TimeConditions, TimeRange, UserConditions,
};
pub use request::{wire_timestamp, PolicyEvaluationRequest, PolicyEvaluationResult, PolicyTrace};
pub use rules::{PolicyRule, PolicyRules, RuleEvaluationMode};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a policy evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Request may proceed
    #[default]
    Allow,
    /// Request is refused
    Deny,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "ALLOW",
            Decision::Deny => "DENY",
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a stored policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyStatus {
    #[default]
    Active,
    Inactive,
}

/// A stored policy record
///
/// Owned by the policy-management path; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Unique identifier
    pub policy_key: String,

    /// Display name
    pub name: String,

    pub enabled: bool,

    pub status: PolicyStatus,

    /// Higher values are evaluated first
    pub priority: i32,

    /// Owning tenant; `None` makes the policy global
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_key: Option<String>,

    /// Raw `PolicyRules` document
    #[serde(default)]
    pub rules: Option<String>,

    /// Raw `PolicyConditions` document
    #[serde(default)]
    pub conditions: Option<String>,

    /// Raw `[PolicyAction]` document
    #[serde(default)]
    pub actions: Option<String>,

    /// Policy is ignored before this instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_from: Option<DateTime<Utc>>,

    /// Policy is ignored from this instant on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_until: Option<DateTime<Utc>>,
}

impl Policy {
    /// Create an enabled, active, global policy with empty documents
    pub fn new(policy_key: impl Into<String>, name: impl Into<String>, priority: i32) -> Self {
        Policy {
            policy_key: policy_key.into(),
            name: name.into(),
            enabled: true,
            status: PolicyStatus::Active,
            priority,
            tenant_key: None,
            rules: None,
            conditions: None,
            actions: None,
            effective_from: None,
            effective_until: None,
        }
    }

    pub fn with_tenant(mut self, tenant_key: impl Into<String>) -> Self {
        self.tenant_key = Some(tenant_key.into());
        self
    }

    pub fn with_rules(mut self, json: impl Into<String>) -> Self {
        self.rules = Some(json.into());
        self
    }

    pub fn with_conditions(mut self, json: impl Into<String>) -> Self {
        self.conditions = Some(json.into());
        self
    }

    pub fn with_actions(mut self, json: impl Into<String>) -> Self {
        self.actions = Some(json.into());
        self
    }

    pub fn with_status(mut self, status: PolicyStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn effective_between(
        mut self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Self {
        self.effective_from = from;
        self.effective_until = until;
        self
    }

    /// Disabled or non-active policies are never candidates
    pub fn is_candidate(&self) -> bool {
        self.enabled && self.status == PolicyStatus::Active
    }

    pub fn is_global(&self) -> bool {
        self.tenant_key.is_none()
    }

    /// Whether `now` falls inside the `[effective_from, effective_until)` window
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        if let Some(from) = self.effective_from {
            if now < from {
                return false;
            }
        }
        if let Some(until) = self.effective_until {
            if now >= until {
                return false;
            }
        }
        true
    }
}
