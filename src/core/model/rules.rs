//! Rule document: what a policy decides once its conditions match

use super::Decision;
use serde::{Deserialize, Serialize};

/// How the rule list is folded into one decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleEvaluationMode {
    /// Highest-priority enabled rule decides; `defaultAction` otherwise
    #[default]
    First,
}

/// A single rule inside a policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyRule {
    pub id: String,

    pub name: String,

    /// Free-text condition expression.
    ///
    /// Stored and round-tripped but not evaluated: only `action`,
    /// `priority` and `enabled` participate in the decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    pub action: Decision,

    pub priority: i32,

    pub enabled: bool,
}

impl Default for PolicyRule {
    fn default() -> Self {
        PolicyRule {
            id: String::new(),
            name: String::new(),
            condition: None,
            action: Decision::Allow,
            priority: 0,
            enabled: true,
        }
    }
}

impl PolicyRule {
    pub fn new(id: impl Into<String>, action: Decision, priority: i32) -> Self {
        PolicyRule {
            id: id.into(),
            action,
            priority,
            ..Default::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Parsed `rules` document of a policy
///
/// The zero value (no rules, `ALLOW` default) is what malformed documents
/// degrade to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyRules {
    pub default_action: Decision,

    pub evaluation_mode: RuleEvaluationMode,

    pub rules: Vec<PolicyRule>,
}

impl PolicyRules {
    pub fn with_default(default_action: Decision) -> Self {
        PolicyRules {
            default_action,
            ..Default::default()
        }
    }

    pub fn add_rule(&mut self, rule: PolicyRule) {
        self.rules.push(rule);
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
