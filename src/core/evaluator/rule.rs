//! Decides what a matching policy yields

use crate::core::model::{
    Decision, PolicyEvaluationRequest, PolicyRule, PolicyRules, RuleEvaluationMode,
};
use tracing::trace;

/// Decision produced by a policy's rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    pub action: Decision,
    /// Rule that decided; `None` when `defaultAction` applied
    pub matched_rule_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEvaluator;

impl RuleEvaluator {
    pub fn new() -> Self {
        RuleEvaluator
    }

    /// FIRST mode: the highest-priority enabled rule decides, earlier rules
    /// win ties. Without an enabled rule the default action applies.
    ///
    /// Rule `condition` expressions are not interpreted.
    pub fn decide(&self, rules: &PolicyRules, request: &PolicyEvaluationRequest) -> RuleOutcome {
        match rules.evaluation_mode {
            RuleEvaluationMode::First => {
                let mut winner: Option<&PolicyRule> = None;
                for rule in rules.rules.iter().filter(|r| r.enabled) {
                    if winner.map_or(true, |best| rule.priority > best.priority) {
                        winner = Some(rule);
                    }
                }

                let outcome = match winner {
                    Some(rule) => RuleOutcome {
                        action: rule.action,
                        matched_rule_id: Some(rule.id.clone()),
                    },
                    None => RuleOutcome {
                        action: rules.default_action,
                        matched_rule_id: None,
                    },
                };

                trace!(
                    user_id = %request.user_id,
                    action = %outcome.action,
                    rule = ?outcome.matched_rule_id,
                    "rules decided"
                );
                outcome
            }
        }
    }
}
