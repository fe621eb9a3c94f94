//! Policy document parser
//!
//! Decodes the three JSON documents stored on a policy. Parsing never
//! fails: empty, `null` or malformed input yields the zero value (no rules,
//! no conditions, no actions), which evaluation treats as unrestricted. A
//! corrupted policy record therefore degrades instead of breaking
//! evaluation of unrelated requests.

use super::model::{PolicyAction, PolicyConditions, PolicyRules};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Wire timestamp profile: millisecond precision, UTC `Z` suffix
const TIMESTAMP_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3}Z$";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TIMESTAMP_PATTERN).expect("timestamp pattern is valid"))
}

/// Format a timestamp in the wire profile (`2024-03-01T08:15:30.250Z`)
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a wire timestamp
///
/// The exact profile is parsed directly. Any other RFC 3339 timestamp is
/// accepted and normalized to UTC with sub-millisecond digits dropped.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if timestamp_regex().is_match(s) {
        return NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc());
    }

    let ts = DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc);
    let millis_only = ts.nanosecond() / 1_000_000 * 1_000_000;
    Some(ts.with_nanosecond(millis_only).unwrap_or(ts))
}

/// `actions` may be stored as an array or as a single object
#[derive(Deserialize)]
#[serde(untagged)]
enum ActionsDocument {
    Many(Vec<PolicyAction>),
    One(PolicyAction),
}

/// Stateless decoder for policy documents
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyParser;

impl PolicyParser {
    pub fn new() -> Self {
        PolicyParser
    }

    /// Decode a `rules` document
    pub fn parse_rules(&self, json: &str) -> PolicyRules {
        parse_document(json, "rules")
    }

    /// Decode a `conditions` document
    pub fn parse_conditions(&self, json: &str) -> PolicyConditions {
        parse_document(json, "conditions")
    }

    /// Decode an `actions` document
    pub fn parse_actions(&self, json: &str) -> Vec<PolicyAction> {
        match parse_document::<Option<ActionsDocument>>(json, "actions") {
            Some(ActionsDocument::Many(actions)) => actions,
            Some(ActionsDocument::One(action)) => vec![action],
            None => Vec::new(),
        }
    }

    /// Whether `s` is syntactically valid JSON
    pub fn is_valid_json(&self, s: &str) -> bool {
        serde_json::from_str::<serde_json::Value>(s).is_ok()
    }

    /// Encode any policy document back to JSON
    pub fn to_json<T: Serialize>(&self, value: &T) -> Result<String, serde_json::Error> {
        serde_json::to_string(value)
    }
}

fn parse_document<T>(json: &str, kind: &'static str) -> T
where
    T: DeserializeOwned + Default,
{
    let trimmed = json.trim();
    if trimmed.is_empty() || trimmed == "null" {
        debug!(kind, "empty policy document, using defaults");
        return T::default();
    }

    match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(e) => {
            warn!(kind, error = %e, "malformed policy document, treating as empty");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{
        ActionType, ConditionEvaluationMode, Decision, RuleEvaluationMode, TimeRange,
    };
    use chrono::TimeZone;

    #[test]
    fn test_parse_rules() {
        let rules = PolicyParser::new().parse_rules(
            r#"{
                "defaultAction": "DENY",
                "evaluationMode": "FIRST",
                "rules": [
                    {"id": "r1", "name": "admins", "condition": "user.role == 'admin'",
                     "action": "ALLOW", "priority": 10, "enabled": true},
                    {"id": "r2", "name": "fallback", "action": "DENY", "priority": 1}
                ]
            }"#,
        );

        assert_eq!(rules.default_action, Decision::Deny);
        assert_eq!(rules.evaluation_mode, RuleEvaluationMode::First);
        assert_eq!(rules.rules.len(), 2);
        assert_eq!(
            rules.rules[0].condition.as_deref(),
            Some("user.role == 'admin'")
        );
    }

    #[test]
    fn test_malformed_documents_degrade() {
        let parser = PolicyParser::new();

        assert_eq!(parser.parse_rules("{ invalid json }"), PolicyRules::default());
        assert_eq!(
            parser.parse_conditions("{ invalid json }"),
            PolicyConditions::default()
        );
        assert!(parser.parse_actions("{ invalid json }").is_empty());
    }

    #[test]
    fn test_empty_and_null_documents() {
        let parser = PolicyParser::new();

        for input in ["", "   ", "null"] {
            assert_eq!(parser.parse_rules(input), PolicyRules::default());
            assert!(parser.parse_conditions(input).is_unrestricted());
            assert!(parser.parse_actions(input).is_empty());
        }
    }

    #[test]
    fn test_wrong_shape_degrades() {
        let parser = PolicyParser::new();

        // Valid JSON, wrong types
        assert_eq!(parser.parse_rules("[1, 2, 3]"), PolicyRules::default());
        assert_eq!(
            parser.parse_rules(r#"{"defaultAction": "MAYBE"}"#),
            PolicyRules::default()
        );
        assert!(parser.parse_actions(r#""BLOCK_USER""#).is_empty());
    }

    #[test]
    fn test_parse_conditions() {
        let conditions = PolicyParser::new().parse_conditions(
            r#"{
                "evaluationMode": "ANY",
                "timeConditions": {"allowedTimeRanges": [{"start": "22:00", "end": "06:00"}]},
                "ipConditions": {"deniedIps": ["1.2.3.4"]}
            }"#,
        );

        assert_eq!(conditions.evaluation_mode, ConditionEvaluationMode::Any);
        let time = conditions.time_conditions.unwrap();
        assert_eq!(
            time.allowed_time_ranges,
            vec![TimeRange::hm((22, 0), (6, 0)).unwrap()]
        );
        assert_eq!(conditions.ip_conditions.unwrap().denied_ips, vec!["1.2.3.4"]);
        assert!(conditions.user_conditions.is_none());
    }

    #[test]
    fn test_parse_actions_array_and_single() {
        let parser = PolicyParser::new();

        let actions = parser.parse_actions(
            r#"[{"type":"BLOCK_USER","description":"block","duration":30,"priority":5},
                {"type":"SEND_ALERT","description":"page on-call"}]"#,
        );
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action_type, ActionType::BlockUser);
        assert_eq!(actions[0].duration, Some(30));

        let single = parser.parse_actions(r#"{"type":"LOG_EVENT"}"#);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].action_type, ActionType::LogEvent);
    }

    #[test]
    fn test_rules_round_trip() {
        let parser = PolicyParser::new();
        let source = r#"{"defaultAction":"DENY","rules":[{"id":"r1","action":"ALLOW","priority":3,"enabled":false}]}"#;

        let first = parser.parse_rules(source);
        let again = parser.parse_rules(&parser.to_json(&first).unwrap());
        assert_eq!(first, again);
    }

    #[test]
    fn test_is_valid_json() {
        let parser = PolicyParser::new();
        assert!(parser.is_valid_json(r#"{"a": 1}"#));
        assert!(parser.is_valid_json("[]"));
        assert!(!parser.is_valid_json("{ invalid json }"));
        assert!(!parser.is_valid_json(""));
    }

    #[test]
    fn test_timestamp_profile() {
        let ts = parse_timestamp("2024-03-01T08:15:30.250Z").unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-01T08:15:30.250Z");
    }

    #[test]
    fn test_timestamp_normalization() {
        // Offset and extra precision are normalized into the profile
        let ts = parse_timestamp("2024-03-01T10:15:30.250999+02:00").unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-01T08:15:30.250Z");

        let ts = parse_timestamp("2024-03-01T08:15:30Z").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 1, 8, 15, 30).unwrap());
        assert_eq!(format_timestamp(&ts), "2024-03-01T08:15:30.000Z");

        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("2024-13-01T08:15:30.250Z").is_none());
    }
}
