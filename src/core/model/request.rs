//! Evaluation request and result (wire types)

use super::Decision;
use crate::error::{EngineError, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Serde adapter for the wire timestamp profile
/// (`YYYY-MM-DDTHH:MM:SS.mmmZ`)
pub mod wire_timestamp {
    use crate::core::parser::{format_timestamp, parse_timestamp};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_timestamp(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", s)))
    }

    pub mod option {
        use super::*;

        pub fn serialize<S>(ts: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match ts {
                Some(ts) => super::serialize(ts, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(s) => parse_timestamp(&s).map(Some).ok_or_else(|| {
                    serde::de::Error::custom(format!("invalid timestamp '{}'", s))
                }),
                None => Ok(None),
            }
        }
    }
}

/// Separator of cache key components
const KEY_SEPARATOR: char = ':';

/// One access decision to be made
///
/// `resourceType`, `action` and `userId` are required; a request missing
/// any of them is rejected before the cache or the store is touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEvaluationRequest {
    #[serde(default)]
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    #[serde(default)]
    pub action: String,

    #[serde(default)]
    pub user_id: String,

    /// Absent means only global policies are considered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,

    #[serde(with = "wire_timestamp")]
    pub timestamp: DateTime<Utc>,

    #[serde(
        default,
        with = "wire_timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<DateTime<Utc>>,
}

impl PolicyEvaluationRequest {
    /// Create a request stamped with the current time
    pub fn new(
        resource_type: impl Into<String>,
        action: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        PolicyEvaluationRequest {
            resource_type: resource_type.into(),
            resource_id: None,
            action: action.into(),
            user_id: user_id.into(),
            tenant_key: None,
            client_ip: None,
            timestamp: Utc::now(),
            expires_at: None,
        }
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_tenant(mut self, tenant_key: impl Into<String>) -> Self {
        self.tenant_key = Some(tenant_key.into());
        self
    }

    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Reject requests missing a required field
    ///
    /// Fields that make up the decision cache key must not contain `:`,
    /// otherwise two different requests could share one key.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("resourceType", &self.resource_type),
            ("action", &self.action),
            ("userId", &self.user_id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(EngineError::InvalidRequest(format!("{} is required", field)));
            }
        }

        let keyed = required
            .into_iter()
            .map(|(field, value)| (field, value.as_str()))
            .chain(self.tenant().map(|tenant| ("tenantKey", tenant)));
        for (field, value) in keyed {
            if value.contains(KEY_SEPARATOR) {
                return Err(EngineError::InvalidRequest(format!(
                    "{} must not contain '{}'",
                    field, KEY_SEPARATOR
                )));
            }
        }
        Ok(())
    }

    /// Tenant key, with blank values treated as absent
    pub fn tenant(&self) -> Option<&str> {
        self.tenant_key
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Trace entry for one visited candidate policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTrace {
    pub policy_key: String,
    pub priority: i32,
    /// Conditions matched and the policy decided the request
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule_id: Option<String>,
}

/// Decision returned to the caller; the only value written to the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEvaluationResult {
    pub decision: Decision,

    pub reason: String,

    /// Winning policy; `None` when no policy applied
    pub policy_key: Option<String>,

    pub policy_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_details: Option<Vec<PolicyTrace>>,

    /// Cache lifetime hint
    #[serde(default)]
    pub expiration_minutes: Option<u32>,

    #[serde(with = "wire_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl PolicyEvaluationResult {
    /// `timestamp` is truncated to the millisecond wire precision
    pub fn new(decision: Decision, reason: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        PolicyEvaluationResult {
            decision,
            reason: reason.into(),
            policy_key: None,
            policy_name: None,
            evaluation_details: None,
            expiration_minutes: None,
            timestamp: timestamp.trunc_subsecs(3),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.decision.is_allow()
    }
}
