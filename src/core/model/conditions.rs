//! Condition document: when a policy applies
//!
//! Four optional groups restrict a policy by time of day, client IP, actor
//! and resource. An absent or empty group does not restrict anything.

use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How present condition groups are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionEvaluationMode {
    /// Every present group must pass
    #[default]
    All,
    /// At least one present group must pass
    Any,
}

/// Half-open `[start, end)` window of local time
///
/// When `end < start` the window wraps past midnight. A zero-length window
/// (`start == end`) contains nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(serialize_with = "serialize_time", deserialize_with = "deserialize_time")]
    pub start: NaiveTime,
    #[serde(serialize_with = "serialize_time", deserialize_with = "deserialize_time")]
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        TimeRange { start, end }
    }

    /// Build from hour/minute pairs; `None` if either is out of range
    pub fn hm(start: (u32, u32), end: (u32, u32)) -> Option<Self> {
        Some(TimeRange {
            start: NaiveTime::from_hms_opt(start.0, start.1, 0)?,
            end: NaiveTime::from_hms_opt(end.0, end.1, 0)?,
        })
    }

    pub fn wraps_midnight(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.wraps_midnight() {
            time >= self.start || time < self.end
        } else {
            time >= self.start && time < self.end
        }
    }
}

/// Accepts `HH:MM` and `HH:MM:SS`
fn deserialize_time<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    NaiveTime::parse_from_str(&s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M"))
        .map_err(|e| serde::de::Error::custom(format!("invalid time '{}': {}", s, e)))
}

fn serialize_time<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use chrono::Timelike;
    let formatted = if time.second() == 0 {
        time.format("%H:%M").to_string()
    } else {
        time.format("%H:%M:%S").to_string()
    };
    serializer.serialize_str(&formatted)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeConditions {
    #[serde(alias = "allowed")]
    pub allowed_time_ranges: Vec<TimeRange>,
    #[serde(alias = "denied")]
    pub denied_time_ranges: Vec<TimeRange>,
}

impl TimeConditions {
    pub fn is_empty(&self) -> bool {
        self.allowed_time_ranges.is_empty() && self.denied_time_ranges.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpConditions {
    pub allowed_ips: Vec<String>,
    pub denied_ips: Vec<String>,
}

impl IpConditions {
    pub fn is_empty(&self) -> bool {
        self.allowed_ips.is_empty() && self.denied_ips.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserConditions {
    pub allowed_users: Vec<String>,
    pub denied_users: Vec<String>,
}

impl UserConditions {
    pub fn is_empty(&self) -> bool {
        self.allowed_users.is_empty() && self.denied_users.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceConditions {
    pub allowed_resource_types: Vec<String>,
    pub denied_resource_types: Vec<String>,
    pub allowed_resource_ids: Vec<String>,
    pub denied_resource_ids: Vec<String>,
}

impl ResourceConditions {
    pub fn is_empty(&self) -> bool {
        self.allowed_resource_types.is_empty()
            && self.denied_resource_types.is_empty()
            && self.allowed_resource_ids.is_empty()
            && self.denied_resource_ids.is_empty()
    }
}

/// One present, non-empty condition group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionGroup<'a> {
    Time(&'a TimeConditions),
    Ip(&'a IpConditions),
    User(&'a UserConditions),
    Resource(&'a ResourceConditions),
}

impl ConditionGroup<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            ConditionGroup::Time(_) => "time",
            ConditionGroup::Ip(_) => "ip",
            ConditionGroup::User(_) => "user",
            ConditionGroup::Resource(_) => "resource",
        }
    }
}

/// Parsed `conditions` document of a policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyConditions {
    pub evaluation_mode: ConditionEvaluationMode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_conditions: Option<TimeConditions>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_conditions: Option<IpConditions>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_conditions: Option<UserConditions>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_conditions: Option<ResourceConditions>,
}

impl PolicyConditions {
    /// Groups that actually restrict something, in a fixed order
    pub fn groups(&self) -> Vec<ConditionGroup<'_>> {
        let mut groups = Vec::with_capacity(4);
        if let Some(time) = self.time_conditions.as_ref().filter(|c| !c.is_empty()) {
            groups.push(ConditionGroup::Time(time));
        }
        if let Some(ip) = self.ip_conditions.as_ref().filter(|c| !c.is_empty()) {
            groups.push(ConditionGroup::Ip(ip));
        }
        if let Some(user) = self.user_conditions.as_ref().filter(|c| !c.is_empty()) {
            groups.push(ConditionGroup::User(user));
        }
        if let Some(resource) = self.resource_conditions.as_ref().filter(|c| !c.is_empty()) {
            groups.push(ConditionGroup::Resource(resource));
        }
        groups
    }

    /// No group restricts anything
    pub fn is_unrestricted(&self) -> bool {
        self.groups().is_empty()
    }
}
