//! Decides whether a policy's conditions match a request

use super::Clock;
use crate::core::model::{
    ConditionEvaluationMode, ConditionGroup, PolicyConditions, PolicyEvaluationRequest,
    TimeConditions,
};
use chrono::{DateTime, FixedOffset, NaiveTime, Offset, Utc};
use std::sync::Arc;
use tracing::debug;

/// Condition matcher with deny precedence in every group
pub struct ConditionEvaluator {
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl ConditionEvaluator {
    /// `utc_offset_minutes` defines "local time" for time conditions
    pub fn new(clock: Arc<dyn Clock>, utc_offset_minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        ConditionEvaluator { clock, offset }
    }

    /// Current local time of day
    pub fn local_time(&self) -> NaiveTime {
        self.local_time_at(self.clock.now())
    }

    /// Local time of day at `instant`
    pub fn local_time_at(&self, instant: DateTime<Utc>) -> NaiveTime {
        instant.with_timezone(&self.offset).time()
    }

    /// Evaluate against the current local time
    pub fn matches(&self, conditions: &PolicyConditions, request: &PolicyEvaluationRequest) -> bool {
        self.matches_at(conditions, request, self.local_time())
    }

    /// Evaluate against an explicit local time
    ///
    /// No present group means unrestricted, whatever the mode.
    pub fn matches_at(
        &self,
        conditions: &PolicyConditions,
        request: &PolicyEvaluationRequest,
        local_time: NaiveTime,
    ) -> bool {
        let groups = conditions.groups();
        if groups.is_empty() {
            return true;
        }

        let mut outcomes = groups.iter().map(|group| {
            let passed = group_passes(group, request, local_time);
            if !passed {
                debug!(group = group.kind(), "condition group rejected request");
            }
            passed
        });

        match conditions.evaluation_mode {
            ConditionEvaluationMode::All => outcomes.all(|passed| passed),
            ConditionEvaluationMode::Any => outcomes.any(|passed| passed),
        }
    }
}

fn group_passes(
    group: &ConditionGroup<'_>,
    request: &PolicyEvaluationRequest,
    local_time: NaiveTime,
) -> bool {
    match group {
        ConditionGroup::Time(time) => time_permits(time, local_time),
        ConditionGroup::Ip(ip) => list_permits(
            &ip.allowed_ips,
            &ip.denied_ips,
            request.client_ip.as_deref(),
        ),
        ConditionGroup::User(user) => list_permits(
            &user.allowed_users,
            &user.denied_users,
            Some(request.user_id.as_str()),
        ),
        ConditionGroup::Resource(resource) => {
            list_permits(
                &resource.allowed_resource_types,
                &resource.denied_resource_types,
                Some(request.resource_type.as_str()),
            ) && list_permits(
                &resource.allowed_resource_ids,
                &resource.denied_resource_ids,
                request.resource_id.as_deref(),
            )
        }
    }
}

/// Denied ranges win; with no allowed ranges the group passes
fn time_permits(time: &TimeConditions, local_time: NaiveTime) -> bool {
    if time
        .denied_time_ranges
        .iter()
        .any(|range| range.contains(local_time))
    {
        return false;
    }

    time.allowed_time_ranges.is_empty()
        || time
            .allowed_time_ranges
            .iter()
            .any(|range| range.contains(local_time))
}

/// Shared allow/deny list semantics
///
/// A denylist hit always rejects. A non-empty allowlist requires
/// membership; a missing value can never be a member.
fn list_permits(allowed: &[String], denied: &[String], value: Option<&str>) -> bool {
    if let Some(value) = value {
        if denied.iter().any(|d| d == value) {
            return false;
        }
    }

    if allowed.is_empty() {
        return true;
    }

    value.is_some_and(|v| allowed.iter().any(|a| a == v))
}
