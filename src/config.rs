//! Engine configuration
//!
//! Loaded from TOML. Every key is optional; missing keys take the defaults
//! below.
//!
//! ```toml
//! default_ttl_minutes = 5
//! no_match_decision = "DENY"
//! action_workers = 4
//! ```

use crate::core::model::Decision;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Largest UTC offset accepted for local-time evaluation (18 hours)
const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

/// Tunables for [`PolicyEvaluationService`](crate::PolicyEvaluationService)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// TTL for cached decisions that carry no expiration hint
    pub default_ttl_minutes: u32,
    /// TTL for cached candidate-policy lists
    pub candidate_ttl_minutes: u32,
    /// Cache the candidate list per tenant scope
    pub cache_candidates: bool,
    /// Decision returned when no candidate policy applies
    pub no_match_decision: Decision,
    /// Attach the per-policy trace to every result
    pub include_evaluation_details: bool,
    /// Budget for one policy-store query
    pub store_timeout_ms: u64,
    /// Budget for one cache read
    pub cache_timeout_ms: u64,
    /// Offset from UTC used as "local time" by time conditions
    pub local_utc_offset_minutes: i32,
    /// Background threads executing policy actions
    pub action_workers: usize,
    /// Queue depth between the decision path and the action workers
    pub action_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            default_ttl_minutes: 5,
            candidate_ttl_minutes: 5,
            cache_candidates: true,
            no_match_decision: Decision::Allow,
            include_evaluation_details: false,
            store_timeout_ms: 2_000,
            cache_timeout_ms: 250,
            local_utc_offset_minutes: 0,
            action_workers: 2,
            action_queue_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Validate all fields
    ///
    /// Checks:
    /// - TTLs are at least one minute
    /// - Timeouts are at least one millisecond
    /// - At least one action worker and one queue slot
    /// - UTC offset is within +/-18 hours
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl_minutes == 0 {
            return Err(EngineError::Config(
                "default_ttl_minutes must be at least 1".to_string(),
            ));
        }
        if self.cache_candidates && self.candidate_ttl_minutes == 0 {
            return Err(EngineError::Config(
                "candidate_ttl_minutes must be at least 1 when cache_candidates is set".to_string(),
            ));
        }
        if self.store_timeout_ms == 0 || self.cache_timeout_ms == 0 {
            return Err(EngineError::Config(
                "store_timeout_ms and cache_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.action_workers == 0 {
            return Err(EngineError::Config(
                "action_workers must be at least 1".to_string(),
            ));
        }
        if self.action_queue_capacity == 0 {
            return Err(EngineError::Config(
                "action_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.local_utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(EngineError::Config(format!(
                "local_utc_offset_minutes {} is outside +/-{}",
                self.local_utc_offset_minutes, MAX_UTC_OFFSET_MINUTES
            )));
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }
}
