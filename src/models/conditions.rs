//! Status conditions
//!
//! Conditions are keyed by type: a status never holds two entries with the
//! same `type`. `lastTransitionTime` only moves when `status` changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall readiness of a `BuildRequest`
pub const READY: &str = "Ready";

/// Outcome of the request's most recent build execution
pub const BUILD_SUCCEEDED: &str = "BuildSucceeded";

/// Outcome condition reported by a `BuildExecution`
pub const SUCCEEDED: &str = "Succeeded";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

/// A single observation about a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    #[serde(default)]
    pub status: ConditionStatus,
    /// Machine-readable reason
    #[serde(default)]
    pub reason: String,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
    /// Generation of the resource this condition was computed against
    #[serde(default)]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    pub fn new(
        condition_type: &str,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status,
            reason: reason.to_string(),
            message: message.into(),
            observed_generation: None,
            last_transition_time: None,
        }
    }

    pub fn with_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }
}

/// Find the condition of the given type
pub fn find_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Insert or replace the condition with the same type
///
/// Returns true if the stored conditions changed.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition, now: DateTime<Utc>) -> bool {
    match conditions.iter_mut().find(|c| c.r#type == condition.r#type) {
        Some(existing) => {
            condition.last_transition_time = if existing.status == condition.status {
                existing.last_transition_time.or(Some(now))
            } else {
                Some(now)
            };
            if *existing == condition {
                return false;
            }
            *existing = condition;
            true
        }
        None => {
            condition.last_transition_time = Some(now);
            conditions.push(condition);
            true
        }
    }
}
