//! Snooze policy evaluation.
//!
//! Pure functions over a [`SnoozePolicy`] and the current snooze count.
//! Nothing here touches storage, timers or audio.

use chrono::{DateTime, Duration, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Per-alarm rule limiting how many times and for how long it may be deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SnoozePolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Ignored when `unlimited` is set.
    #[serde(default = "default_max")]
    pub max: u32,
    #[serde(default)]
    pub unlimited: bool,
    #[serde(default = "default_interval")]
    pub interval_minutes: u32,
}

fn default_true() -> bool {
    true
}
fn default_max() -> u32 {
    3
}
fn default_interval() -> u32 {
    5
}

impl Default for SnoozePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max: default_max(),
            unlimited: false,
            interval_minutes: default_interval(),
        }
    }
}

impl SnoozePolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.interval_minutes == 0 {
            return Err(ValidationError::InvalidValue {
                field: "snooze_policy.interval_minutes".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Snoozes left before the policy refuses, `None` when unlimited.
    pub fn remaining(&self, current_count: u32) -> Option<u32> {
        if !self.enabled {
            return Some(0);
        }
        if self.unlimited {
            return None;
        }
        Some(self.max.saturating_sub(current_count))
    }
}

/// Whether another snooze is permitted after `current_count` snoozes.
pub fn can_snooze(policy: &SnoozePolicy, current_count: u32) -> bool {
    policy.enabled && (policy.unlimited || current_count < policy.max)
}

/// Instant the alarm should ring again if snoozed at `now`.
pub fn next_wake_instant<Tz: TimeZone>(now: &DateTime<Tz>, policy: &SnoozePolicy) -> DateTime<Tz> {
    now.clone() + Duration::minutes(i64::from(policy.interval_minutes))
}
