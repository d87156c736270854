//! Alarm definitions.
//!
//! An [`AlarmRecord`] is what the user configures: when it rings, on which
//! days, with which tone, behind which mission, and how often it may be
//! snoozed. Records are created from an [`AlarmSpec`] and edited with an
//! [`AlarmPatch`]; runtime ringing state lives in
//! [`crate::lifecycle::ActiveAlarmState`], never here.

mod time;

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ValidationError};
use crate::mission::MissionSpec;
use crate::snooze::SnoozePolicy;
use crate::sound::SoundId;

pub use time::{next_occurrence, AlarmTime, RepeatDays};

/// Longest label accepted on create/update.
pub const MAX_LABEL_LEN: usize = 100;

/// Opaque, immutable alarm identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmId(String);

impl AlarmId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AlarmId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AlarmId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

fn default_true() -> bool {
    true
}

fn default_volume() -> f32 {
    0.8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub id: AlarmId,
    pub time: AlarmTime,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub repeat_days: RepeatDays,
    #[serde(default)]
    pub sound: SoundId,
    #[serde(default = "default_volume")]
    pub sound_volume: f32,
    #[serde(default)]
    pub mission: Option<MissionSpec>,
    #[serde(default)]
    pub snooze_policy: SnoozePolicy,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlarmRecord {
    pub fn is_repeating(&self) -> bool {
        !self.repeat_days.is_one_shot()
    }

    /// Next instant strictly after `after` at which this alarm fires,
    /// regardless of `enabled`.
    pub fn next_fire_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        next_occurrence(self.time, self.repeat_days, after)
    }

    /// Re-check every field invariant.
    pub fn validate(&self) -> Result<()> {
        validate_fields(
            &self.time,
            self.label.as_deref(),
            self.sound_volume,
            &self.snooze_policy,
            self.mission.as_ref(),
        )
    }
}

fn validate_fields(
    time: &AlarmTime,
    label: Option<&str>,
    volume: f32,
    snooze: &SnoozePolicy,
    mission: Option<&MissionSpec>,
) -> Result<()> {
    time.validate()?;
    if !(0.0..=1.0).contains(&volume) {
        return Err(ValidationError::InvalidVolume(volume).into());
    }
    if let Some(label) = label {
        if label.chars().count() > MAX_LABEL_LEN {
            return Err(ValidationError::InvalidValue {
                field: "label".into(),
                message: format!("must be at most {MAX_LABEL_LEN} characters"),
            }
            .into());
        }
    }
    snooze.validate()?;
    if let Some(mission) = mission {
        mission.validate()?;
    }
    Ok(())
}

/// Input for creating an alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmSpec {
    pub time: AlarmTime,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub repeat_days: RepeatDays,
    #[serde(default)]
    pub sound: SoundId,
    #[serde(default = "default_volume")]
    pub sound_volume: f32,
    #[serde(default)]
    pub mission: Option<MissionSpec>,
    #[serde(default)]
    pub snooze_policy: SnoozePolicy,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl AlarmSpec {
    /// Enabled one-shot alarm at `time` with default tone and snooze policy.
    pub fn at(time: AlarmTime) -> Self {
        Self {
            time,
            label: None,
            repeat_days: RepeatDays::NONE,
            sound: SoundId::default(),
            sound_volume: default_volume(),
            mission: None,
            snooze_policy: SnoozePolicy::default(),
            enabled: true,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn repeating(mut self, days: RepeatDays) -> Self {
        self.repeat_days = days;
        self
    }

    pub fn with_sound(mut self, sound: SoundId, volume: f32) -> Self {
        self.sound = sound;
        self.sound_volume = volume;
        self
    }

    pub fn with_mission(mut self, mission: MissionSpec) -> Self {
        self.mission = Some(mission);
        self
    }

    pub fn with_snooze(mut self, policy: SnoozePolicy) -> Self {
        self.snooze_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_fields(
            &self.time,
            self.label.as_deref(),
            self.sound_volume,
            &self.snooze_policy,
            self.mission.as_ref(),
        )
    }

    /// Materialize a record with a fresh id.
    pub fn into_record(self, now: DateTime<Utc>) -> Result<AlarmRecord> {
        self.validate()?;
        Ok(AlarmRecord {
            id: AlarmId::generate(),
            time: self.time,
            label: self.label.filter(|l| !l.trim().is_empty()),
            repeat_days: self.repeat_days,
            sound: self.sound,
            sound_volume: self.sound_volume,
            mission: self.mission,
            snooze_policy: self.snooze_policy,
            enabled: self.enabled,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update. `None` leaves a field untouched; the doubly optional
/// fields use `Some(None)` to clear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlarmPatch {
    pub time: Option<AlarmTime>,
    pub label: Option<Option<String>>,
    pub repeat_days: Option<RepeatDays>,
    pub sound: Option<SoundId>,
    pub sound_volume: Option<f32>,
    pub mission: Option<Option<MissionSpec>>,
    pub snooze_policy: Option<SnoozePolicy>,
    pub enabled: Option<bool>,
}

impl AlarmPatch {
    pub fn time(time: AlarmTime) -> Self {
        Self {
            time: Some(time),
            ..Self::default()
        }
    }

    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply to a copy of `record`, validating the result.
    pub fn apply(&self, record: &AlarmRecord, now: DateTime<Utc>) -> Result<AlarmRecord> {
        let mut next = record.clone();
        if let Some(time) = self.time {
            next.time = time;
        }
        if let Some(label) = &self.label {
            next.label = label.clone().filter(|l| !l.trim().is_empty());
        }
        if let Some(days) = self.repeat_days {
            next.repeat_days = days;
        }
        if let Some(sound) = self.sound {
            next.sound = sound;
        }
        if let Some(volume) = self.sound_volume {
            next.sound_volume = volume;
        }
        if let Some(mission) = &self.mission {
            next.mission = mission.clone();
        }
        if let Some(policy) = self.snooze_policy {
            next.snooze_policy = policy;
        }
        if let Some(enabled) = self.enabled {
            next.enabled = enabled;
        }
        next.validate()?;
        next.updated_at = now;
        Ok(next)
    }
}
