use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alarm::{AlarmId, AlarmRecord};
use crate::error::{CoreError, Result};
use crate::mission::{MissionProgress, MissionSpec};
use crate::snooze::SnoozePolicy;
use crate::sound::SoundId;

/// Layout version of the persisted [`ActiveAlarmState`].
pub const ACTIVE_STATE_VERSION: u32 = 1;

/// Runtime state of the alarm currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlarmState {
    Ringing,
    Snoozed,
    MissionInProgress,
}

fn current_version() -> u32 {
    ACTIVE_STATE_VERSION
}

/// The single in-flight alarm. Only the lifecycle writes it.
///
/// Sound, snooze policy and mission are copied from the record when the
/// alarm fires, so edits made while it rings apply from the next occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveAlarmState {
    #[serde(default = "current_version")]
    pub version: u32,
    /// Bumped by storage on every write. A write carrying a stale revision
    /// is refused, so two writers cannot silently overwrite each other.
    /// Zero means not yet stored.
    #[serde(default)]
    pub revision: u64,
    pub alarm_id: AlarmId,
    pub state: AlarmState,
    pub snooze_count: u32,
    /// Present only while `Snoozed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snooze_until: Option<DateTime<Utc>>,
    pub fired_at: DateTime<Utc>,
    pub sound: SoundId,
    pub sound_volume: f32,
    pub snooze_policy: SnoozePolicy,
    #[serde(default)]
    pub mission: Option<MissionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_progress: Option<MissionProgress>,
    /// Alarms that fired while this one was active, in arrival order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deferred: Vec<AlarmId>,
}

impl ActiveAlarmState {
    /// Fresh ringing state for `record`.
    pub fn ringing(record: &AlarmRecord, now: DateTime<Utc>) -> Self {
        Self {
            version: ACTIVE_STATE_VERSION,
            revision: 0,
            alarm_id: record.id.clone(),
            state: AlarmState::Ringing,
            snooze_count: 0,
            snooze_until: None,
            fired_at: now,
            sound: record.sound,
            sound_volume: record.sound_volume,
            snooze_policy: record.snooze_policy,
            mission: record.mission.clone(),
            mission_progress: None,
            deferred: Vec::new(),
        }
    }

    /// Parse a persisted state, refusing layouts newer than this build.
    pub fn from_json(json: &str) -> Result<Self> {
        let state: ActiveAlarmState = serde_json::from_str(json)?;
        if state.version > ACTIVE_STATE_VERSION {
            return Err(CoreError::Persistence(format!(
                "active alarm state version {} is newer than supported version {}",
                state.version, ACTIVE_STATE_VERSION
            )));
        }
        Ok(state)
    }

    pub fn has_mission(&self) -> bool {
        self.mission.is_some()
    }

    /// Snoozed and the snooze has run out at `now`.
    pub fn is_snooze_due(&self, now: DateTime<Utc>) -> bool {
        self.state == AlarmState::Snoozed && self.snooze_until.is_some_and(|until| now >= until)
    }

    /// Derived projection for collaborators that only care about snoozing.
    pub fn snoozed_view(&self) -> Option<SnoozedAlarmView> {
        if self.state != AlarmState::Snoozed {
            return None;
        }
        Some(SnoozedAlarmView {
            alarm_id: self.alarm_id.clone(),
            snooze_until: self.snooze_until?,
            snooze_count: self.snooze_count,
            snoozes_remaining: self.snooze_policy.remaining(self.snooze_count),
        })
    }
}

/// Read-only view of a snoozed alarm. Derived on read, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnoozedAlarmView {
    pub alarm_id: AlarmId,
    pub snooze_until: DateTime<Utc>,
    pub snooze_count: u32,
    /// `None` when unlimited.
    pub snoozes_remaining: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{AlarmSpec, AlarmTime};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 7, 0, 0).unwrap()
    }

    fn ringing() -> ActiveAlarmState {
        let record = AlarmSpec::at(AlarmTime::new(7, 0).unwrap())
            .into_record(now())
            .unwrap();
        ActiveAlarmState::ringing(&record, now())
    }

    #[test]
    fn snoozed_view_only_while_snoozed() {
        let mut state = ringing();
        assert!(state.snoozed_view().is_none());

        state.state = AlarmState::Snoozed;
        state.snooze_count = 1;
        state.snooze_until = Some(now() + Duration::minutes(5));
        let view = state.snoozed_view().unwrap();
        assert_eq!(view.snooze_count, 1);
        assert_eq!(view.snoozes_remaining, Some(2));
        assert_eq!(view.snooze_until, now() + Duration::minutes(5));
    }

    #[test]
    fn snooze_due_at_boundary() {
        let mut state = ringing();
        state.state = AlarmState::Snoozed;
        state.snooze_until = Some(now() + Duration::minutes(5));
        assert!(!state.is_snooze_due(now() + Duration::minutes(4)));
        assert!(state.is_snooze_due(now() + Duration::minutes(5)));
    }

    #[test]
    fn json_without_version_is_accepted() {
        let mut value = serde_json::to_value(ringing()).unwrap();
        value.as_object_mut().unwrap().remove("version");
        let parsed = ActiveAlarmState::from_json(&value.to_string()).unwrap();
        assert_eq!(parsed.version, ACTIVE_STATE_VERSION);
    }

    #[test]
    fn newer_version_is_refused() {
        let mut state = ringing();
        state.version = ACTIVE_STATE_VERSION + 1;
        let json = serde_json::to_string(&state).unwrap();
        assert!(matches!(
            ActiveAlarmState::from_json(&json),
            Err(CoreError::Persistence(_))
        ));
    }
}
