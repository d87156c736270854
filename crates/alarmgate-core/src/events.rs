use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alarm::AlarmId;
use crate::lifecycle::AlarmState;
use crate::mission::{MissionAttemptResult, MissionKind};

/// Every committed lifecycle transition produces an Event.
/// The UI renders them; integrations may subscribe to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Alarm started ringing for a new occurrence.
    AlarmRinging {
        alarm_id: AlarmId,
        /// False when the tone could not be started.
        sound_started: bool,
        at: DateTime<Utc>,
    },
    /// Duplicate fire for the alarm already in flight; nothing changed.
    AlarmAlreadyActive {
        alarm_id: AlarmId,
        state: AlarmState,
        at: DateTime<Utc>,
    },
    /// Another alarm is active; this one waits its turn.
    AlarmDeferred {
        alarm_id: AlarmId,
        active_alarm_id: AlarmId,
        at: DateTime<Utc>,
    },
    AlarmSnoozed {
        alarm_id: AlarmId,
        snooze_count: u32,
        snooze_until: DateTime<Utc>,
        /// `None` when unlimited.
        snoozes_remaining: Option<u32>,
        at: DateTime<Utc>,
    },
    /// Snooze ran out; ringing again.
    SnoozeExpired {
        alarm_id: AlarmId,
        snooze_count: u32,
        sound_started: bool,
        at: DateTime<Utc>,
    },
    MissionStarted {
        alarm_id: AlarmId,
        mission: MissionKind,
        /// Math problem to show first, if any.
        problem: Option<String>,
        at: DateTime<Utc>,
    },
    /// Attempt evaluated but the mission is not complete yet.
    MissionAttemptFailed {
        alarm_id: AlarmId,
        result: MissionAttemptResult,
        at: DateTime<Utc>,
    },
    AlarmDismissed {
        alarm_id: AlarmId,
        /// Present when the dismissal came from a passed mission.
        result: Option<MissionAttemptResult>,
        /// Next scheduled occurrence for repeating alarms.
        next_fire_at: Option<DateTime<Utc>>,
        /// Deferred alarm that started ringing right after this dismissal.
        next_ringing: Option<AlarmId>,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn alarm_id(&self) -> &AlarmId {
        match self {
            Event::AlarmRinging { alarm_id, .. }
            | Event::AlarmAlreadyActive { alarm_id, .. }
            | Event::AlarmDeferred { alarm_id, .. }
            | Event::AlarmSnoozed { alarm_id, .. }
            | Event::SnoozeExpired { alarm_id, .. }
            | Event::MissionStarted { alarm_id, .. }
            | Event::MissionAttemptFailed { alarm_id, .. }
            | Event::AlarmDismissed { alarm_id, .. } => alarm_id,
        }
    }
}
