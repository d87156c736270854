//! Integration tests for alarm persistence.
//!
//! These verify that alarm definitions and the active alarm state survive
//! a reopen of the on-disk database.

use alarmgate_core::alarm::{AlarmPatch, AlarmSpec, AlarmTime, RepeatDays};
use alarmgate_core::lifecycle::{AlarmLifecycle, AlarmState};
use alarmgate_core::mission::{MathDifficulty, MissionSpec};
use alarmgate_core::scheduler::WakeScheduler;
use alarmgate_core::sound::{RecordingBackend, SoundId};
use alarmgate_core::storage::{AlarmRepository, Database};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

#[test]
fn test_create_update_list_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alarmgate.db");

    let (id, updated) = {
        let db = Database::open_at(&path).unwrap();
        let record = db
            .create(
                AlarmSpec::at(AlarmTime::new(6, 0).unwrap())
                    .with_label("Run")
                    .repeating(RepeatDays::WEEKENDS)
                    .with_mission(MissionSpec::Math {
                        difficulty: MathDifficulty::VeryHard,
                        rounds: 2,
                    }),
            )
            .unwrap();
        let patch = AlarmPatch {
            sound: Some(SoundId::Radar),
            label: Some(None),
            ..AlarmPatch::time(AlarmTime::new(6, 30).unwrap())
        };
        let updated = db.update(&record.id, &patch).unwrap();
        (record.id, updated)
    };

    let db = Database::open_at(&path).unwrap();
    let listed = db.list().unwrap();
    assert_eq!(listed, vec![updated.clone()]);
    assert_eq!(listed.iter().filter(|r| r.id == id).count(), 1);
    assert_eq!(listed[0].id, id);
    assert_eq!(listed[0].label, None);
    assert_eq!(listed[0].time, AlarmTime::new(6, 30).unwrap());
    assert_eq!(listed[0].repeat_days, RepeatDays::WEEKENDS);
    assert!(updated.updated_at >= updated.created_at);
}

#[test]
fn test_active_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alarmgate.db");
    let now = Utc.with_ymd_and_hms(2026, 10, 16, 7, 0, 0).unwrap();

    let id = {
        let mut lc = AlarmLifecycle::new(
            Database::open_at(&path).unwrap(),
            Database::open_at(&path).unwrap(),
            RecordingBackend::new(),
        );
        let record = lc
            .create_alarm(AlarmSpec::at(AlarmTime::new(7, 0).unwrap()), &now)
            .unwrap();
        lc.fire(&record.id, &now).unwrap();
        lc.request_snooze(&now).unwrap();
        record.id
    };

    let db = Database::open_at(&path).unwrap();
    let state = db.active_state().unwrap().unwrap();
    assert_eq!(state.alarm_id, id);
    assert_eq!(state.state, AlarmState::Snoozed);
    let view = db.snoozed_view().unwrap().unwrap();
    assert_eq!(view.snooze_until, now + chrono::Duration::minutes(5));
    assert_eq!(db.armed(&id).unwrap().unwrap().fire_at, view.snooze_until);
}

proptest! {
    #[test]
    fn prop_valid_times_are_accepted(hour in 0u8..24, minute in 0u8..60) {
        let db = Database::open_memory().unwrap();
        let expected = AlarmTime { hour, minute };
        let record = db.create(AlarmSpec::at(expected)).unwrap();
        prop_assert_eq!(db.get(&record.id).unwrap().time, expected);
    }

    #[test]
    fn prop_invalid_times_are_rejected(hour in 24u8.., minute in 0u8..60) {
        let db = Database::open_memory().unwrap();
        let created = db.create(AlarmSpec::at(AlarmTime { hour, minute }));
        prop_assert!(created.is_err());
        prop_assert!(db.list().unwrap().is_empty());
    }
}
