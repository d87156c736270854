mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, DefaultsConfig, LoggingConfig, MissionsConfig};
pub use database::Database;

use std::path::PathBuf;

use chrono::{DateTime, Local, TimeZone};

use crate::alarm::{AlarmId, AlarmPatch, AlarmRecord, AlarmSpec};
use crate::error::{ConfigError, Result};
use crate::lifecycle::{ActiveAlarmState, SnoozedAlarmView};

/// Returns the data directory, creating it if needed.
///
/// `ALARMGATE_DATA_DIR` wins when set. Otherwise `~/.config/alarmgate[-dev]/`
/// depending on `ALARMGATE_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("ALARMGATE_DATA_DIR") {
        Some(custom) => PathBuf::from(custom),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("ALARMGATE_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("alarmgate-dev")
            } else {
                base_dir.join("alarmgate")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

/// Durable store of alarm definitions and the single active alarm state.
///
/// Record writes are atomic per alarm id and last-writer-wins. Active state
/// writes are compare-and-swap on [`ActiveAlarmState::revision`].
pub trait AlarmRepository {
    /// Validate `spec` and persist it under a fresh id.
    fn create(&self, spec: AlarmSpec) -> Result<AlarmRecord>;

    /// Fails with `NotFound` for unknown ids.
    fn get(&self, id: &AlarmId) -> Result<AlarmRecord>;

    /// Fails with `NotFound` for unknown ids and `Validation` for bad patches.
    fn update(&self, id: &AlarmId, patch: &AlarmPatch) -> Result<AlarmRecord>;

    /// Fails with `NotFound` for unknown ids.
    fn delete(&self, id: &AlarmId) -> Result<()>;

    /// Every record in creation order.
    fn list_all(&self) -> Result<Vec<AlarmRecord>>;

    fn active_state(&self) -> Result<Option<ActiveAlarmState>>;

    /// Store `state` if the stored revision still equals `state.revision`
    /// (nothing stored counts as revision 0). The stored copy gets the next
    /// revision. A mismatch fails with `Persistence` and writes nothing.
    fn set_active_state(&self, state: &ActiveAlarmState) -> Result<()>;

    fn clear_active_state(&self) -> Result<()>;

    /// Atomically clear `state` and, when `disable` is set, switch its alarm
    /// off. Same revision check as [`Self::set_active_state`]. An alarm
    /// deleted while ringing is not an error.
    fn complete_occurrence(&self, state: &ActiveAlarmState, disable: bool) -> Result<()>;

    /// Records ordered by next fire time after now, disabled alarms last.
    fn list(&self) -> Result<Vec<AlarmRecord>>
    where
        Self: Sized,
    {
        self.list_at(&Local::now())
    }

    /// Records ordered by next fire time after `now`, disabled alarms last.
    fn list_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<Vec<AlarmRecord>>
    where
        Self: Sized,
    {
        let mut records = self.list_all()?;
        sort_by_next_fire(&mut records, now);
        Ok(records)
    }

    /// Projection of the active state while it is snoozed.
    fn snoozed_view(&self) -> Result<Option<SnoozedAlarmView>> {
        Ok(self.active_state()?.and_then(|s| s.snoozed_view()))
    }
}

/// Stable sort: enabled before disabled, then by next occurrence.
pub fn sort_by_next_fire<Tz: TimeZone>(records: &mut [AlarmRecord], now: &DateTime<Tz>) {
    records.sort_by_cached_key(|r| {
        let next = r.next_fire_after(now).map(|t| t.timestamp());
        (!r.enabled, next.unwrap_or(i64::MAX))
    });
}
