//! SQLite-based alarm storage.
//!
//! Provides persistent storage for:
//! - Alarm definitions (one JSON record per row)
//! - The active alarm state (key-value store, key `activeAlarm`)
//! - Armed wake triggers for the desktop run loop

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use super::{data_dir, migrations, AlarmRepository};
use crate::alarm::{AlarmId, AlarmPatch, AlarmRecord, AlarmSpec, RepeatDays};
use crate::error::{CoreError, DatabaseError, Result};
use crate::lifecycle::ActiveAlarmState;
use crate::scheduler::{WakeScheduler, WakeTrigger};

/// Key of the active alarm state in the kv table.
pub const ACTIVE_ALARM_KEY: &str = "activeAlarm";

/// SQLite database for alarms and runtime state.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data_dir>/alarmgate.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("alarmgate.db");
        Self::open_at(&path)
    }

    /// Open (or create) the database at `path`.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        // Two handles (store + scheduler) share one file.
        conn.busy_timeout(std::time::Duration::from_millis(500))?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        migrations::migrate(&self.conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
    }

    pub fn kv_delete(&self, key: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn load_record(conn: &Connection, id: &AlarmId) -> Result<Option<AlarmRecord>> {
        let json: Option<String> = conn
            .query_row(
                "SELECT record FROM alarms WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(CoreError::from))
            .transpose()
    }

    fn store_record(conn: &Connection, record: &AlarmRecord) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO alarms (id, record, created_at) VALUES (?1, ?2, ?3)",
            params![
                record.id.as_str(),
                serde_json::to_string(record)?,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Start a write transaction that takes the file lock up front, so the
    /// revision check and the write see the same active state.
    fn begin_immediate(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    /// Fail unless the stored active state is still at `expected.revision`.
    fn check_revision(tx: &Transaction<'_>, expected: &ActiveAlarmState) -> Result<()> {
        let stored: Option<String> = tx
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![ACTIVE_ALARM_KEY],
                |row| row.get(0),
            )
            .optional()?;
        let found = match stored {
            Some(json) => ActiveAlarmState::from_json(&json)?.revision,
            None => 0,
        };
        if found != expected.revision {
            return Err(CoreError::Persistence(format!(
                "active alarm changed since it was read (revision {} expected, {found} stored)",
                expected.revision
            )));
        }
        Ok(())
    }

    /// Armed triggers due at `now`, earliest first.
    pub fn due_triggers(&self, now: DateTime<Utc>) -> Result<Vec<WakeTrigger>> {
        let mut triggers = self.triggers()?;
        triggers.retain(|t| t.fire_at <= now);
        Ok(triggers)
    }

    pub fn next_trigger(&self) -> Result<Option<WakeTrigger>> {
        Ok(self.triggers()?.into_iter().next())
    }

    /// Every armed trigger, earliest first.
    pub fn triggers(&self) -> Result<Vec<WakeTrigger>> {
        let mut stmt = self
            .conn
            .prepare("SELECT alarm_id, fire_at, repeat_days FROM wake_triggers")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut triggers = Vec::new();
        for row in rows {
            let (alarm_id, fire_at, repeat_days) = row?;
            triggers.push(row_to_trigger(alarm_id, &fire_at, &repeat_days)?);
        }
        triggers.sort_by(|a, b| a.fire_at.cmp(&b.fire_at));
        Ok(triggers)
    }
}

fn row_to_trigger(alarm_id: String, fire_at: &str, repeat_days: &str) -> Result<WakeTrigger> {
    let fire_at = DateTime::parse_from_rfc3339(fire_at)
        .map_err(|e| DatabaseError::QueryFailed(format!("bad fire_at '{fire_at}': {e}")))?
        .with_timezone(&Utc);
    Ok(WakeTrigger {
        alarm_id: alarm_id.into(),
        fire_at,
        repeat_days: serde_json::from_str(repeat_days)?,
    })
}

impl AlarmRepository for Database {
    fn create(&self, spec: AlarmSpec) -> Result<AlarmRecord> {
        let record = spec.into_record(Utc::now())?;
        Self::store_record(&self.conn, &record)?;
        tracing::debug!(alarm_id = %record.id, time = %record.time, "alarm created");
        Ok(record)
    }

    fn get(&self, id: &AlarmId) -> Result<AlarmRecord> {
        Self::load_record(&self.conn, id)?.ok_or_else(|| CoreError::not_found(id.as_str()))
    }

    fn update(&self, id: &AlarmId, patch: &AlarmPatch) -> Result<AlarmRecord> {
        let tx = self.conn.unchecked_transaction()?;
        let current =
            Self::load_record(&tx, id)?.ok_or_else(|| CoreError::not_found(id.as_str()))?;
        let updated = patch.apply(&current, Utc::now())?;
        Self::store_record(&tx, &updated)?;
        tx.commit()?;
        tracing::debug!(alarm_id = %id, "alarm updated");
        Ok(updated)
    }

    fn delete(&self, id: &AlarmId) -> Result<()> {
        let removed = self
            .conn
            .execute("DELETE FROM alarms WHERE id = ?1", params![id.as_str()])?;
        if removed == 0 {
            return Err(CoreError::not_found(id.as_str()));
        }
        tracing::debug!(alarm_id = %id, "alarm deleted");
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<AlarmRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT record FROM alarms ORDER BY created_at, id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }
        Ok(records)
    }

    fn active_state(&self) -> Result<Option<ActiveAlarmState>> {
        match self.kv_get(ACTIVE_ALARM_KEY)? {
            Some(json) => Ok(Some(ActiveAlarmState::from_json(&json)?)),
            None => Ok(None),
        }
    }

    fn set_active_state(&self, state: &ActiveAlarmState) -> Result<()> {
        let tx = self.begin_immediate()?;
        Self::check_revision(&tx, state)?;
        let stored = ActiveAlarmState {
            revision: state.revision + 1,
            ..state.clone()
        };
        tx.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![ACTIVE_ALARM_KEY, serde_json::to_string(&stored)?],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn clear_active_state(&self) -> Result<()> {
        self.kv_delete(ACTIVE_ALARM_KEY)?;
        Ok(())
    }

    fn complete_occurrence(&self, state: &ActiveAlarmState, disable: bool) -> Result<()> {
        let tx = self.begin_immediate()?;
        Self::check_revision(&tx, state)?;
        tx.execute("DELETE FROM kv WHERE key = ?1", params![ACTIVE_ALARM_KEY])?;
        if disable {
            if let Some(mut record) = Self::load_record(&tx, &state.alarm_id)? {
                record.enabled = false;
                record.updated_at = Utc::now();
                Self::store_record(&tx, &record)?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl WakeScheduler for Database {
    fn arm(&mut self, alarm_id: &AlarmId, when: DateTime<Utc>, repeat_days: RepeatDays) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO wake_triggers (alarm_id, fire_at, repeat_days)
             VALUES (?1, ?2, ?3)",
            params![
                alarm_id.as_str(),
                when.to_rfc3339(),
                serde_json::to_string(&repeat_days)?,
            ],
        )?;
        Ok(())
    }

    fn cancel(&mut self, alarm_id: &AlarmId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM wake_triggers WHERE alarm_id = ?1",
            params![alarm_id.as_str()],
        )?;
        Ok(())
    }

    fn armed(&self, alarm_id: &AlarmId) -> Result<Option<WakeTrigger>> {
        let row: Option<(String, String, String)> = self
            .conn
            .query_row(
                "SELECT alarm_id, fire_at, repeat_days FROM wake_triggers WHERE alarm_id = ?1",
                params![alarm_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        row.map(|(id, fire_at, days)| row_to_trigger(id, &fire_at, &days))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmTime;
    use crate::lifecycle::AlarmState;
    use chrono::TimeZone;

    fn spec(h: u8, m: u8) -> AlarmSpec {
        AlarmSpec::at(AlarmTime::new(h, m).unwrap())
    }

    #[test]
    fn create_get_delete() {
        let db = Database::open_memory().unwrap();
        let record = db.create(spec(7, 0).with_label("Work")).unwrap();
        assert_eq!(db.get(&record.id).unwrap(), record);

        db.delete(&record.id).unwrap();
        assert!(matches!(db.get(&record.id), Err(CoreError::NotFound { .. })));
        assert!(matches!(db.delete(&record.id), Err(CoreError::NotFound { .. })));
    }

    #[test]
    fn create_rejects_invalid_time() {
        let db = Database::open_memory().unwrap();
        let bad = AlarmSpec::at(AlarmTime { hour: 12, minute: 75 });
        assert!(matches!(db.create(bad), Err(CoreError::Validation(_))));
        assert!(db.list_all().unwrap().is_empty());
    }

    #[test]
    fn update_unknown_is_not_found() {
        let db = Database::open_memory().unwrap();
        let patch = AlarmPatch::time(AlarmTime::new(8, 0).unwrap());
        assert!(matches!(
            db.update(&"missing".into(), &patch),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn failed_update_leaves_record_untouched() {
        let db = Database::open_memory().unwrap();
        let record = db.create(spec(7, 0)).unwrap();
        let patch = AlarmPatch {
            sound_volume: Some(2.0),
            ..AlarmPatch::default()
        };
        assert!(db.update(&record.id, &patch).is_err());
        assert_eq!(db.get(&record.id).unwrap(), record);
    }

    #[test]
    fn list_orders_by_next_fire() {
        let db = Database::open_memory().unwrap();
        let nine = db.create(spec(9, 0)).unwrap();
        let six = db.create(spec(6, 0)).unwrap();
        let eight = db.create(spec(8, 0)).unwrap();
        let off = db
            .create(AlarmSpec {
                enabled: false,
                ..spec(7, 30)
            })
            .unwrap();

        // At 07:00 the 06:00 alarm next fires tomorrow.
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 7, 0, 0).unwrap();
        let ids: Vec<AlarmId> = db.list_at(&now).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![eight.id, nine.id, six.id, off.id]);
    }

    #[test]
    fn active_state_round_trip_and_complete() {
        let db = Database::open_memory().unwrap();
        let record = db.create(spec(7, 0)).unwrap();
        assert!(db.active_state().unwrap().is_none());

        let now = Utc.with_ymd_and_hms(2026, 10, 16, 7, 0, 0).unwrap();
        let state = ActiveAlarmState::ringing(&record, now);
        db.set_active_state(&state).unwrap();
        let loaded = db.active_state().unwrap().unwrap();
        assert_eq!(loaded.revision, 1);
        assert_eq!(
            loaded,
            ActiveAlarmState {
                revision: 1,
                ..state
            }
        );
        assert_eq!(loaded.state, AlarmState::Ringing);
        assert!(db.snoozed_view().unwrap().is_none());

        db.complete_occurrence(&loaded, true).unwrap();
        assert!(db.active_state().unwrap().is_none());
        assert!(!db.get(&record.id).unwrap().enabled);
    }

    #[test]
    fn complete_occurrence_tolerates_deleted_alarm() {
        let db = Database::open_memory().unwrap();
        let record = db.create(spec(7, 0)).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 7, 0, 0).unwrap();
        db.set_active_state(&ActiveAlarmState::ringing(&record, now))
            .unwrap();
        db.delete(&record.id).unwrap();

        let stored = db.active_state().unwrap().unwrap();
        db.complete_occurrence(&stored, true).unwrap();
        assert!(db.active_state().unwrap().is_none());
    }

    #[test]
    fn stale_active_state_write_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alarms.db");
        let first = Database::open_at(&path).unwrap();
        let second = Database::open_at(&path).unwrap();
        let a = first.create(spec(7, 0)).unwrap();
        let b = first.create(spec(7, 0)).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 7, 0, 0).unwrap();
        first
            .set_active_state(&ActiveAlarmState::ringing(&a, now))
            .unwrap();

        // Both handles read revision 1.
        let mut deferring = first.active_state().unwrap().unwrap();
        let mut starting = second.active_state().unwrap().unwrap();

        deferring.deferred.push(b.id.clone());
        first.set_active_state(&deferring).unwrap();

        starting.state = AlarmState::MissionInProgress;
        assert!(matches!(
            second.set_active_state(&starting),
            Err(CoreError::Persistence(_))
        ));
        assert!(matches!(
            second.complete_occurrence(&starting, true),
            Err(CoreError::Persistence(_))
        ));

        let stored = second.active_state().unwrap().unwrap();
        assert_eq!(stored.revision, 2);
        assert_eq!(stored.state, AlarmState::Ringing);
        assert_eq!(stored.deferred, vec![b.id]);
        assert!(second.get(&a.id).unwrap().enabled);
    }

    #[test]
    fn fresh_state_cannot_replace_stored_one() {
        let db = Database::open_memory().unwrap();
        let a = db.create(spec(7, 0)).unwrap();
        let b = db.create(spec(7, 0)).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 7, 0, 0).unwrap();
        db.set_active_state(&ActiveAlarmState::ringing(&a, now)).unwrap();

        assert!(matches!(
            db.set_active_state(&ActiveAlarmState::ringing(&b, now)),
            Err(CoreError::Persistence(_))
        ));
        assert_eq!(db.active_state().unwrap().unwrap().alarm_id, a.id);
    }

    #[test]
    fn wake_triggers_persist() {
        let mut db = Database::open_memory().unwrap();
        let t = Utc.with_ymd_and_hms(2026, 10, 16, 7, 0, 0).unwrap();
        let id = AlarmId::from("a");
        db.arm(&id, t, RepeatDays::WEEKDAYS).unwrap();
        db.arm(&"b".into(), t - chrono::Duration::hours(1), RepeatDays::NONE)
            .unwrap();

        let armed = db.armed(&id).unwrap().unwrap();
        assert_eq!(armed.fire_at, t);
        assert_eq!(armed.repeat_days, RepeatDays::WEEKDAYS);
        assert_eq!(db.next_trigger().unwrap().unwrap().alarm_id.as_str(), "b");
        assert_eq!(db.due_triggers(t - chrono::Duration::minutes(30)).unwrap().len(), 1);

        db.cancel(&id).unwrap();
        db.cancel(&id).unwrap();
        assert!(db.armed(&id).unwrap().is_none());
    }

    #[test]
    fn on_disk_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alarms.db");
        let id = {
            let db = Database::open_at(&path).unwrap();
            db.create(spec(7, 0)).unwrap().id
        };
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.get(&id).unwrap().time, AlarmTime::new(7, 0).unwrap());
    }
}
