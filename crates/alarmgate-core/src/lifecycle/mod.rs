//! Alarm lifecycle state machine.
//!
//! The single writer of [`ActiveAlarmState`] and the only caller allowed to
//! start or stop the alarm tone.
//!
//! ## State Transitions
//!
//! ```text
//! Scheduled -> Ringing -> (Snoozed | MissionInProgress) -> Dismissed
//!                 ^            |
//!                 +------------+  (snooze expiry)
//! ```
//!
//! Every transition applies its side effects in a fixed order: audio, then
//! the wake trigger, then storage. A storage failure after one retry rolls
//! the audio and trigger back and leaves the persisted state as it was.
//!
//! Operations take `now` from the caller, so the machine itself never reads
//! the clock.

mod state;

pub use state::{ActiveAlarmState, AlarmState, SnoozedAlarmView, ACTIVE_STATE_VERSION};

use chrono::{DateTime, TimeZone, Utc};

use crate::alarm::{AlarmId, AlarmPatch, AlarmRecord, AlarmSpec, RepeatDays};
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::mission::{MissionAttempt, MissionAttemptResult, MissionGate, MissionProgress};
use crate::scheduler::{WakeScheduler, WakeTrigger};
use crate::sound::{AudioBackend, SoundPlayer, StartOutcome};
use crate::storage::AlarmRepository;

#[derive(Debug, Clone, Copy)]
enum AudioChange {
    Keep,
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy)]
enum TriggerChange {
    Keep,
    Arm {
        at: DateTime<Utc>,
        repeat_days: RepeatDays,
    },
    Cancel,
}

#[derive(Debug, Clone, Copy)]
enum Commit {
    /// Write the new active state.
    Save,
    /// Clear the active state, optionally switching the alarm off.
    Complete { disable: bool },
}

fn scheduler_error(err: CoreError) -> CoreError {
    match err {
        CoreError::Scheduler(_) => err,
        other => CoreError::Scheduler(other.to_string()),
    }
}

/// Drives one alarm at a time from ringing to dismissed.
pub struct AlarmLifecycle<R, S, B>
where
    R: AlarmRepository,
    S: WakeScheduler,
    B: AudioBackend,
{
    repo: R,
    scheduler: S,
    player: SoundPlayer<B>,
    gate: MissionGate,
}

impl<R, S, B> AlarmLifecycle<R, S, B>
where
    R: AlarmRepository,
    S: WakeScheduler,
    B: AudioBackend,
{
    pub fn new(repo: R, scheduler: S, backend: B) -> Self {
        Self {
            repo,
            scheduler,
            player: SoundPlayer::new(backend),
            gate: MissionGate::new(),
        }
    }

    /// Replace the mission gate (seeded or with a custom typing window).
    pub fn with_gate(mut self, gate: MissionGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Read-only access to the tone player.
    pub fn player(&self) -> &SoundPlayer<B> {
        &self.player
    }

    /// The alarm in flight, if any.
    pub fn status(&self) -> Result<Option<ActiveAlarmState>> {
        self.read(|repo| repo.active_state())
    }

    pub fn snoozed_view(&self) -> Result<Option<SnoozedAlarmView>> {
        Ok(self.status()?.and_then(|s| s.snoozed_view()))
    }

    // ── Alarm definitions ──────────────────────────────────────────────

    /// Persist a new alarm and arm its first occurrence.
    pub fn create_alarm<Tz: TimeZone>(
        &mut self,
        spec: AlarmSpec,
        now: &DateTime<Tz>,
    ) -> Result<AlarmRecord> {
        let record = self.repo.create(spec)?;
        self.schedule_alarm(&record.id, now)?;
        Ok(record)
    }

    /// Apply `patch` and re-arm. An alarm in flight keeps its fire-time
    /// snapshot; the change applies from its next occurrence.
    pub fn update_alarm<Tz: TimeZone>(
        &mut self,
        id: &AlarmId,
        patch: &AlarmPatch,
        now: &DateTime<Tz>,
    ) -> Result<AlarmRecord> {
        let record = self.repo.update(id, patch)?;
        self.schedule_alarm(id, now)?;
        Ok(record)
    }

    /// Delete an alarm. Deleting the alarm in flight does not silence it.
    pub fn delete_alarm(&mut self, id: &AlarmId) -> Result<()> {
        self.repo.delete(id)?;
        if let Some(mut active) = self.status()? {
            if &active.alarm_id == id {
                return Ok(());
            }
            if active.deferred.contains(id) {
                active.deferred.retain(|d| d != id);
                self.transition(&active, AudioChange::Keep, TriggerChange::Keep, Commit::Save)?;
            }
        }
        self.scheduler.cancel(id).map_err(scheduler_error)
    }

    /// Arm the next occurrence of `id`, or cancel its trigger when it is
    /// disabled. Alarms in flight are left alone until dismissed.
    pub fn schedule_alarm<Tz: TimeZone>(
        &mut self,
        id: &AlarmId,
        now: &DateTime<Tz>,
    ) -> Result<Option<DateTime<Utc>>> {
        let record = self.read(|repo| repo.get(id))?;
        let active = self.status()?;
        self.schedule_record(&record, active.as_ref(), now)
    }

    /// Re-arm every alarm, e.g. after a reboot or a clock change.
    pub fn reschedule_all<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<Vec<WakeTrigger>> {
        let records = self.read(|repo| repo.list_all())?;
        let active = self.status()?;
        let mut armed = Vec::new();
        for record in &records {
            if let Some(fire_at) = self.schedule_record(record, active.as_ref(), now)? {
                armed.push(WakeTrigger {
                    alarm_id: record.id.clone(),
                    fire_at,
                    repeat_days: record.repeat_days,
                });
            }
        }
        tracing::info!(armed = armed.len(), total = records.len(), "alarms rescheduled");
        Ok(armed)
    }

    fn schedule_record<Tz: TimeZone>(
        &mut self,
        record: &AlarmRecord,
        active: Option<&ActiveAlarmState>,
        now: &DateTime<Tz>,
    ) -> Result<Option<DateTime<Utc>>> {
        let in_flight = active
            .is_some_and(|a| a.alarm_id == record.id || a.deferred.contains(&record.id));
        if in_flight {
            return Ok(None);
        }
        let next = if record.enabled {
            record.next_fire_after(now).map(|t| t.with_timezone(&Utc))
        } else {
            None
        };
        match next {
            Some(at) => {
                self.scheduler
                    .arm(&record.id, at, record.repeat_days)
                    .map_err(scheduler_error)?;
                tracing::debug!(alarm_id = %record.id, fire_at = %at, "wake trigger armed");
            }
            None => self.scheduler.cancel(&record.id).map_err(scheduler_error)?,
        }
        Ok(next)
    }

    // ── Transitions ────────────────────────────────────────────────────

    /// Entry point for a wake trigger. Routes a due snooze trigger to
    /// [`Self::snooze_expired`] and everything else to [`Self::fire`].
    pub fn on_fire<Tz: TimeZone>(&mut self, alarm_id: &AlarmId, now: &DateTime<Tz>) -> Result<Event> {
        let at = now.with_timezone(&Utc);
        if let Some(active) = self.status()? {
            if &active.alarm_id == alarm_id && active.state == AlarmState::Snoozed {
                if active.is_snooze_due(at) {
                    return self.snooze_expired(now);
                }
                return Ok(Event::AlarmAlreadyActive {
                    alarm_id: alarm_id.clone(),
                    state: active.state,
                    at,
                });
            }
        }
        self.fire(alarm_id, now)
    }

    /// Scheduled -> Ringing.
    ///
    /// A repeat delivery for the alarm in flight changes nothing. A different
    /// alarm firing while one is active is queued and rings after dismissal.
    pub fn fire<Tz: TimeZone>(&mut self, alarm_id: &AlarmId, now: &DateTime<Tz>) -> Result<Event> {
        let at = now.with_timezone(&Utc);
        let active = self.status()?;

        if let Some(active) = &active {
            if &active.alarm_id == alarm_id {
                tracing::debug!(alarm_id = %alarm_id, state = ?active.state, "duplicate fire ignored");
                return Ok(Event::AlarmAlreadyActive {
                    alarm_id: alarm_id.clone(),
                    state: active.state,
                    at,
                });
            }
        }

        let record = match self.read(|repo| repo.get(alarm_id)) {
            Ok(record) => record,
            Err(e @ CoreError::NotFound { .. }) => {
                self.consume_trigger(alarm_id);
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        if !record.enabled {
            self.consume_trigger(alarm_id);
            return Err(CoreError::AlarmDisabled {
                id: alarm_id.to_string(),
            });
        }

        match active {
            Some(mut active) => {
                if !active.deferred.contains(alarm_id) {
                    active.deferred.push(alarm_id.clone());
                    self.transition(&active, AudioChange::Keep, TriggerChange::Keep, Commit::Save)?;
                }
                self.consume_trigger(alarm_id);
                tracing::info!(
                    alarm_id = %alarm_id,
                    active_alarm_id = %active.alarm_id,
                    "alarm deferred behind active alarm"
                );
                Ok(Event::AlarmDeferred {
                    alarm_id: alarm_id.clone(),
                    active_alarm_id: active.alarm_id,
                    at,
                })
            }
            None => self.ring(&record, Vec::new(), at),
        }
    }

    /// Ringing -> Snoozed.
    pub fn request_snooze<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<Event> {
        let at = now.with_timezone(&Utc);
        let mut active = self.require_active("snooze")?;
        if active.state != AlarmState::Ringing {
            return Err(CoreError::InvalidTransition {
                operation: "snooze",
                state: Some(active.state),
            });
        }
        if !crate::snooze::can_snooze(&active.snooze_policy, active.snooze_count) {
            return Err(CoreError::SnoozeNotAllowed {
                snooze_count: active.snooze_count,
            });
        }

        let until = crate::snooze::next_wake_instant(&at, &active.snooze_policy);
        active.state = AlarmState::Snoozed;
        active.snooze_count = active.snooze_count.saturating_add(1);
        active.snooze_until = Some(until);

        self.transition(
            &active,
            AudioChange::Stop,
            TriggerChange::Arm {
                at: until,
                repeat_days: RepeatDays::NONE,
            },
            Commit::Save,
        )?;

        let snoozes_remaining = active.snooze_policy.remaining(active.snooze_count);
        tracing::info!(
            alarm_id = %active.alarm_id,
            snooze_count = active.snooze_count,
            snooze_until = %until,
            "alarm snoozed"
        );
        Ok(Event::AlarmSnoozed {
            alarm_id: active.alarm_id,
            snooze_count: active.snooze_count,
            snooze_until: until,
            snoozes_remaining,
            at,
        })
    }

    /// Snoozed -> Ringing, once `snooze_until` has passed.
    pub fn snooze_expired<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<Event> {
        let at = now.with_timezone(&Utc);
        let mut active = self.require_active("end a snooze")?;
        if active.state != AlarmState::Snoozed {
            return Err(CoreError::InvalidTransition {
                operation: "end a snooze",
                state: Some(active.state),
            });
        }
        if !active.is_snooze_due(at) {
            return Err(CoreError::InvalidTransition {
                operation: "end a snooze before it runs out",
                state: Some(active.state),
            });
        }

        active.state = AlarmState::Ringing;
        active.snooze_until = None;
        let sound_started =
            self.transition(&active, AudioChange::Start, TriggerChange::Keep, Commit::Save)?;
        self.consume_trigger(&active.alarm_id);

        tracing::info!(
            alarm_id = %active.alarm_id,
            snooze_count = active.snooze_count,
            "snooze expired, ringing again"
        );
        Ok(Event::SnoozeExpired {
            alarm_id: active.alarm_id,
            snooze_count: active.snooze_count,
            sound_started,
            at,
        })
    }

    /// Ringing -> MissionInProgress. The tone keeps playing.
    ///
    /// Also accepted while snoozed, which ends the snooze early and brings
    /// the tone back.
    pub fn start_mission<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<Event> {
        let at = now.with_timezone(&Utc);
        let mut active = self.require_active("start a mission")?;
        let (audio, trigger) = match active.state {
            AlarmState::Ringing => (AudioChange::Keep, TriggerChange::Keep),
            AlarmState::Snoozed => (AudioChange::Start, TriggerChange::Cancel),
            AlarmState::MissionInProgress => {
                return Err(CoreError::InvalidTransition {
                    operation: "start a mission",
                    state: Some(active.state),
                })
            }
        };
        let Some(mission) = active.mission.clone() else {
            return Err(CoreError::InvalidTransition {
                operation: "start a mission on an alarm without one",
                state: Some(active.state),
            });
        };

        let progress = self.gate.begin(&mission, at)?;
        let problem = progress.current_problem().map(|p| p.text.clone());
        active.state = AlarmState::MissionInProgress;
        active.snooze_until = None;
        active.mission_progress = Some(progress);
        self.transition(&active, audio, trigger, Commit::Save)?;

        tracing::info!(alarm_id = %active.alarm_id, mission = %mission.kind(), "mission started");
        Ok(Event::MissionStarted {
            alarm_id: active.alarm_id,
            mission: mission.kind(),
            problem,
            at,
        })
    }

    /// MissionInProgress -> Dismissed on success; otherwise stays in
    /// MissionInProgress with the updated progress persisted.
    pub fn submit_mission_attempt<Tz: TimeZone>(
        &mut self,
        attempt: &MissionAttempt,
        now: &DateTime<Tz>,
    ) -> Result<Event> {
        let at = now.with_timezone(&Utc);
        let mut active = self.require_active("submit a mission attempt")?;
        if active.state != AlarmState::MissionInProgress {
            return Err(CoreError::InvalidTransition {
                operation: "submit a mission attempt",
                state: Some(active.state),
            });
        }
        let Some(mission) = active.mission.clone() else {
            return Err(CoreError::InvalidTransition {
                operation: "submit an attempt for an alarm without a mission",
                state: Some(active.state),
            });
        };

        let mut progress = active
            .mission_progress
            .clone()
            .unwrap_or(MissionProgress::Stateless);
        let result = self.gate.evaluate(&mission, &mut progress, attempt, at)?;
        if result.success {
            return self.complete(active, Some(result), now);
        }

        active.mission_progress = Some(progress);
        self.transition(&active, AudioChange::Keep, TriggerChange::Keep, Commit::Save)?;
        tracing::debug!(alarm_id = %active.alarm_id, mission = %result.mission, "mission attempt failed");
        Ok(Event::MissionAttemptFailed {
            alarm_id: active.alarm_id,
            result,
            at,
        })
    }

    /// Ringing or Snoozed -> Dismissed, only for alarms without a mission.
    pub fn dismiss_without_mission<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<Event> {
        let active = self.require_active("dismiss")?;
        if active.has_mission() {
            return Err(CoreError::InvalidTransition {
                operation: "dismiss without completing the mission",
                state: Some(active.state),
            });
        }
        if active.state == AlarmState::MissionInProgress {
            return Err(CoreError::InvalidTransition {
                operation: "dismiss",
                state: Some(active.state),
            });
        }
        self.complete(active, None, now)
    }

    /// Realign in-process audio and triggers with the persisted state.
    ///
    /// Called at start-up and periodically by long-lived hosts, since another
    /// handle on the same storage may have snoozed or dismissed the alarm.
    /// The tone plays exactly when the stored state says it should, with the
    /// stored sound. A snooze that ran out in the meantime rings now.
    pub fn restore<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<Option<Event>> {
        let at = now.with_timezone(&Utc);
        let Some(active) = self.status()? else {
            self.silence("no alarm is active");
            return Ok(None);
        };
        match active.state {
            AlarmState::Snoozed => {
                self.silence("alarm is snoozed");
                if active.is_snooze_due(at) {
                    return self.snooze_expired(now).map(Some);
                }
                if let Some(until) = active.snooze_until {
                    let armed = self.armed_quietly(&active.alarm_id).map(|t| t.fire_at);
                    if armed != Some(until) {
                        self.scheduler
                            .arm(&active.alarm_id, until, RepeatDays::NONE)
                            .map_err(scheduler_error)?;
                    }
                }
                Ok(None)
            }
            AlarmState::Ringing | AlarmState::MissionInProgress => {
                let wanted = (active.sound, active.sound_volume.clamp(0.0, 1.0));
                if self.player.now_playing().is_some_and(|playing| playing != wanted) {
                    self.silence("another alarm is active");
                }
                if !self.player.is_playing() {
                    self.start_sound(&active);
                    tracing::info!(alarm_id = %active.alarm_id, state = ?active.state, "alarm tone restored");
                }
                Ok(None)
            }
        }
    }

    // ── Internals ──────────────────────────────────────────────────────

    /// Stop a tone the stored state no longer calls for.
    fn silence(&mut self, reason: &'static str) {
        if self.player.stop() {
            tracing::info!(reason, "stale alarm tone stopped");
        }
    }

    fn ring(
        &mut self,
        record: &AlarmRecord,
        deferred: Vec<AlarmId>,
        at: DateTime<Utc>,
    ) -> Result<Event> {
        let mut state = ActiveAlarmState::ringing(record, at);
        state.deferred = deferred;
        let sound_started =
            self.transition(&state, AudioChange::Start, TriggerChange::Keep, Commit::Save)?;
        self.consume_trigger(&record.id);

        tracing::info!(
            alarm_id = %record.id,
            sound = %record.sound,
            mission = record.mission.as_ref().map(|m| m.kind().as_str()),
            "alarm ringing"
        );
        Ok(Event::AlarmRinging {
            alarm_id: record.id.clone(),
            sound_started,
            at,
        })
    }

    fn complete<Tz: TimeZone>(
        &mut self,
        active: ActiveAlarmState,
        result: Option<MissionAttemptResult>,
        now: &DateTime<Tz>,
    ) -> Result<Event> {
        let at = now.with_timezone(&Utc);
        let record = match self.read(|repo| repo.get(&active.alarm_id)) {
            Ok(record) => Some(record),
            Err(CoreError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        let next_fire_at = record
            .as_ref()
            .filter(|r| r.enabled && r.is_repeating())
            .and_then(|r| r.next_fire_after(now))
            .map(|t| t.with_timezone(&Utc));
        let trigger = match (next_fire_at, &record) {
            (Some(at), Some(r)) => TriggerChange::Arm {
                at,
                repeat_days: r.repeat_days,
            },
            _ => TriggerChange::Cancel,
        };
        let disable = record.as_ref().is_some_and(|r| !r.is_repeating());

        self.transition(&active, AudioChange::Stop, trigger, Commit::Complete { disable })?;
        tracing::info!(
            alarm_id = %active.alarm_id,
            via_mission = result.is_some(),
            next_fire_at = ?next_fire_at,
            "alarm dismissed"
        );

        let next_ringing = self.ring_deferred(&active.deferred, at);
        Ok(Event::AlarmDismissed {
            alarm_id: active.alarm_id,
            result,
            next_fire_at,
            next_ringing,
            at,
        })
    }

    /// Ring the first deferred alarm that still exists and is enabled.
    fn ring_deferred(&mut self, queue: &[AlarmId], at: DateTime<Utc>) -> Option<AlarmId> {
        for (i, id) in queue.iter().enumerate() {
            let record = match self.read(|repo| repo.get(id)) {
                Ok(record) if record.enabled => record,
                Ok(_) => {
                    tracing::debug!(alarm_id = %id, "skipping deferred alarm that was disabled");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(alarm_id = %id, error = %e, "skipping deferred alarm");
                    continue;
                }
            };
            match self.ring(&record, queue[i + 1..].to_vec(), at) {
                Ok(_) => return Some(id.clone()),
                Err(e) => {
                    // Leave them due so the next trigger check picks them up.
                    tracing::error!(alarm_id = %id, error = %e, "failed to ring deferred alarm");
                    for pending in &queue[i..] {
                        if let Err(e) = self.scheduler.arm(pending, at, RepeatDays::NONE) {
                            tracing::warn!(alarm_id = %pending, error = %e, "failed to requeue deferred alarm");
                        }
                    }
                    return None;
                }
            }
        }
        None
    }

    /// Apply one transition's side effects in order and roll back on failure.
    /// Returns whether the tone is audible afterwards.
    fn transition(
        &mut self,
        state: &ActiveAlarmState,
        audio: AudioChange,
        trigger: TriggerChange,
        commit: Commit,
    ) -> Result<bool> {
        let id = &state.alarm_id;

        let (started_now, stopped, audible) = match audio {
            AudioChange::Keep => (false, false, self.player.is_playing()),
            AudioChange::Start => {
                let (started_now, audible) = self.start_sound(state);
                (started_now, false, audible)
            }
            AudioChange::Stop => (false, self.player.stop(), false),
        };

        let previous = match trigger {
            TriggerChange::Keep => None,
            _ => Some(self.armed_quietly(id)),
        };
        let armed = match trigger {
            TriggerChange::Keep => Ok(()),
            TriggerChange::Arm { at, repeat_days } => self.scheduler.arm(id, at, repeat_days),
            TriggerChange::Cancel => self.scheduler.cancel(id),
        };
        if let Err(e) = armed {
            self.undo_audio(state, started_now, stopped);
            return Err(scheduler_error(e));
        }

        let saved = match commit {
            Commit::Save => self.write("save active alarm", |repo| repo.set_active_state(state)),
            Commit::Complete { disable } => self.write("complete occurrence", |repo| {
                repo.complete_occurrence(state, disable)
            }),
        };
        if let Err(e) = saved {
            if let Some(previous) = previous {
                if let Err(re) = self.scheduler.restore(id, previous) {
                    tracing::warn!(alarm_id = %id, error = %re, "failed to restore wake trigger");
                }
            }
            self.undo_audio(state, started_now, stopped);
            return Err(e);
        }

        Ok(audible)
    }

    fn undo_audio(&mut self, state: &ActiveAlarmState, started_now: bool, stopped: bool) {
        if started_now {
            self.player.stop();
        }
        if stopped {
            self.start_sound(state);
        }
    }

    /// Returns `(started_now, audible)`. A failed start is logged and the
    /// transition carries on silently.
    fn start_sound(&mut self, state: &ActiveAlarmState) -> (bool, bool) {
        match self.player.start(state.sound, state.sound_volume) {
            Ok(StartOutcome::Started) => (true, true),
            Ok(StartOutcome::AlreadyPlaying) => (false, true),
            Err(e) => {
                tracing::warn!(
                    alarm_id = %state.alarm_id,
                    sound = %state.sound,
                    error = %e,
                    "alarm tone failed to start"
                );
                (false, false)
            }
        }
    }

    fn armed_quietly(&self, id: &AlarmId) -> Option<WakeTrigger> {
        self.scheduler.armed(id).unwrap_or_else(|e| {
            tracing::warn!(alarm_id = %id, error = %e, "failed to read wake trigger");
            None
        })
    }

    /// Drop the trigger that just fired. At-least-once delivery makes a
    /// leftover harmless, so failures are only logged.
    fn consume_trigger(&mut self, id: &AlarmId) {
        if let Err(e) = self.scheduler.cancel(id) {
            tracing::warn!(alarm_id = %id, error = %e, "failed to consume wake trigger");
        }
    }

    fn require_active(&self, operation: &'static str) -> Result<ActiveAlarmState> {
        self.status()?.ok_or(CoreError::InvalidTransition {
            operation,
            state: None,
        })
    }

    /// Storage read, retried once on a transient failure.
    fn read<T>(&self, op: impl Fn(&R) -> Result<T>) -> Result<T> {
        match op(&self.repo) {
            Err(first) if first.is_transient() => {
                tracing::warn!(error = %first, "storage read failed, retrying once");
                op(&self.repo).map_err(|e| {
                    if e.is_transient() {
                        CoreError::Persistence(e.to_string())
                    } else {
                        e
                    }
                })
            }
            other => other,
        }
    }

    /// Storage write, retried once on a transient failure. A second
    /// transient failure becomes a [`CoreError::Persistence`].
    fn write<T>(&self, what: &str, op: impl Fn(&R) -> Result<T>) -> Result<T> {
        let outcome = match op(&self.repo) {
            Err(first) if first.is_transient() => {
                tracing::warn!(error = %first, what, "storage write failed, retrying once");
                op(&self.repo)
            }
            other => other,
        };
        outcome.map_err(|e| {
            tracing::error!(error = %e, what, "storage write failed");
            if e.is_transient() {
                CoreError::Persistence(format!("{what}: {e}"))
            } else {
                e
            }
        })
    }
}
