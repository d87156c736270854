//! Wake scheduling.
//!
//! The platform notification service is the only timer authority: the core
//! arms a trigger for an alarm and later receives `on_fire` for it. This
//! module defines that seam and an in-process implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alarm::{AlarmId, RepeatDays};
use crate::error::{CoreError, Result};

/// One armed wake-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeTrigger {
    pub alarm_id: AlarmId,
    pub fire_at: DateTime<Utc>,
    #[serde(default)]
    pub repeat_days: RepeatDays,
}

/// Arms and cancels platform wake triggers. At most one trigger per alarm;
/// arming again replaces the previous one.
pub trait WakeScheduler {
    fn arm(&mut self, alarm_id: &AlarmId, when: DateTime<Utc>, repeat_days: RepeatDays) -> Result<()>;

    /// Must tolerate an alarm with nothing armed.
    fn cancel(&mut self, alarm_id: &AlarmId) -> Result<()>;

    fn armed(&self, alarm_id: &AlarmId) -> Result<Option<WakeTrigger>>;

    /// Put back a trigger captured with [`WakeScheduler::armed`].
    fn restore(&mut self, alarm_id: &AlarmId, previous: Option<WakeTrigger>) -> Result<()> {
        match previous {
            Some(t) => self.arm(alarm_id, t.fire_at, t.repeat_days),
            None => self.cancel(alarm_id),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    triggers: HashMap<AlarmId, WakeTrigger>,
    unavailable: bool,
}

/// In-memory scheduler. Clones share the same trigger table.
#[derive(Debug, Clone, Default)]
pub struct MemoryWakeScheduler {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryWakeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| CoreError::Scheduler("trigger table poisoned".into()))
    }

    /// Simulate the platform refusing requests.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.unavailable = unavailable;
        }
    }

    /// Triggers due at `now`, earliest first.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<WakeTrigger> {
        let mut due: Vec<WakeTrigger> = self
            .triggers()
            .into_iter()
            .filter(|t| t.fire_at <= now)
            .collect();
        due.sort_by(|a, b| a.fire_at.cmp(&b.fire_at));
        due
    }

    pub fn next_trigger(&self) -> Option<WakeTrigger> {
        self.triggers().into_iter().min_by_key(|t| t.fire_at)
    }

    pub fn triggers(&self) -> Vec<WakeTrigger> {
        self.inner
            .lock()
            .map(|inner| inner.triggers.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl WakeScheduler for MemoryWakeScheduler {
    fn arm(&mut self, alarm_id: &AlarmId, when: DateTime<Utc>, repeat_days: RepeatDays) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.unavailable {
            return Err(CoreError::Scheduler("notification service unavailable".into()));
        }
        inner.triggers.insert(
            alarm_id.clone(),
            WakeTrigger {
                alarm_id: alarm_id.clone(),
                fire_at: when,
                repeat_days,
            },
        );
        Ok(())
    }

    fn cancel(&mut self, alarm_id: &AlarmId) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.unavailable {
            return Err(CoreError::Scheduler("notification service unavailable".into()));
        }
        inner.triggers.remove(alarm_id);
        Ok(())
    }

    fn armed(&self, alarm_id: &AlarmId) -> Result<Option<WakeTrigger>> {
        Ok(self.lock()?.triggers.get(alarm_id).cloned())
    }
}
