//! # Alarmgate Core Library
//!
//! Core logic for an alarm clock whose alarms can only be silenced by
//! completing a wake-up mission. All operations are available via the
//! standalone CLI binary; any GUI is a thin layer over the same library.
//!
//! ## Architecture
//!
//! - **Lifecycle**: a state machine owning the single active alarm, the
//!   tone player and the wake triggers
//! - **Missions**: pure evaluation of math, typing, QR, photo, tetris and
//!   wordle challenges
//! - **Snooze**: policy checks and wake-instant arithmetic
//! - **Storage**: SQLite alarm repository and TOML configuration
//!
//! ## Key Components
//!
//! - [`AlarmLifecycle`]: transitions between ringing, snoozed and mission states
//! - [`MissionGate`]: mission attempt evaluation
//! - [`Database`]: alarm and active-state persistence
//! - [`Config`]: application configuration management

pub mod alarm;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod mission;
pub mod scheduler;
pub mod snooze;
pub mod sound;
pub mod storage;

pub use alarm::{AlarmId, AlarmPatch, AlarmRecord, AlarmSpec, AlarmTime, RepeatDays};
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use events::Event;
pub use lifecycle::{ActiveAlarmState, AlarmLifecycle, AlarmState, SnoozedAlarmView};
pub use mission::{
    MathDifficulty, MissionAttempt, MissionAttemptResult, MissionGate, MissionKind, MissionSpec,
};
pub use scheduler::{MemoryWakeScheduler, WakeScheduler, WakeTrigger};
pub use snooze::SnoozePolicy;
pub use sound::{AudioBackend, SilentBackend, SoundId, SoundPlayer};
pub use storage::{AlarmRepository, Config, Database};
