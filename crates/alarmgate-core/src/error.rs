//! Core error types for alarmgate-core.
//!
//! This module defines the error hierarchy using thiserror. Ordinary
//! outcomes (a wrong mission answer, a rejected snooze) are modelled as
//! variants the UI can match on, not as panics.

use std::path::PathBuf;
use thiserror::Error;

use crate::lifecycle::AlarmState;

/// Core error type for alarmgate-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed alarm input, rejected on create/update.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Operation referenced an alarm id that does not exist.
    #[error("Alarm not found: {id}")]
    NotFound { id: String },

    /// Lifecycle operation attempted from a state that does not allow it.
    #[error("Invalid transition: cannot {operation} while {}", describe_state(.state))]
    InvalidTransition {
        operation: &'static str,
        state: Option<AlarmState>,
    },

    /// Fire requested for an alarm that is switched off.
    #[error("Alarm {id} is disabled")]
    AlarmDisabled { id: String },

    /// Snooze policy refused another snooze.
    #[error("Snooze not allowed after {snooze_count} snooze(s)")]
    SnoozeNotAllowed { snooze_count: u32 },

    /// Mission configuration is structurally malformed.
    #[error("Invalid mission spec: {0}")]
    InvalidSpec(String),

    /// Attempt kind does not match the configured mission.
    #[error("Mission attempt mismatch: expected {expected}, got {got}")]
    MissionMismatch {
        expected: &'static str,
        got: &'static str,
    },

    /// Storage kept failing after a retry; prior state is intact.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The wake scheduler refused to arm or cancel a trigger.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn describe_state(state: &Option<AlarmState>) -> String {
    match state {
        Some(s) => format!("{s:?}"),
        None => "no alarm is active".to_string(),
    }
}

impl CoreError {
    /// Whether a retry of the same storage call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::Database(DatabaseError::Locked)
                | CoreError::Database(DatabaseError::QueryFailed(_))
                | CoreError::Io(_)
        )
    }

    pub(crate) fn not_found(id: impl Into<String>) -> Self {
        CoreError::NotFound { id: id.into() }
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to locate the data directory
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    /// Hour/minute pair is not a time of day
    #[error("Invalid time {hour:02}:{minute:02}: hour must be 0-23 and minute 0-59")]
    InvalidTime { hour: u8, minute: u8 },

    /// Volume outside of [0, 1]
    #[error("Invalid volume {0}: must be between 0.0 and 1.0")]
    InvalidVolume(f32),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
