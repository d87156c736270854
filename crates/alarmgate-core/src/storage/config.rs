//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Defaults applied to newly created alarms (tone, volume, snooze policy)
//! - Mission tuning (typing window, math difficulty and rounds)
//! - Log level
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::mission::{MathDifficulty, MissionGate, DEFAULT_TYPING_TIMEOUT_SECS};
use crate::snooze::SnoozePolicy;
use crate::sound::SoundId;

/// Values applied when an alarm is created without explicit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub sound: SoundId,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub snooze: SnoozePolicy,
}

/// Mission tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionsConfig {
    #[serde(default = "default_typing_timeout")]
    pub typing_timeout_secs: u32,
    #[serde(default)]
    pub math_difficulty: MathDifficulty,
    #[serde(default = "default_math_rounds")]
    pub math_rounds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub missions: MissionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_volume() -> f32 {
    0.8
}
fn default_typing_timeout() -> u32 {
    DEFAULT_TYPING_TIMEOUT_SECS as u32
}
fn default_math_rounds() -> u32 {
    3
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            sound: SoundId::default(),
            volume: default_volume(),
            snooze: SnoozePolicy::default(),
        }
    }
}

impl Default for MissionsConfig {
    fn default() -> Self {
        Self {
            typing_timeout_secs: default_typing_timeout(),
            math_difficulty: MathDifficulty::default(),
            math_rounds: default_math_rounds(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return (and write) the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit the
    /// field (for example an unknown sound name).
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let next: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Set a config value by key and save.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.set_value(key, value)?;
        self.save()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.defaults.volume) {
            return Err(ConfigError::InvalidValue {
                key: "defaults.volume".into(),
                message: "must be between 0.0 and 1.0".into(),
            });
        }
        self.defaults
            .snooze
            .validate()
            .map_err(|e| ConfigError::InvalidValue {
                key: "defaults.snooze".into(),
                message: e.to_string(),
            })?;
        if self.missions.math_rounds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "missions.math_rounds".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Mission gate tuned from this config.
    pub fn mission_gate(&self) -> MissionGate {
        MissionGate::new().with_typing_timeout(Duration::seconds(i64::from(
            self.missions.typing_timeout_secs,
        )))
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.defaults.sound, SoundId::Classic);
        assert_eq!(parsed.missions.typing_timeout_secs, 20);
        assert_eq!(parsed.defaults.snooze, SnoozePolicy::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[missions]\nmath_rounds = 5\n").unwrap();
        assert_eq!(parsed.missions.math_rounds, 5);
        assert_eq!(parsed.missions.math_difficulty, MathDifficulty::Medium);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("defaults.snooze.max").as_deref(), Some("3"));
        assert_eq!(cfg.get("defaults.sound").as_deref(), Some("classic"));
        assert!(cfg.get("defaults.missing_key").is_none());
    }

    #[test]
    fn set_value_updates_nested_fields() {
        let mut cfg = Config::default();
        cfg.set_value("defaults.snooze.unlimited", "true").unwrap();
        cfg.set_value("defaults.snooze.interval_minutes", "9").unwrap();
        cfg.set_value("missions.math_difficulty", "hard").unwrap();
        cfg.set_value("defaults.volume", "0.5").unwrap();
        assert!(cfg.defaults.snooze.unlimited);
        assert_eq!(cfg.defaults.snooze.interval_minutes, 9);
        assert_eq!(cfg.missions.math_difficulty, MathDifficulty::Hard);
        assert_eq!(cfg.defaults.volume, 0.5);
    }

    #[test]
    fn set_value_rejects_unknown_and_invalid() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set_value("defaults.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(cfg.set_value("defaults.snooze.enabled", "maybe").is_err());
        assert!(cfg.set_value("defaults.sound", "kazoo").is_err());
        assert!(cfg.set_value("defaults.snooze.interval_minutes", "0").is_err());
        assert!(cfg.set_value("defaults.volume", "1.5").is_err());
        // Failed sets leave the config untouched.
        assert_eq!(cfg.defaults.snooze.interval_minutes, 5);
        assert_eq!(cfg.defaults.sound, SoundId::Classic);
    }

    #[test]
    fn load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.missions.math_rounds, 3);

        let mut cfg = cfg;
        cfg.set_value("logging.level", "debug").unwrap();
        cfg.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().logging.level, "debug");
    }

    #[test]
    fn mission_gate_uses_configured_timeout() {
        let mut cfg = Config::default();
        cfg.missions.typing_timeout_secs = 45;
        assert_eq!(cfg.mission_gate().typing_timeout(), Duration::seconds(45));
    }
}
