pub mod alarm;
pub mod config;
pub mod ring;
pub mod run;

use alarmgate_core::{AlarmLifecycle, Config, CoreError, Database, SilentBackend};
use serde::Serialize;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Lifecycle over the on-disk store. The scheduler gets its own handle on
/// the same database file.
pub type Lifecycle = AlarmLifecycle<Database, Database, SilentBackend>;

pub fn open_lifecycle(config: &Config) -> Result<Lifecycle, CoreError> {
    let store = Database::open()?;
    let scheduler = Database::open()?;
    Ok(AlarmLifecycle::new(store, scheduler, SilentBackend).with_gate(config.mission_gate()))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
