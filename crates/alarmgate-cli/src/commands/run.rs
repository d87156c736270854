//! Foreground wake loop.
//!
//! Stands in for the platform notification service on desktop: polls the
//! armed triggers and delivers each due one to the lifecycle. `ring`
//! commands run in other processes, so every tick first brings this
//! process's tone back in line with the stored state.

use std::time::Duration;

use alarmgate_core::{Config, CoreError, Event};
use chrono::{Local, Utc};

use super::{open_lifecycle, CliResult, Lifecycle};

fn emit(event: &Event) -> CliResult {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

/// Follow transitions made by other processes, then deliver every trigger
/// due now. Returns how many were delivered.
fn deliver_due(lifecycle: &mut Lifecycle) -> Result<usize, CoreError> {
    let now = Local::now();
    if let Some(event) = lifecycle.restore(&now)? {
        if let Err(e) = emit(&event) {
            tracing::warn!(error = %e, "failed to write event");
        }
    }
    let due = lifecycle.scheduler().due_triggers(now.with_timezone(&Utc))?;
    for trigger in &due {
        match lifecycle.on_fire(&trigger.alarm_id, &now) {
            Ok(event) => {
                if let Err(e) = emit(&event) {
                    tracing::warn!(error = %e, "failed to write event");
                }
            }
            Err(e) => {
                tracing::warn!(alarm_id = %trigger.alarm_id, error = %e, "wake trigger not delivered")
            }
        }
    }
    Ok(due.len())
}

pub fn run(once: bool, poll_secs: u64) -> CliResult {
    let config = Config::load()?;
    let mut lifecycle = open_lifecycle(&config)?;

    // Triggers that came due while nothing was running ring first.
    deliver_due(&mut lifecycle)?;
    lifecycle.reschedule_all(&Local::now())?;

    if once {
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(poll_secs.max(1)));
        tracing::info!(poll_secs, "wake loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = deliver_due(&mut lifecycle) {
                        tracing::error!(error = %e, "failed to sync with stored alarm state");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("wake loop stopped");
                    break;
                }
            }
        }
    });
    Ok(())
}
