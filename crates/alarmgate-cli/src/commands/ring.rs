use alarmgate_core::{AlarmId, Config, MissionAttempt};
use chrono::Local;
use clap::Subcommand;

use super::{open_lifecycle, print_json, CliResult};

#[derive(Subcommand)]
pub enum RingAction {
    /// Deliver a wake trigger for an alarm (what the scheduler does)
    Fire {
        /// Alarm ID
        id: String,
    },
    /// Snooze the ringing alarm
    Snooze,
    /// Resume ringing once the snooze has run out
    Expire,
    /// Open the mission for the ringing alarm
    MissionStart,
    /// Submit a mission attempt
    Submit {
        #[command(subcommand)]
        attempt: AttemptCommand,
    },
    /// Dismiss an alarm that has no mission
    Dismiss,
    /// Print the active alarm as JSON
    Status,
    /// Realign tone and triggers with the stored state
    Restore,
}

#[derive(Subcommand)]
pub enum AttemptCommand {
    /// Answer the current math problem
    Math {
        #[arg(allow_negative_numbers = true)]
        answer: i64,
    },
    /// Type the phrase
    Typing { text: String },
    /// Report a scanned QR or barcode payload
    Qr { scanned: String },
    /// Report the photo comparison verdict
    Photo {
        /// The photo did not match the reference
        #[arg(long)]
        no_match: bool,
    },
    /// Report a tetris score
    Tetris { score: u32 },
    /// Report a wordle result
    Wordle {
        /// Guesses used
        guesses: u8,
        /// The word was not found
        #[arg(long)]
        failed: bool,
    },
}

impl From<AttemptCommand> for MissionAttempt {
    fn from(cmd: AttemptCommand) -> Self {
        match cmd {
            AttemptCommand::Math { answer } => MissionAttempt::Math { answer },
            AttemptCommand::Typing { text } => MissionAttempt::Typing { text },
            AttemptCommand::Qr { scanned } => MissionAttempt::Qr { scanned },
            AttemptCommand::Photo { no_match } => MissionAttempt::Photo { matched: !no_match },
            AttemptCommand::Tetris { score } => MissionAttempt::Tetris { score },
            AttemptCommand::Wordle { guesses, failed } => MissionAttempt::Wordle {
                solved: !failed,
                guesses,
            },
        }
    }
}

pub fn run(action: RingAction) -> CliResult {
    let config = Config::load()?;
    let mut lifecycle = open_lifecycle(&config)?;
    let now = Local::now();

    match action {
        RingAction::Fire { id } => print_json(&lifecycle.on_fire(&AlarmId::from(id), &now)?)?,
        RingAction::Snooze => print_json(&lifecycle.request_snooze(&now)?)?,
        RingAction::Expire => print_json(&lifecycle.snooze_expired(&now)?)?,
        RingAction::MissionStart => print_json(&lifecycle.start_mission(&now)?)?,
        RingAction::Submit { attempt } => {
            let attempt = MissionAttempt::from(attempt);
            print_json(&lifecycle.submit_mission_attempt(&attempt, &now)?)?;
        }
        RingAction::Dismiss => print_json(&lifecycle.dismiss_without_mission(&now)?)?,
        RingAction::Status => {
            let active = lifecycle.status()?;
            let snoozed = active.as_ref().and_then(|a| a.snoozed_view());
            print_json(&serde_json::json!({
                "active": active,
                "snoozed": snoozed,
            }))?;
        }
        RingAction::Restore => match lifecycle.restore(&now)? {
            Some(event) => print_json(&event)?,
            None => print_json(&lifecycle.status()?)?,
        },
    }
    Ok(())
}
