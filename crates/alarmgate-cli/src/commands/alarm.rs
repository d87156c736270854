use alarmgate_core::mission::MathDifficulty;
use alarmgate_core::{
    AlarmId, AlarmPatch, AlarmRepository, AlarmSpec, AlarmTime, Config, MissionSpec, RepeatDays,
    SnoozePolicy, SoundId,
};
use chrono::Local;
use clap::{Args, Subcommand, ValueEnum};

use super::{open_lifecycle, print_json, CliResult};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum MissionArg {
    Math,
    Typing,
    Qr,
    Photo,
    Tetris,
    Wordle,
}

/// Mission selection shared by create and update.
#[derive(Args, Debug, Default)]
pub struct MissionArgs {
    /// Mission required to dismiss the alarm
    #[arg(long, value_enum)]
    mission: Option<MissionArg>,
    /// Math difficulty (easy, medium, hard, very_hard)
    #[arg(long)]
    difficulty: Option<MathDifficulty>,
    /// Math problems to solve in a row
    #[arg(long)]
    rounds: Option<u32>,
    /// Phrase for the typing mission
    #[arg(long)]
    phrase: Option<String>,
    /// Payload captured at setup for the QR mission
    #[arg(long)]
    payload: Option<String>,
    /// Reference photo for the photo mission
    #[arg(long)]
    reference: Option<String>,
    /// Score to reach in the tetris mission
    #[arg(long)]
    target_score: Option<u32>,
    /// Guesses allowed in the wordle mission
    #[arg(long)]
    max_guesses: Option<u8>,
}

impl MissionArgs {
    fn to_spec(&self, config: &Config) -> Result<Option<MissionSpec>, String> {
        let Some(kind) = self.mission else {
            return Ok(None);
        };
        let required = |value: &Option<String>, flag: &str| {
            value
                .clone()
                .ok_or_else(|| format!("--{flag} is required for this mission"))
        };
        let spec = match kind {
            MissionArg::Math => MissionSpec::Math {
                difficulty: self.difficulty.unwrap_or(config.missions.math_difficulty),
                rounds: self.rounds.unwrap_or(config.missions.math_rounds),
            },
            MissionArg::Typing => MissionSpec::Typing {
                phrase: required(&self.phrase, "phrase")?,
            },
            MissionArg::Qr => MissionSpec::Qr {
                payload: required(&self.payload, "payload")?,
            },
            MissionArg::Photo => MissionSpec::Photo {
                reference: required(&self.reference, "reference")?,
            },
            MissionArg::Tetris => MissionSpec::Tetris {
                target_score: self.target_score.ok_or("--target-score is required for tetris")?,
            },
            MissionArg::Wordle => MissionSpec::Wordle {
                max_guesses: self.max_guesses.unwrap_or(6),
            },
        };
        Ok(Some(spec))
    }
}

/// Snooze overrides shared by create and update.
#[derive(Args, Debug, Default)]
pub struct SnoozeArgs {
    /// Disallow snoozing
    #[arg(long, conflicts_with_all = ["snooze_max", "snooze_unlimited"])]
    no_snooze: bool,
    /// Maximum number of snoozes
    #[arg(long)]
    snooze_max: Option<u32>,
    /// Allow unlimited snoozes
    #[arg(long)]
    snooze_unlimited: bool,
    /// Minutes per snooze
    #[arg(long)]
    snooze_interval: Option<u32>,
}

impl SnoozeArgs {
    fn is_set(&self) -> bool {
        self.no_snooze || self.snooze_unlimited || self.snooze_max.is_some() || self.snooze_interval.is_some()
    }

    fn apply(&self, mut policy: SnoozePolicy) -> SnoozePolicy {
        if self.no_snooze {
            policy.enabled = false;
        }
        if let Some(max) = self.snooze_max {
            policy.enabled = true;
            policy.max = max;
            policy.unlimited = false;
        }
        if self.snooze_unlimited {
            policy.enabled = true;
            policy.unlimited = true;
        }
        if let Some(interval) = self.snooze_interval {
            policy.interval_minutes = interval;
        }
        policy
    }
}

#[derive(Subcommand)]
pub enum AlarmAction {
    /// Create an alarm
    Create {
        /// Time of day (HH:MM)
        time: AlarmTime,
        /// Label shown while ringing
        #[arg(long)]
        label: Option<String>,
        /// Repeat days: daily, weekdays, weekends or a list like mon,wed,fri
        #[arg(long)]
        repeat: Option<RepeatDays>,
        /// Alarm tone
        #[arg(long)]
        sound: Option<SoundId>,
        /// Tone volume (0.0-1.0)
        #[arg(long)]
        volume: Option<f32>,
        #[command(flatten)]
        mission: MissionArgs,
        #[command(flatten)]
        snooze: SnoozeArgs,
        /// Create the alarm switched off
        #[arg(long)]
        disabled: bool,
    },
    /// List alarms, next to ring first
    List,
    /// Show one alarm as JSON
    Show {
        /// Alarm ID
        id: String,
    },
    /// Update an alarm
    Update {
        /// Alarm ID
        id: String,
        /// New time of day (HH:MM)
        #[arg(long)]
        time: Option<AlarmTime>,
        #[arg(long, conflicts_with = "clear_label")]
        label: Option<String>,
        /// Remove the label
        #[arg(long)]
        clear_label: bool,
        #[arg(long)]
        repeat: Option<RepeatDays>,
        #[arg(long)]
        sound: Option<SoundId>,
        #[arg(long)]
        volume: Option<f32>,
        #[command(flatten)]
        mission: MissionArgs,
        /// Remove the mission
        #[arg(long, conflicts_with = "mission")]
        no_mission: bool,
        #[command(flatten)]
        snooze: SnoozeArgs,
    },
    /// Delete an alarm
    Delete {
        /// Alarm ID
        id: String,
    },
    /// Switch an alarm on
    Enable {
        /// Alarm ID
        id: String,
    },
    /// Switch an alarm off
    Disable {
        /// Alarm ID
        id: String,
    },
}

pub fn run(action: AlarmAction) -> CliResult {
    let config = Config::load()?;
    let mut lifecycle = open_lifecycle(&config)?;
    let now = Local::now();

    match action {
        AlarmAction::Create {
            time,
            label,
            repeat,
            sound,
            volume,
            mission,
            snooze,
            disabled,
        } => {
            let spec = AlarmSpec {
                time,
                label,
                repeat_days: repeat.unwrap_or_default(),
                sound: sound.unwrap_or(config.defaults.sound),
                sound_volume: volume.unwrap_or(config.defaults.volume),
                mission: mission.to_spec(&config)?,
                snooze_policy: snooze.apply(config.defaults.snooze),
                enabled: !disabled,
            };
            let record = lifecycle.create_alarm(spec, &now)?;
            print_json(&record)?;
        }
        AlarmAction::List => {
            let records = lifecycle.repository().list_at(&now)?;
            print_json(&records)?;
        }
        AlarmAction::Show { id } => {
            let record = lifecycle.repository().get(&AlarmId::from(id))?;
            print_json(&record)?;
        }
        AlarmAction::Update {
            id,
            time,
            label,
            clear_label,
            repeat,
            sound,
            volume,
            mission,
            no_mission,
            snooze,
        } => {
            let id = AlarmId::from(id);
            let current = lifecycle.repository().get(&id)?;
            let mission_patch = if no_mission {
                Some(None)
            } else {
                mission.to_spec(&config)?.map(Some)
            };
            let patch = AlarmPatch {
                time,
                label: if clear_label { Some(None) } else { label.map(Some) },
                repeat_days: repeat,
                sound,
                sound_volume: volume,
                mission: mission_patch,
                snooze_policy: snooze.is_set().then(|| snooze.apply(current.snooze_policy)),
                enabled: None,
            };
            if patch.is_empty() {
                return Err("nothing to update".into());
            }
            let record = lifecycle.update_alarm(&id, &patch, &now)?;
            print_json(&record)?;
        }
        AlarmAction::Delete { id } => {
            lifecycle.delete_alarm(&AlarmId::from(id.as_str()))?;
            println!("alarm deleted: {id}");
        }
        AlarmAction::Enable { id } => {
            let record = lifecycle.update_alarm(&AlarmId::from(id), &AlarmPatch::enabled(true), &now)?;
            print_json(&record)?;
        }
        AlarmAction::Disable { id } => {
            let record = lifecycle.update_alarm(&AlarmId::from(id), &AlarmPatch::enabled(false), &now)?;
            print_json(&record)?;
        }
    }
    Ok(())
}
