//! Mission gate.
//!
//! A mission is the task a user must complete before a ringing alarm can be
//! dismissed. [`MissionSpec`] is a closed set of variants, each carrying its
//! own settings; [`MissionGate`] evaluates attempts against a spec.
//!
//! A failed attempt is an ordinary [`MissionAttemptResult`] with
//! `success == false`. Errors are reserved for malformed specs and for
//! attempts of the wrong kind.
//!
//! Bookkeeping that spans attempts (the math streak and current problem, the
//! typing window) lives in [`MissionProgress`], which the lifecycle persists
//! alongside the active alarm so a restart does not reset the mission.

pub mod math;

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
pub use math::{MathDifficulty, MathProblem};

/// Default window for the typing mission.
pub const DEFAULT_TYPING_TIMEOUT_SECS: i64 = 20;

/// Upper bound on Wordle guesses.
pub const WORDLE_MAX_GUESSES: u8 = 6;

/// Variant tag of a mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionKind {
    Math,
    Typing,
    Qr,
    Photo,
    Tetris,
    Wordle,
}

impl MissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionKind::Math => "math",
            MissionKind::Typing => "typing",
            MissionKind::Qr => "qr",
            MissionKind::Photo => "photo",
            MissionKind::Tetris => "tetris",
            MissionKind::Wordle => "wordle",
        }
    }
}

impl fmt::Display for MissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mission configuration attached to an alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MissionSpec {
    /// Solve `rounds` problems in a row.
    Math {
        #[serde(default)]
        difficulty: MathDifficulty,
        rounds: u32,
    },
    /// Type `phrase` exactly, case-sensitive.
    Typing { phrase: String },
    /// Scan a QR code or barcode whose payload equals the one captured at setup.
    Qr { payload: String },
    /// Photograph the reference scene. Matching is done by an external
    /// comparator; the gate only sees its verdict.
    Photo { reference: String },
    /// Reach `target_score` in a game of Tetris.
    Tetris { target_score: u32 },
    /// Solve the daily Wordle within `max_guesses`.
    Wordle { max_guesses: u8 },
}

impl MissionSpec {
    pub fn kind(&self) -> MissionKind {
        match self {
            MissionSpec::Math { .. } => MissionKind::Math,
            MissionSpec::Typing { .. } => MissionKind::Typing,
            MissionSpec::Qr { .. } => MissionKind::Qr,
            MissionSpec::Photo { .. } => MissionKind::Photo,
            MissionSpec::Tetris { .. } => MissionKind::Tetris,
            MissionSpec::Wordle { .. } => MissionKind::Wordle,
        }
    }

    /// Reject structurally malformed specs.
    pub fn validate(&self) -> Result<()> {
        let problem = match self {
            MissionSpec::Math { rounds: 0, .. } => Some("math mission needs at least one round"),
            MissionSpec::Typing { phrase } if phrase.trim().is_empty() => {
                Some("typing mission needs a phrase")
            }
            MissionSpec::Qr { payload } if payload.is_empty() => {
                Some("qr mission needs the payload captured at setup")
            }
            MissionSpec::Photo { reference } if reference.trim().is_empty() => {
                Some("photo mission needs a reference photo")
            }
            MissionSpec::Tetris { target_score: 0 } => Some("tetris mission needs a target score"),
            MissionSpec::Wordle { max_guesses } if *max_guesses == 0 || *max_guesses > WORDLE_MAX_GUESSES => {
                Some("wordle mission allows 1 to 6 guesses")
            }
            _ => None,
        };
        match problem {
            Some(msg) => Err(CoreError::InvalidSpec(msg.to_string())),
            None => Ok(()),
        }
    }
}

/// One user attempt at a mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MissionAttempt {
    Math { answer: i64 },
    Typing { text: String },
    Qr { scanned: String },
    Photo { matched: bool },
    Tetris { score: u32 },
    Wordle { solved: bool, guesses: u8 },
}

impl MissionAttempt {
    pub fn kind(&self) -> MissionKind {
        match self {
            MissionAttempt::Math { .. } => MissionKind::Math,
            MissionAttempt::Typing { .. } => MissionKind::Typing,
            MissionAttempt::Qr { .. } => MissionKind::Qr,
            MissionAttempt::Photo { .. } => MissionKind::Photo,
            MissionAttempt::Tetris { .. } => MissionKind::Tetris,
            MissionAttempt::Wordle { .. } => MissionKind::Wordle,
        }
    }
}

/// Variant-specific detail reported with an attempt result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttemptMetadata {
    Math {
        correct: bool,
        streak: u32,
        rounds: u32,
        /// Problem to show next, absent once the mission is complete.
        next_problem: Option<String>,
    },
    Typing { timed_out: bool },
    Qr,
    Photo,
    Tetris { score: u32, target_score: u32 },
    Wordle { guesses: u8, max_guesses: u8 },
}

/// Outcome of one attempt. Consumed by the caller, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionAttemptResult {
    pub mission: MissionKind,
    pub success: bool,
    pub metadata: AttemptMetadata,
}

/// Cross-attempt bookkeeping for the mission in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MissionProgress {
    Math { streak: u32, problem: MathProblem },
    Typing { window_started_at: DateTime<Utc> },
    Stateless,
}

impl MissionProgress {
    /// Problem the UI should currently show, if the mission has one.
    pub fn current_problem(&self) -> Option<&MathProblem> {
        match self {
            MissionProgress::Math { problem, .. } => Some(problem),
            _ => None,
        }
    }

    fn matches(&self, spec: &MissionSpec) -> bool {
        matches!(
            (self, spec),
            (MissionProgress::Math { .. }, MissionSpec::Math { .. })
                | (MissionProgress::Typing { .. }, MissionSpec::Typing { .. })
                | (
                    MissionProgress::Stateless,
                    MissionSpec::Qr { .. }
                        | MissionSpec::Photo { .. }
                        | MissionSpec::Tetris { .. }
                        | MissionSpec::Wordle { .. }
                )
        )
    }
}

/// Evaluates mission attempts.
pub struct MissionGate {
    rng: Pcg64,
    typing_timeout: Duration,
}

impl Default for MissionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl MissionGate {
    pub fn new() -> Self {
        Self::seeded(rand::random())
    }

    /// Deterministic problem generation.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Pcg64::seed_from_u64(seed),
            typing_timeout: Duration::seconds(DEFAULT_TYPING_TIMEOUT_SECS),
        }
    }

    pub fn with_typing_timeout(mut self, timeout: Duration) -> Self {
        self.typing_timeout = timeout;
        self
    }

    pub fn typing_timeout(&self) -> Duration {
        self.typing_timeout
    }

    /// Validate `spec` and produce the progress record for a fresh mission.
    pub fn begin(&mut self, spec: &MissionSpec, now: DateTime<Utc>) -> Result<MissionProgress> {
        spec.validate()?;
        Ok(match spec {
            MissionSpec::Math { difficulty, .. } => MissionProgress::Math {
                streak: 0,
                problem: math::generate(*difficulty, &mut self.rng),
            },
            MissionSpec::Typing { .. } => MissionProgress::Typing {
                window_started_at: now,
            },
            _ => MissionProgress::Stateless,
        })
    }

    /// Evaluate `attempt` against `spec`, updating `progress` in place.
    pub fn evaluate(
        &mut self,
        spec: &MissionSpec,
        progress: &mut MissionProgress,
        attempt: &MissionAttempt,
        now: DateTime<Utc>,
    ) -> Result<MissionAttemptResult> {
        spec.validate()?;
        if spec.kind() != attempt.kind() {
            return Err(CoreError::MissionMismatch {
                expected: spec.kind().as_str(),
                got: attempt.kind().as_str(),
            });
        }
        if !progress.matches(spec) {
            *progress = self.begin(spec, now)?;
        }

        let (success, metadata) = match (spec, attempt, &mut *progress) {
            (
                MissionSpec::Math { difficulty, rounds },
                MissionAttempt::Math { answer },
                MissionProgress::Math { streak, problem },
            ) => self.evaluate_math(*difficulty, *rounds, streak, problem, *answer),
            (
                MissionSpec::Typing { phrase },
                MissionAttempt::Typing { text },
                MissionProgress::Typing { window_started_at },
            ) => self.evaluate_typing(phrase, window_started_at, text, now),
            (MissionSpec::Qr { payload }, MissionAttempt::Qr { scanned }, _) => {
                (scanned == payload, AttemptMetadata::Qr)
            }
            (MissionSpec::Photo { .. }, MissionAttempt::Photo { matched }, _) => {
                (*matched, AttemptMetadata::Photo)
            }
            (MissionSpec::Tetris { target_score }, MissionAttempt::Tetris { score }, _) => (
                score >= target_score,
                AttemptMetadata::Tetris {
                    score: *score,
                    target_score: *target_score,
                },
            ),
            (
                MissionSpec::Wordle { max_guesses },
                MissionAttempt::Wordle { solved, guesses },
                _,
            ) => (
                *solved && (1..=*max_guesses).contains(guesses),
                AttemptMetadata::Wordle {
                    guesses: *guesses,
                    max_guesses: *max_guesses,
                },
            ),
            _ => {
                return Err(CoreError::MissionMismatch {
                    expected: spec.kind().as_str(),
                    got: attempt.kind().as_str(),
                })
            }
        };

        Ok(MissionAttemptResult {
            mission: spec.kind(),
            success,
            metadata,
        })
    }

    fn evaluate_math(
        &mut self,
        difficulty: MathDifficulty,
        rounds: u32,
        streak: &mut u32,
        problem: &mut MathProblem,
        answer: i64,
    ) -> (bool, AttemptMetadata) {
        let correct = answer == problem.answer;
        *streak = if correct { *streak + 1 } else { 0 };
        let success = *streak >= rounds;

        // A fresh problem after every answer, right or wrong.
        let next_problem = if success {
            None
        } else {
            *problem = math::generate(difficulty, &mut self.rng);
            Some(problem.text.clone())
        };

        (
            success,
            AttemptMetadata::Math {
                correct,
                streak: *streak,
                rounds,
                next_problem,
            },
        )
    }

    fn evaluate_typing(
        &self,
        phrase: &str,
        window_started_at: &mut DateTime<Utc>,
        text: &str,
        now: DateTime<Utc>,
    ) -> (bool, AttemptMetadata) {
        if now - *window_started_at > self.typing_timeout {
            *window_started_at = now;
            return (false, AttemptMetadata::Typing { timed_out: true });
        }
        (text == phrase, AttemptMetadata::Typing { timed_out: false })
    }
}
