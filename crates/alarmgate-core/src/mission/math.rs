//! Procedural arithmetic problems for the math mission.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathDifficulty {
    /// Single-digit addition.
    Easy,
    /// Two-digit addition or subtraction.
    #[default]
    Medium,
    /// `a * b + c`
    Hard,
    /// `a * b + c * d` with two-digit factors.
    VeryHard,
}

impl MathDifficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            MathDifficulty::Easy => "easy",
            MathDifficulty::Medium => "medium",
            MathDifficulty::Hard => "hard",
            MathDifficulty::VeryHard => "very_hard",
        }
    }
}

impl fmt::Display for MathDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MathDifficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "easy" => Ok(MathDifficulty::Easy),
            "medium" => Ok(MathDifficulty::Medium),
            "hard" => Ok(MathDifficulty::Hard),
            "very_hard" | "veryhard" => Ok(MathDifficulty::VeryHard),
            other => Err(format!("unknown math difficulty '{other}'")),
        }
    }
}

/// A generated equation and its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MathProblem {
    pub text: String,
    pub answer: i64,
}

/// Generate a problem at `difficulty`.
pub fn generate<R: Rng + ?Sized>(difficulty: MathDifficulty, rng: &mut R) -> MathProblem {
    match difficulty {
        MathDifficulty::Easy => {
            let a: i64 = rng.gen_range(1..=9);
            let b: i64 = rng.gen_range(1..=9);
            MathProblem {
                text: format!("{a} + {b}"),
                answer: a + b,
            }
        }
        MathDifficulty::Medium => {
            let a: i64 = rng.gen_range(10..=99);
            let b: i64 = rng.gen_range(10..=99);
            if rng.gen_bool(0.5) {
                MathProblem {
                    text: format!("{a} + {b}"),
                    answer: a + b,
                }
            } else {
                // Keep the result non-negative.
                let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
                MathProblem {
                    text: format!("{hi} - {lo}"),
                    answer: hi - lo,
                }
            }
        }
        MathDifficulty::Hard => {
            let a: i64 = rng.gen_range(2..=12);
            let b: i64 = rng.gen_range(2..=12);
            let c: i64 = rng.gen_range(10..=99);
            MathProblem {
                text: format!("{a} x {b} + {c}"),
                answer: a * b + c,
            }
        }
        MathDifficulty::VeryHard => {
            let a: i64 = rng.gen_range(11..=30);
            let b: i64 = rng.gen_range(2..=9);
            let c: i64 = rng.gen_range(11..=30);
            let d: i64 = rng.gen_range(2..=9);
            MathProblem {
                text: format!("{a} x {b} + {c} x {d}"),
                answer: a * b + c * d,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn eval(text: &str) -> i64 {
        // Tiny evaluator for the generated shapes: products bind tighter.
        text.split(" + ")
            .map(|term| {
                if let Some((l, r)) = term.split_once(" - ") {
                    l.trim().parse::<i64>().unwrap() - r.trim().parse::<i64>().unwrap()
                } else {
                    term.split(" x ")
                        .map(|f| f.trim().parse::<i64>().unwrap())
                        .product::<i64>()
                }
            })
            .sum()
    }

    #[test]
    fn answers_match_text_at_every_difficulty() {
        let mut rng = Pcg64::seed_from_u64(7);
        for difficulty in [
            MathDifficulty::Easy,
            MathDifficulty::Medium,
            MathDifficulty::Hard,
            MathDifficulty::VeryHard,
        ] {
            for _ in 0..200 {
                let p = generate(difficulty, &mut rng);
                assert_eq!(eval(&p.text), p.answer, "{difficulty}: {}", p.text);
                assert!(p.answer >= 0);
            }
        }
    }

    #[test]
    fn same_seed_same_problems() {
        let mut a = Pcg64::seed_from_u64(42);
        let mut b = Pcg64::seed_from_u64(42);
        for _ in 0..10 {
            assert_eq!(
                generate(MathDifficulty::Hard, &mut a),
                generate(MathDifficulty::Hard, &mut b)
            );
        }
    }

    #[test]
    fn difficulty_parses() {
        assert_eq!("very-hard".parse(), Ok(MathDifficulty::VeryHard));
        assert_eq!("EASY".parse(), Ok(MathDifficulty::Easy));
        assert!("impossible".parse::<MathDifficulty>().is_err());
    }
}
