//! Bot opponent
//!
//! Each round the bot samples "is correct" with a fixed probability, answers
//! the correct label or a uniformly chosen wrong one, and schedules the answer
//! at a random think-time strictly inside the round window.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::BotSettings;
use crate::question::{AnswerLabel, Question};

/// Answer the bot will give for one round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotMove {
    pub label: AnswerLabel,
    pub correct: bool,
    /// Seconds into the round at which the answer is submitted
    pub delay_secs: u32,
}

/// Synthetic opponent driven by a seeded RNG
#[derive(Debug, Clone)]
pub struct BotSimulator {
    base_accuracy: f64,
    difficulty_multiplier: f64,
    think_min_fraction: f64,
    think_max_fraction: f64,
    rng: ChaCha8Rng,
    pending: Option<BotMove>,
}

impl BotSimulator {
    pub fn new(base_accuracy: f64, difficulty_multiplier: f64, seed: u64) -> Self {
        let defaults = BotSettings::default();
        Self {
            base_accuracy,
            difficulty_multiplier,
            think_min_fraction: defaults.think_min_fraction,
            think_max_fraction: defaults.think_max_fraction,
            rng: ChaCha8Rng::seed_from_u64(seed),
            pending: None,
        }
    }

    /// Think window as fractions of the round (0.0-1.0)
    pub fn with_think_window(mut self, min_fraction: f64, max_fraction: f64) -> Self {
        self.think_min_fraction = min_fraction.clamp(0.0, 1.0);
        self.think_max_fraction = max_fraction.clamp(self.think_min_fraction, 1.0);
        self
    }

    pub fn base_accuracy(&self) -> f64 {
        self.base_accuracy
    }

    pub fn difficulty_multiplier(&self) -> f64 {
        self.difficulty_multiplier
    }

    /// Probability of a correct answer: `base × multiplier`, clamped to 0.0-1.0
    pub fn accuracy(&self) -> f64 {
        let p = self.base_accuracy * self.difficulty_multiplier;
        if p.is_nan() {
            return 0.0;
        }
        p.clamp(0.0, 1.0)
    }

    /// Decide this round's answer and think-time
    pub fn plan_round(&mut self, question: &Question, round_secs: u32) -> BotMove {
        let correct = self.rng.gen_bool(self.accuracy());
        let label = if correct {
            question.correct_answer
        } else {
            *question.wrong_labels().choose(&mut self.rng).unwrap_or(&question.correct_answer)
        };
        let delay_secs = self.think_time(round_secs);

        BotMove { label, correct: question.is_correct(label), delay_secs }
    }

    /// Plan and hold the move until [`BotSimulator::take_due`] releases it
    pub fn schedule(&mut self, question: &Question, round_secs: u32) -> BotMove {
        let bot_move = self.plan_round(question, round_secs);
        self.pending = Some(bot_move);
        bot_move
    }

    /// Release the scheduled move once `elapsed_secs` reaches its think-time
    pub fn take_due(&mut self, elapsed_secs: u32) -> Option<BotMove> {
        match self.pending {
            Some(bot_move) if bot_move.delay_secs <= elapsed_secs => self.pending.take(),
            _ => None,
        }
    }

    pub fn cancel_pending(&mut self) {
        self.pending = None;
    }

    pub fn pending(&self) -> Option<&BotMove> {
        self.pending.as_ref()
    }

    fn think_time(&mut self, round_secs: u32) -> u32 {
        // One-second rounds leave no room to think
        if round_secs <= 1 {
            return 0;
        }
        let latest = round_secs - 1;
        let lo = ((self.think_min_fraction * round_secs as f64).ceil() as u32).clamp(1, latest);
        let hi = ((self.think_max_fraction * round_secs as f64).floor() as u32).clamp(lo, latest);
        self.rng.gen_range(lo..=hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question() -> Question {
        Question::new(
            "q",
            "Who bears the burden of proof in a criminal trial?",
            [
                "The defendant".to_string(),
                "The prosecution".to_string(),
                "The jury".to_string(),
                "The judge".to_string(),
            ],
            AnswerLabel::B,
        )
    }

    #[test]
    fn test_accuracy_is_clamped_product() {
        assert_eq!(BotSimulator::new(0.6, 1.0, 1).accuracy(), 0.6);
        assert!((BotSimulator::new(0.6, 0.5, 1).accuracy() - 0.3).abs() < 1e-12);
        assert_eq!(BotSimulator::new(0.9, 2.0, 1).accuracy(), 1.0);
        assert_eq!(BotSimulator::new(0.0, 1.5, 1).accuracy(), 0.0);
    }

    #[test]
    fn test_zero_and_perfect_accuracy() {
        let q = question();
        let mut never = BotSimulator::new(0.0, 1.0, 3);
        let mut always = BotSimulator::new(1.0, 1.0, 3);

        for _ in 0..50 {
            let miss = never.plan_round(&q, 30);
            assert!(!miss.correct);
            assert_ne!(miss.label, AnswerLabel::B);

            let hit = always.plan_round(&q, 30);
            assert!(hit.correct);
            assert_eq!(hit.label, AnswerLabel::B);
        }
    }

    #[test]
    fn test_think_time_inside_round_window() {
        let q = question();
        let mut bot = BotSimulator::new(0.5, 1.0, 11);
        for round_secs in [2u32, 3, 10, 30, 120] {
            for _ in 0..100 {
                let delay = bot.plan_round(&q, round_secs).delay_secs;
                assert!(delay >= 1 && delay < round_secs, "delay {delay} for {round_secs}s");
            }
        }
        assert_eq!(bot.plan_round(&q, 1).delay_secs, 0);
    }

    #[test]
    fn test_default_window_for_thirty_seconds() {
        let q = question();
        let mut bot = BotSimulator::new(0.5, 1.0, 5);
        for _ in 0..200 {
            let delay = bot.plan_round(&q, 30).delay_secs;
            assert!((6..=24).contains(&delay));
        }
    }

    #[test]
    fn test_take_due_releases_once() {
        let q = question();
        let mut bot = BotSimulator::new(1.0, 1.0, 9).with_think_window(0.5, 0.5);
        let planned = bot.schedule(&q, 10);
        assert_eq!(planned.delay_secs, 5);

        assert_eq!(bot.take_due(4), None);
        assert_eq!(bot.take_due(5), Some(planned));
        assert_eq!(bot.take_due(6), None);
    }

    #[test]
    fn test_same_seed_same_moves() {
        let q = question();
        let mut a = BotSimulator::new(0.5, 1.0, 42);
        let mut b = BotSimulator::new(0.5, 1.0, 42);
        for _ in 0..20 {
            assert_eq!(a.plan_round(&q, 30), b.plan_round(&q, 30));
        }
    }
}
