//! Reward Calculator
//!
//! Pure conversion of a finished battle into XP, coins and bonuses.
//!
//! - `xp_earned`: `xp_per_correct × correct × streak multiplier`
//! - `coins_earned`: `xp_earned × coin_ratio` (floored)
//! - `streak_bonus`: win that pushes the win streak past its previous best
//! - `time_bonus`: average answer time under a fraction of the round limit

use serde::{Deserialize, Serialize};

use crate::error::{BattleError, Result};
use crate::session::{BattleOutcome, Score};

/// One step of the streak multiplier table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreakStep {
    /// Applies from this win streak upwards
    pub min_streak: u32,
    pub multiplier: f64,
}

/// Reward weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    #[serde(default = "default_xp_per_correct")]
    pub xp_per_correct: u32,
    #[serde(default = "default_coin_ratio")]
    pub coin_ratio: f64,
    /// Ascending by `min_streak`; streaks below the first step use 1.0
    #[serde(default = "default_streak_steps")]
    pub streak_steps: Vec<StreakStep>,
    #[serde(default = "default_max_multiplier")]
    pub max_multiplier: f64,
    #[serde(default = "default_streak_bonus_per_win")]
    pub streak_bonus_per_win: u32,
    /// Fraction of the per-question limit the average answer must beat
    #[serde(default = "default_time_bonus_threshold")]
    pub time_bonus_threshold: f64,
    #[serde(default = "default_time_bonus_per_correct")]
    pub time_bonus_per_correct: u32,
}

fn default_xp_per_correct() -> u32 {
    10
}
fn default_coin_ratio() -> f64 {
    0.5
}
fn default_streak_steps() -> Vec<StreakStep> {
    vec![
        StreakStep { min_streak: 3, multiplier: 1.25 },
        StreakStep { min_streak: 5, multiplier: 1.5 },
        StreakStep { min_streak: 10, multiplier: 2.0 },
    ]
}
fn default_max_multiplier() -> f64 {
    2.0
}
fn default_streak_bonus_per_win() -> u32 {
    5
}
fn default_time_bonus_threshold() -> f64 {
    0.5
}
fn default_time_bonus_per_correct() -> u32 {
    2
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            xp_per_correct: default_xp_per_correct(),
            coin_ratio: default_coin_ratio(),
            streak_steps: default_streak_steps(),
            max_multiplier: default_max_multiplier(),
            streak_bonus_per_win: default_streak_bonus_per_win(),
            time_bonus_threshold: default_time_bonus_threshold(),
            time_bonus_per_correct: default_time_bonus_per_correct(),
        }
    }
}

impl RewardConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.coin_ratio.is_finite() || self.coin_ratio < 0.0 {
            return Err(BattleError::Configuration(format!(
                "rewards.coin_ratio must be non-negative, got {}",
                self.coin_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.time_bonus_threshold) {
            return Err(BattleError::Configuration(format!(
                "rewards.time_bonus_threshold must be 0.0-1.0, got {}",
                self.time_bonus_threshold
            )));
        }
        if self.max_multiplier < 1.0 {
            return Err(BattleError::Configuration(format!(
                "rewards.max_multiplier must be >= 1.0, got {}",
                self.max_multiplier
            )));
        }
        let ascending = self.streak_steps.windows(2).all(|w| {
            w[0].min_streak < w[1].min_streak && w[0].multiplier <= w[1].multiplier
        });
        if !ascending || self.streak_steps.iter().any(|s| s.multiplier < 1.0) {
            return Err(BattleError::Configuration(
                "rewards.streak_steps must ascend in both streak and multiplier (>= 1.0)"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Step function of the win streak, capped at `max_multiplier`
    pub fn streak_multiplier(&self, win_streak: u32) -> f64 {
        self.streak_steps
            .iter()
            .filter(|step| win_streak >= step.min_streak)
            .map(|step| step.multiplier)
            .fold(1.0, f64::max)
            .min(self.max_multiplier)
    }
}

/// Player win-streak state owned by the external profile store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakState {
    pub current_win_streak: u32,
    pub best_win_streak: u32,
}

impl StreakState {
    pub fn new(current_win_streak: u32, best_win_streak: u32) -> Self {
        Self { current_win_streak, best_win_streak: best_win_streak.max(current_win_streak) }
    }

    /// Streak after a finished match: wins extend it, anything else resets it.
    pub fn advance(&self, outcome: BattleOutcome) -> Self {
        match outcome {
            BattleOutcome::Victory => {
                let current = self.current_win_streak.saturating_add(1);
                Self { current_win_streak: current, best_win_streak: self.best_win_streak.max(current) }
            }
            BattleOutcome::Defeat | BattleOutcome::Draw => {
                Self { current_win_streak: 0, best_win_streak: self.best_win_streak }
            }
        }
    }
}

/// How long the player spent answering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnswerTiming {
    /// Sum of per-round answer times; unanswered rounds count the full limit
    pub total_secs: u32,
    pub per_question_limit: u32,
}

/// Final rewards for one battle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardPayload {
    pub xp_earned: u32,
    pub coins_earned: u32,
    pub streak_bonus: u32,
    pub time_bonus: u32,
}

impl RewardPayload {
    pub fn total_xp(&self) -> u32 {
        self.xp_earned.saturating_add(self.streak_bonus).saturating_add(self.time_bonus)
    }
}

/// Rewards with the default weights
pub fn compute_rewards(
    score: Score,
    question_count: usize,
    streak: &StreakState,
    timing: &AnswerTiming,
) -> RewardPayload {
    RewardCalculator::default().compute(score, question_count, streak, timing)
}

/// Reward calculator bound to a [`RewardConfig`]
#[derive(Debug, Clone, Default)]
pub struct RewardCalculator {
    config: RewardConfig,
}

impl RewardCalculator {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    pub fn compute(
        &self,
        score: Score,
        question_count: usize,
        streak: &StreakState,
        timing: &AnswerTiming,
    ) -> RewardPayload {
        let correct = score.player.min(question_count as u32);
        let multiplier = self.config.streak_multiplier(streak.current_win_streak);

        let base_xp = self.config.xp_per_correct.saturating_mul(correct);
        let xp_earned = (base_xp as f64 * multiplier).round() as u32;
        let coins_earned = (xp_earned as f64 * self.config.coin_ratio).floor() as u32;

        let streak_bonus = if score.outcome() == BattleOutcome::Victory {
            let extended = streak.current_win_streak.saturating_add(1);
            if extended > streak.best_win_streak {
                self.config.streak_bonus_per_win.saturating_mul(extended)
            } else {
                0
            }
        } else {
            0
        };

        let time_bonus = if correct > 0 && question_count > 0 && timing.per_question_limit > 0 {
            let average = timing.total_secs as f64 / question_count as f64;
            let threshold = self.config.time_bonus_threshold * timing.per_question_limit as f64;
            if average < threshold {
                self.config.time_bonus_per_correct.saturating_mul(correct)
            } else {
                0
            }
        } else {
            0
        };

        RewardPayload { xp_earned, coins_earned, streak_bonus, time_bonus }
    }
}
