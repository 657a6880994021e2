//! Battle configuration
//!
//! Two layers:
//! - [`BattleConfig`]: per-session start parameters chosen by the player
//!   (category, difficulty, mode, bot vs live, timing).
//! - [`EngineSettings`]: deployment-wide tuning (bot accuracy model, reward
//!   weights, matchmaking/countdown/grace timers). Loaded from JSON, with an
//!   optional override file named by `BATTLE_SETTINGS_PATH`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::{env, fs};

use crate::error::{BattleError, Result};
use crate::reward::RewardConfig;

pub const SETTINGS_PATH_ENV: &str = "BATTLE_SETTINGS_PATH";

pub const DEFAULT_TIME_PER_QUESTION: u32 = 30;
pub const DEFAULT_QUESTIONS_PER_BATTLE: usize = 5;
pub const MAX_TIME_PER_QUESTION: u32 = 300;
pub const MAX_QUESTIONS_PER_BATTLE: usize = 50;

/// Question difficulty tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = BattleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(BattleError::Configuration(format!("Unknown difficulty: {other}"))),
        }
    }
}

/// Casual matches do not affect rating; ranked ones do (rating is external).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BattleMode {
    #[default]
    Casual,
    Ranked,
}

impl fmt::Display for BattleMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Casual => f.write_str("casual"),
            Self::Ranked => f.write_str("ranked"),
        }
    }
}

impl FromStr for BattleMode {
    type Err = BattleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "casual" => Ok(Self::Casual),
            "ranked" => Ok(Self::Ranked),
            other => Err(BattleError::Configuration(format!("Unknown battle mode: {other}"))),
        }
    }
}

fn default_time_per_question() -> u32 {
    DEFAULT_TIME_PER_QUESTION
}
fn default_questions_per_battle() -> usize {
    DEFAULT_QUESTIONS_PER_BATTLE
}

/// Start parameters for one battle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleConfig {
    pub category: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub mode: BattleMode,
    #[serde(default)]
    pub is_bot: bool,
    /// Seconds per round (default: 30)
    #[serde(default = "default_time_per_question")]
    pub time_per_question: u32,
    /// Rounds per battle (default: 5)
    #[serde(default = "default_questions_per_battle")]
    pub questions_per_battle: usize,
    /// Seed for the bot's RNG. `None` draws one from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl BattleConfig {
    pub fn new(category: impl Into<String>, difficulty: Difficulty) -> Self {
        Self {
            category: category.into(),
            difficulty,
            mode: BattleMode::Casual,
            is_bot: false,
            time_per_question: DEFAULT_TIME_PER_QUESTION,
            questions_per_battle: DEFAULT_QUESTIONS_PER_BATTLE,
            seed: None,
        }
    }

    /// Bot match with the default timing
    pub fn bot(category: impl Into<String>, difficulty: Difficulty) -> Self {
        Self { is_bot: true, ..Self::new(category, difficulty) }
    }

    pub fn with_mode(mut self, mode: BattleMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_time_per_question(mut self, secs: u32) -> Self {
        self.time_per_question = secs;
        self
    }

    pub fn with_questions_per_battle(mut self, count: usize) -> Self {
        self.questions_per_battle = count;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.category.trim().is_empty() {
            return Err(BattleError::Configuration("category must not be empty".to_string()));
        }
        if self.time_per_question == 0 || self.time_per_question > MAX_TIME_PER_QUESTION {
            return Err(BattleError::Configuration(format!(
                "time_per_question must be 1-{MAX_TIME_PER_QUESTION}, got {}",
                self.time_per_question
            )));
        }
        if self.questions_per_battle == 0 || self.questions_per_battle > MAX_QUESTIONS_PER_BATTLE {
            return Err(BattleError::Configuration(format!(
                "questions_per_battle must be 1-{MAX_QUESTIONS_PER_BATTLE}, got {}",
                self.questions_per_battle
            )));
        }
        Ok(())
    }
}

// ========== Engine Settings ==========

/// Bot accuracy model.
///
/// Effective accuracy is `base_accuracy * multiplier_for(difficulty)`,
/// clamped to 0.0-1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotSettings {
    /// Probability of a correct answer before scaling (default: 0.6)
    #[serde(default = "default_base_accuracy")]
    pub base_accuracy: f64,
    #[serde(default = "default_easy_multiplier")]
    pub easy_multiplier: f64,
    #[serde(default = "default_one")]
    pub medium_multiplier: f64,
    #[serde(default = "default_hard_multiplier")]
    pub hard_multiplier: f64,
    /// Earliest think-time as a fraction of the round window (default: 0.2)
    #[serde(default = "default_think_min")]
    pub think_min_fraction: f64,
    /// Latest think-time as a fraction of the round window (default: 0.8)
    #[serde(default = "default_think_max")]
    pub think_max_fraction: f64,
}

fn default_base_accuracy() -> f64 {
    0.6
}
fn default_easy_multiplier() -> f64 {
    0.75
}
fn default_one() -> f64 {
    1.0
}
fn default_hard_multiplier() -> f64 {
    1.25
}
fn default_think_min() -> f64 {
    0.2
}
fn default_think_max() -> f64 {
    0.8
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            base_accuracy: 0.6,
            easy_multiplier: 0.75,
            medium_multiplier: 1.0,
            hard_multiplier: 1.25,
            think_min_fraction: 0.2,
            think_max_fraction: 0.8,
        }
    }
}

impl BotSettings {
    pub fn multiplier_for(&self, difficulty: Difficulty) -> f64 {
        match difficulty {
            Difficulty::Easy => self.easy_multiplier,
            Difficulty::Medium => self.medium_multiplier,
            Difficulty::Hard => self.hard_multiplier,
        }
    }
}

/// Session timers, all in ticks (one tick = one second)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Searching → error after this many ticks without `match_found` (default: 30)
    #[serde(default = "default_matchmaking_timeout")]
    pub matchmaking_timeout_secs: u32,
    /// Pre-round countdown in `ready` (default: 3, 0 = start immediately)
    #[serde(default = "default_countdown")]
    pub countdown_secs: u32,
    /// How long a live opponent may stay away before the match is ended (default: 15)
    #[serde(default = "default_reconnect_grace")]
    pub reconnect_grace_secs: u32,
}

fn default_matchmaking_timeout() -> u32 {
    30
}
fn default_countdown() -> u32 {
    3
}
fn default_reconnect_grace() -> u32 {
    15
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self { matchmaking_timeout_secs: 30, countdown_secs: 3, reconnect_grace_secs: 15 }
    }
}

/// Deployment-wide engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineSettings {
    #[serde(default)]
    pub bot: BotSettings,
    #[serde(default)]
    pub rewards: RewardConfig,
    #[serde(default)]
    pub timing: TimingSettings,
}

impl EngineSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: EngineSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Settings from the file named by `BATTLE_SETTINGS_PATH`, or defaults
    /// when the variable is unset or blank.
    pub fn from_env() -> Result<Self> {
        let Ok(path) = env::var(SETTINGS_PATH_ENV) else {
            return Ok(Self::default());
        };

        let path = path.trim();
        if path.is_empty() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            BattleError::Configuration(format!(
                "Failed to read settings from {SETTINGS_PATH_ENV}='{path}': {e}"
            ))
        })?;

        Self::from_json(&content)
    }

    /// Validate configuration bounds
    pub fn validate(&self) -> Result<()> {
        let bot = &self.bot;
        if !(0.0..=1.0).contains(&bot.base_accuracy) {
            return Err(BattleError::Configuration(format!(
                "bot.base_accuracy must be 0.0-1.0, got {}",
                bot.base_accuracy
            )));
        }
        for (name, value) in [
            ("easy_multiplier", bot.easy_multiplier),
            ("medium_multiplier", bot.medium_multiplier),
            ("hard_multiplier", bot.hard_multiplier),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(BattleError::Configuration(format!(
                    "bot.{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&bot.think_min_fraction)
            || !(0.0..=1.0).contains(&bot.think_max_fraction)
            || bot.think_min_fraction > bot.think_max_fraction
        {
            return Err(BattleError::Configuration(format!(
                "bot think window must satisfy 0 <= min <= max <= 1, got {}..{}",
                bot.think_min_fraction, bot.think_max_fraction
            )));
        }
        if self.timing.matchmaking_timeout_secs == 0 {
            return Err(BattleError::Configuration(
                "timing.matchmaking_timeout_secs must be positive".to_string(),
            ));
        }
        self.rewards.validate()
    }
}
