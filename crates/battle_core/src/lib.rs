//! # battle_core - Quiz Battle Session Engine
//!
//! Runs one head-to-head quiz battle from matchmaking to rewards.
//!
//! ## Features
//! - Explicit status machine (idle → searching → matched → ready → active ⇄ round_resolved → completed → outcome)
//! - Bot opponent with seeded, reproducible answers
//! - Live opponent over a realtime channel with a reconnect grace window
//! - Deterministic reward calculation (streak multiplier, streak and time bonuses)
//! - Tokio session loop with a watch-based snapshot feed for the UI
//!
//! ## Example
//! ```
//! use std::sync::Arc;
//! use battle_core::{AnswerLabel, BattleConfig, Difficulty, Question, QuestionBank, SessionController, Side};
//!
//! let questions = (0..5)
//!     .map(|i| {
//!         Question::new(
//!             format!("q{i}"),
//!             format!("Question {i}"),
//!             ["a".into(), "b".into(), "c".into(), "d".into()],
//!             AnswerLabel::C,
//!         )
//!         .with_category("contracts")
//!     })
//!     .collect();
//! let bank = Arc::new(QuestionBank::seeded(questions, 7).unwrap());
//!
//! let mut battle = SessionController::new(bank);
//! battle.start(BattleConfig::bot("contracts", Difficulty::Medium).with_seed(7)).unwrap();
//! battle.mark_ready(Side::Player).unwrap();
//! ```

pub mod bank;
pub mod channel;
pub mod config;
pub mod error;
pub mod opponent;
pub mod persistence;
pub mod question;
pub mod reward;
pub mod runtime;
pub mod session;

pub use bank::{QuestionBank, QuestionBankError};
pub use channel::{ChannelEnvelope, ChannelMessage, LocalChannel, RealtimeChannel};
pub use config::{BattleConfig, BattleMode, BotSettings, Difficulty, EngineSettings, TimingSettings};
pub use error::{BattleError, Result, SessionError};
pub use opponent::{BotSimulator, OpponentDescriptor, OpponentResolver};
pub use persistence::{BattleRecord, JsonlSink, MemorySink, NullSink, ResultSink};
pub use question::{AnswerLabel, Question, QuestionSource};
pub use reward::{compute_rewards, AnswerTiming, RewardCalculator, RewardConfig, RewardPayload, StreakState};
pub use runtime::{BattleHandle, BattleRuntime};
pub use session::{
    BattleOutcome, BattleSession, BattleStatus, Delivery, ForceEndReason, RoundClose,
    RoundOutcome, Score, SessionController, SessionId, SessionSnapshot, Side, SubmitOutcome,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
