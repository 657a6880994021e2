//! Battle session aggregate
//!
//! [`BattleSession`] is the state of one match. It is only mutated by the
//! [`SessionController`]; everything outside the crate reads it through
//! accessors or a [`SessionSnapshot`].

pub mod controller;
pub mod transition;

#[cfg(test)]
mod proptests;
#[cfg(test)]
mod scenario_tests;

pub use controller::{Delivery, ForceEndReason, SessionController, SubmitOutcome};
pub use transition::StatusValidator;

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::BattleConfig;
use crate::error::SessionError;
use crate::opponent::OpponentDescriptor;
use crate::question::{AnswerLabel, Question};
use crate::reward::RewardPayload;

/// Opaque session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleStatus {
    Idle,
    Searching,
    Matched,
    Ready,
    Active,
    RoundResolved,
    Completed,
    Victory,
    Defeat,
    Draw,
    Error,
}

impl BattleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Searching => "searching",
            Self::Matched => "matched",
            Self::Ready => "ready",
            Self::Active => "active",
            Self::RoundResolved => "round_resolved",
            Self::Completed => "completed",
            Self::Victory => "victory",
            Self::Defeat => "defeat",
            Self::Draw => "draw",
            Self::Error => "error",
        }
    }

    /// No further gameplay happens once a session reaches one of these.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Victory | Self::Defeat | Self::Draw | Self::Error)
    }

    /// Terminal and not `error`: the only statuses that carry rewards.
    pub fn is_finished(&self) -> bool {
        self.is_terminal() && *self != Self::Error
    }

    /// Rounds are being played (question on screen or result being shown)
    pub fn is_in_play(&self) -> bool {
        matches!(self, Self::Active | Self::RoundResolved)
    }
}

impl fmt::Display for BattleStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final result derived from the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleOutcome {
    Victory,
    Defeat,
    Draw,
}

impl BattleOutcome {
    pub fn status(&self) -> BattleStatus {
        match self {
            Self::Victory => BattleStatus::Victory,
            Self::Defeat => BattleStatus::Defeat,
            Self::Draw => BattleStatus::Draw,
        }
    }
}

/// Participant in a battle, from the local player's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Player,
    Opponent,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Player => f.write_str("player"),
            Self::Opponent => f.write_str("opponent"),
        }
    }
}

/// Correct answers per side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Score {
    pub player: u32,
    pub opponent: u32,
}

impl Score {
    pub fn new(player: u32, opponent: u32) -> Self {
        Self { player, opponent }
    }

    pub fn get(&self, side: Side) -> u32 {
        match side {
            Side::Player => self.player,
            Side::Opponent => self.opponent,
        }
    }

    pub(crate) fn award(&mut self, side: Side) {
        match side {
            Side::Player => self.player += 1,
            Side::Opponent => self.opponent += 1,
        }
    }

    pub fn outcome(&self) -> BattleOutcome {
        match self.player.cmp(&self.opponent) {
            std::cmp::Ordering::Greater => BattleOutcome::Victory,
            std::cmp::Ordering::Less => BattleOutcome::Defeat,
            std::cmp::Ordering::Equal => BattleOutcome::Draw,
        }
    }
}

/// Why a round closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundClose {
    BothAnswered,
    TimerExpired,
    OpponentLeft,
    Forced,
}

/// Resolved round, appended to [`BattleSession::answers`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundOutcome {
    pub index: usize,
    pub question_id: String,
    pub correct_answer: AnswerLabel,
    pub player_answer: Option<AnswerLabel>,
    pub opponent_answer: Option<AnswerLabel>,
    pub player_correct: bool,
    pub opponent_correct: bool,
    /// Seconds the player took; the full limit when they never answered
    pub player_secs: u32,
    pub closed_by: RoundClose,
}

/// Aggregate root for one match
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleSession {
    pub(crate) id: SessionId,
    pub(crate) status: BattleStatus,
    pub(crate) config: Option<BattleConfig>,
    pub(crate) questions: Vec<Question>,
    pub(crate) current_index: usize,
    pub(crate) score: Score,
    pub(crate) answers: Vec<RoundOutcome>,
    pub(crate) time_left: u32,
    pub(crate) opponent: Option<OpponentDescriptor>,
    pub(crate) rewards: Option<RewardPayload>,
    pub(crate) error: Option<SessionError>,
    /// Every status the session has been in, in order
    pub(crate) history: Vec<BattleStatus>,
}

impl BattleSession {
    pub(crate) fn new() -> Self {
        Self {
            id: SessionId::new(),
            status: BattleStatus::Idle,
            config: None,
            questions: Vec::new(),
            current_index: 0,
            score: Score::default(),
            answers: Vec::new(),
            time_left: 0,
            opponent: None,
            rewards: None,
            error: None,
            history: vec![BattleStatus::Idle],
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn status(&self) -> BattleStatus {
        self.status
    }

    pub fn config(&self) -> Option<&BattleConfig> {
        self.config.as_ref()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn answers(&self) -> &[RoundOutcome] {
        &self.answers
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    pub fn opponent(&self) -> Option<&OpponentDescriptor> {
        self.opponent.as_ref()
    }

    pub fn rewards(&self) -> Option<&RewardPayload> {
        self.rewards.as_ref()
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    pub fn history(&self) -> &[BattleStatus] {
        &self.history
    }

    pub fn outcome(&self) -> Option<BattleOutcome> {
        match self.status {
            BattleStatus::Victory => Some(BattleOutcome::Victory),
            BattleStatus::Defeat => Some(BattleOutcome::Defeat),
            BattleStatus::Draw => Some(BattleOutcome::Draw),
            _ => None,
        }
    }
}

/// Question as shown to the player (correct answer withheld)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: String,
    pub prompt: String,
    pub alternatives: [String; 4],
}

impl From<&Question> for QuestionView {
    fn from(q: &Question) -> Self {
        Self { id: q.id.clone(), prompt: q.prompt.clone(), alternatives: q.alternatives.clone() }
    }
}

/// Read-only view published to the UI after every transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub status: BattleStatus,
    pub current_index: usize,
    pub question_count: usize,
    pub current_question: Option<QuestionView>,
    pub score: Score,
    pub answers: Vec<RoundOutcome>,
    pub time_left: u32,
    pub player_answered: bool,
    pub opponent_answered: bool,
    pub opponent: Option<OpponentDescriptor>,
    pub rewards: Option<RewardPayload>,
    pub error: Option<SessionError>,
}

impl SessionSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
