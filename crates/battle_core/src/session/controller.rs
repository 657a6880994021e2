//! Session Controller
//!
//! Synchronous reducer that owns one [`BattleSession`]. Every input
//! (UI calls, clock ticks, realtime envelopes) goes through one of the
//! `&mut self` methods here, so transitions are serialized by construction.
//! The async runtime in [`crate::runtime`] is the only caller in production.
//!
//! One tick is one second. Ticks drive the matchmaking timeout, the
//! pre-round countdown, the round timer, the bot's think-time and the live
//! opponent's reconnect grace window. A resolved round is shown for one tick
//! before the next round starts (or the battle completes).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::transition::StatusValidator;
use super::{
    BattleSession, BattleStatus, QuestionView, RoundClose, RoundOutcome, SessionId,
    SessionSnapshot, Side,
};
use crate::channel::{ChannelEnvelope, ChannelMessage};
use crate::config::{BattleConfig, EngineSettings, DEFAULT_TIME_PER_QUESTION};
use crate::error::{BattleError, Result, SessionError};
use crate::opponent::{LiveSignal, OpponentDescriptor, OpponentResolver, RoundWindow};
use crate::persistence::{BattleRecord, NullSink, ResultSink};
use crate::question::{AnswerLabel, QuestionSource};
use crate::reward::{AnswerTiming, RewardCalculator, StreakState};

/// Why a session was ended from outside the round flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum ForceEndReason {
    /// Moderation tooling stopped the match
    Moderation(String),
    /// Live opponent stayed away past the grace window
    OpponentLeft,
    /// The player closed the battle
    PlayerAbandoned,
    /// Unrecoverable fault reported by a collaborator
    Fault(String),
}

impl fmt::Display for ForceEndReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Moderation(note) => write!(f, "ended by moderation: {note}"),
            Self::OpponentLeft => f.write_str("opponent left the battle"),
            Self::PlayerAbandoned => f.write_str("player abandoned the battle"),
            Self::Fault(message) => write!(f, "fault: {message}"),
        }
    }
}

/// Result of a `submit_answer` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Recorded { correct: bool },
    /// This side already answered the current round; nothing changed
    Duplicate,
}

/// Whether an inbound envelope changed the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    Discarded(&'static str),
}

#[derive(Debug, Clone, Copy)]
struct Submission {
    /// `None` for a forfeit (opponent away)
    label: Option<AnswerLabel>,
    elapsed_secs: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct RoundState {
    player: Option<Submission>,
    opponent: Option<Submission>,
}

impl RoundState {
    fn slot(&mut self, side: Side) -> &mut Option<Submission> {
        match side {
            Side::Player => &mut self.player,
            Side::Opponent => &mut self.opponent,
        }
    }

    fn both_in(&self) -> bool {
        self.player.is_some() && self.opponent.is_some()
    }

    fn opponent_forfeited(&self) -> bool {
        matches!(self.opponent, Some(Submission { label: None, .. }))
    }
}

/// Owns one battle session and its collaborators
pub struct SessionController {
    session: BattleSession,
    source: Arc<dyn QuestionSource>,
    sink: Arc<dyn ResultSink>,
    settings: EngineSettings,
    calculator: RewardCalculator,
    streak: StreakState,
    resolver: Option<OpponentResolver>,
    round: RoundState,
    player_ready: bool,
    search_elapsed: u32,
    countdown_left: u32,
    outbound: Vec<ChannelEnvelope>,
    recorded: bool,
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("session_id", &self.session.id)
            .field("status", &self.session.status)
            .field("current_index", &self.session.current_index)
            .field("score", &self.session.score)
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Controller with default settings and no persistence
    pub fn new(source: Arc<dyn QuestionSource>) -> Self {
        Self {
            session: BattleSession::new(),
            source,
            sink: Arc::new(NullSink),
            settings: EngineSettings::default(),
            calculator: RewardCalculator::default(),
            streak: StreakState::default(),
            resolver: None,
            round: RoundState::default(),
            player_ready: false,
            search_elapsed: 0,
            countdown_left: 0,
            outbound: Vec::new(),
            recorded: false,
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.calculator = RewardCalculator::new(settings.rewards.clone());
        self.settings = settings;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Player's streak going into this battle
    pub fn with_streak(mut self, streak: StreakState) -> Self {
        self.streak = streak;
        self
    }

    pub fn session(&self) -> &BattleSession {
        &self.session
    }

    pub fn id(&self) -> SessionId {
        self.session.id
    }

    pub fn status(&self) -> BattleStatus {
        self.session.status
    }

    pub fn is_terminal(&self) -> bool {
        self.session.status.is_terminal()
    }

    pub fn is_live(&self) -> bool {
        matches!(self.resolver, Some(OpponentResolver::Live(_)))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn resolver(&self) -> Option<&OpponentResolver> {
        self.resolver.as_ref()
    }

    /// Streak the profile store should persist, once the battle has an outcome
    pub fn streak_after(&self) -> Option<StreakState> {
        self.session.outcome().map(|outcome| self.streak.advance(outcome))
    }

    /// Messages for the realtime channel, oldest first
    pub fn take_outbound(&mut self) -> Vec<ChannelEnvelope> {
        std::mem::take(&mut self.outbound)
    }

    // ========================
    // Operations
    // ========================

    /// Begin a battle: validate, draw questions, resolve the opponent.
    ///
    /// Configuration errors and question shortfalls leave the session idle.
    /// A question source outage ends it in `error`.
    pub fn start(&mut self, config: BattleConfig) -> Result<()> {
        if self.session.status != BattleStatus::Idle {
            return Err(BattleError::InvalidState {
                operation: "start a battle",
                status: self.session.status,
            });
        }
        config.validate()?;

        let fetched = self.source.fetch_questions(
            &config.category,
            config.difficulty,
            config.questions_per_battle,
        );
        let mut questions = match fetched {
            Ok(questions) => questions,
            Err(err @ BattleError::InsufficientQuestions { .. }) => {
                warn!(session_id = %self.session.id, "Battle not started: {err}");
                return Err(err);
            }
            Err(err) => {
                let err = match err {
                    BattleError::QuestionSource(_) => err,
                    other => BattleError::QuestionSource(other.to_string()),
                };
                self.fail(&err);
                return Err(err);
            }
        };

        if questions.len() < config.questions_per_battle {
            let err = BattleError::InsufficientQuestions {
                category: config.category.clone(),
                difficulty: config.difficulty,
                requested: config.questions_per_battle,
                available: questions.len(),
            };
            warn!(session_id = %self.session.id, "Battle not started: {err}");
            return Err(err);
        }
        questions.truncate(config.questions_per_battle);

        let resolver = OpponentResolver::for_config(
            &config,
            &self.settings.bot,
            self.session.id,
            self.settings.timing.reconnect_grace_secs,
        );

        info!(
            session_id = %self.session.id,
            category = %config.category,
            difficulty = %config.difficulty,
            mode = %config.mode,
            is_bot = config.is_bot,
            questions = questions.len(),
            "Battle starting"
        );

        self.session.questions = questions;
        self.session.time_left = config.time_per_question;
        self.resolver = Some(resolver);
        self.transition(BattleStatus::Searching);

        if config.is_bot {
            self.session.opponent = self.resolver.as_ref().and_then(|r| r.bot_descriptor());
            self.session.config = Some(config);
            self.transition(BattleStatus::Matched);
        } else {
            self.outbound.push(ChannelEnvelope::new(
                self.session.id,
                ChannelMessage::SearchRequested {
                    category: config.category.clone(),
                    difficulty: config.difficulty,
                    mode: config.mode,
                },
            ));
            self.session.config = Some(config);
        }
        Ok(())
    }

    /// Readiness acknowledgement. Idempotent.
    pub fn mark_ready(&mut self, side: Side) -> Result<()> {
        match self.session.status {
            BattleStatus::Searching | BattleStatus::Matched => {}
            BattleStatus::Ready | BattleStatus::Active | BattleStatus::RoundResolved => {
                return Ok(());
            }
            status => {
                return Err(BattleError::InvalidState { operation: "mark ready", status });
            }
        }

        match side {
            Side::Player => {
                if !self.player_ready {
                    self.player_ready = true;
                    if self.is_live() {
                        self.outbound.push(ChannelEnvelope::new(
                            self.session.id,
                            ChannelMessage::Ready { side: Side::Player },
                        ));
                    }
                }
            }
            Side::Opponent => {
                if let Some(OpponentResolver::Live(link)) = self.resolver.as_mut() {
                    link.mark_ready();
                }
            }
        }

        self.maybe_enter_ready();
        Ok(())
    }

    /// Record one side's answer for the current round.
    ///
    /// Only accepted while `active`. A repeated call from the same side is a
    /// no-op reported as [`SubmitOutcome::Duplicate`].
    pub fn submit_answer(&mut self, side: Side, label: AnswerLabel) -> Result<SubmitOutcome> {
        if self.session.status != BattleStatus::Active {
            return Err(BattleError::InvalidState {
                operation: "submit an answer",
                status: self.session.status,
            });
        }

        if self.round.slot(side).is_some() {
            debug!(session_id = %self.session.id, round = self.session.current_index, %side, "Duplicate answer ignored");
            return Ok(SubmitOutcome::Duplicate);
        }

        let correct = self.record_submission(side, Some(label));

        if side == Side::Player && self.is_live() {
            self.outbound.push(ChannelEnvelope::for_round(
                self.session.id,
                self.session.current_index,
                ChannelMessage::AnswerSubmitted {
                    side: Side::Player,
                    label,
                    ts: Utc::now().timestamp_millis(),
                },
            ));
        }

        self.resolve_if_complete();
        Ok(SubmitOutcome::Recorded { correct })
    }

    /// Advance the clock by one second
    pub fn tick(&mut self) {
        match self.session.status {
            BattleStatus::Searching => {
                self.search_elapsed += 1;
                if self.search_elapsed >= self.settings.timing.matchmaking_timeout_secs {
                    let err = BattleError::MatchmakingTimeout { waited_secs: self.search_elapsed };
                    self.fail(&err);
                }
            }
            BattleStatus::Ready => {
                self.countdown_left = self.countdown_left.saturating_sub(1);
                if self.countdown_left == 0 {
                    self.begin_round(0);
                }
            }
            BattleStatus::Active => self.tick_round(),
            BattleStatus::RoundResolved => self.advance(),
            _ => {}
        }

        if self.is_terminal() {
            return;
        }

        let grace_expired = match self.resolver.as_mut() {
            Some(OpponentResolver::Live(link)) => link.tick(),
            _ => false,
        };
        if grace_expired {
            info!(session_id = %self.session.id, "Opponent did not return within the grace window");
            if let Err(err) = self.force_end(ForceEndReason::OpponentLeft) {
                warn!(session_id = %self.session.id, "Could not end battle: {err}");
            }
        }
    }

    /// Administrative override.
    ///
    /// During play the current round is closed as forced and the battle
    /// completes with rewards. Before the first round the session is
    /// cancelled. A fault always ends in `error`.
    pub fn force_end(&mut self, reason: ForceEndReason) -> Result<()> {
        let status = self.session.status;
        if status.is_terminal() {
            return Err(BattleError::InvalidState { operation: "force end", status });
        }

        info!(session_id = %self.session.id, %status, %reason, "Battle force-ended");

        match reason {
            ForceEndReason::Fault(message) => {
                self.fail_with(SessionError::new(message, "FORCED_FAULT"));
            }
            reason if status == BattleStatus::Active => {
                self.resolve_round(RoundClose::Forced);
                self.announce_leave(&reason);
                self.complete();
            }
            reason if status == BattleStatus::RoundResolved => {
                self.announce_leave(&reason);
                self.complete();
            }
            reason => {
                self.fail_with(SessionError::new(reason.to_string(), "SESSION_CANCELLED"));
            }
        }
        Ok(())
    }

    /// Feed an envelope from the realtime channel
    pub fn handle_channel(&mut self, envelope: ChannelEnvelope) -> Delivery {
        if self.is_terminal() {
            return Delivery::Discarded("session already ended");
        }

        let window = self.round_window();
        let signal = match self.resolver.as_mut() {
            Some(OpponentResolver::Live(link)) => link.interpret(&envelope, window),
            _ => LiveSignal::Discard("session has no live opponent"),
        };

        match signal {
            LiveSignal::Matched { opponent_id, rating } => {
                if self.session.status != BattleStatus::Searching {
                    return self.discard("match already resolved");
                }
                info!(session_id = %self.session.id, %opponent_id, rating, "Opponent matched");
                self.session.opponent = Some(OpponentDescriptor::Live { opponent_id, rating });
                self.transition(BattleStatus::Matched);
                self.maybe_enter_ready();
                Delivery::Applied
            }
            LiveSignal::Ready => {
                self.maybe_enter_ready();
                Delivery::Applied
            }
            LiveSignal::Answer { label, ts } => {
                if self.round.opponent.is_some() {
                    return self.discard("opponent already answered this round");
                }
                debug!(session_id = %self.session.id, round = self.session.current_index, ts, "Opponent answer received");
                self.record_submission(Side::Opponent, Some(label));
                self.resolve_if_complete();
                Delivery::Applied
            }
            LiveSignal::Held { round } => {
                debug!(session_id = %self.session.id, round, "Opponent answer held for next round");
                Delivery::Applied
            }
            LiveSignal::Left => {
                info!(session_id = %self.session.id, round = self.session.current_index, "Opponent left the channel");
                if self.session.status == BattleStatus::Active && self.round.opponent.is_none() {
                    self.record_submission(Side::Opponent, None);
                    self.resolve_if_complete();
                }
                Delivery::Applied
            }
            LiveSignal::Returned => {
                info!(session_id = %self.session.id, "Opponent reconnected");
                Delivery::Applied
            }
            LiveSignal::Discard(reason) => self.discard(reason),
        }
    }

    /// Our own subscription ended: the player's connection is gone.
    pub fn channel_lost(&mut self) {
        if self.is_terminal() {
            return;
        }
        let err = BattleError::ChannelDisconnected("player subscription closed".to_string());
        self.fail(&err);
    }

    /// Read-only view for the UI; the correct answer is never included.
    pub fn snapshot(&self) -> SessionSnapshot {
        let session = &self.session;
        let in_play = session.status.is_in_play();
        SessionSnapshot {
            id: session.id,
            status: session.status,
            current_index: session.current_index,
            question_count: session.questions.len(),
            current_question: if in_play {
                session.current_question().map(QuestionView::from)
            } else {
                None
            },
            score: session.score,
            answers: session.answers.clone(),
            time_left: session.time_left,
            player_answered: in_play && self.round.player.is_some(),
            opponent_answered: in_play && self.round.opponent.is_some(),
            opponent: session.opponent.clone(),
            rewards: session.rewards,
            error: session.error.clone(),
        }
    }

    // ========================
    // Internal transitions
    // ========================

    fn round_secs(&self) -> u32 {
        self.session
            .config
            .as_ref()
            .map_or(DEFAULT_TIME_PER_QUESTION, |config| config.time_per_question)
    }

    /// Rounds an opponent answer may target right now
    fn round_window(&self) -> RoundWindow {
        let index = self.session.current_index;
        let within = |round: usize| (round < self.session.questions.len()).then_some(round);
        match self.session.status {
            BattleStatus::Matched | BattleStatus::Ready => RoundWindow { open: None, next: within(0) },
            BattleStatus::Active => RoundWindow { open: Some(index), next: within(index + 1) },
            BattleStatus::RoundResolved => RoundWindow { open: None, next: within(index + 1) },
            _ => RoundWindow::default(),
        }
    }

    fn transition(&mut self, to: BattleStatus) {
        let from = self.session.status;
        let check = StatusValidator::validate_transition(from, to);
        debug_assert!(check.is_ok(), "{check:?}");
        if let Err(message) = check {
            error!(session_id = %self.session.id, "{message}");
            return;
        }

        self.session.status = to;
        self.session.history.push(to);
        debug!(session_id = %self.session.id, %from, %to, "Status transition");
    }

    fn discard(&self, reason: &'static str) -> Delivery {
        debug!(session_id = %self.session.id, reason, "Channel message discarded");
        Delivery::Discarded(reason)
    }

    fn maybe_enter_ready(&mut self) {
        let opponent_ready = self.resolver.as_ref().is_some_and(|r| r.is_ready());
        if self.session.status != BattleStatus::Matched || !self.player_ready || !opponent_ready {
            return;
        }

        self.transition(BattleStatus::Ready);
        self.countdown_left = self.settings.timing.countdown_secs;
        if self.countdown_left == 0 {
            self.begin_round(0);
        }
    }

    fn begin_round(&mut self, index: usize) {
        debug_assert!(index >= self.session.current_index);
        let round_secs = self.round_secs();

        self.session.current_index = index;
        self.session.time_left = round_secs;
        self.round = RoundState::default();
        self.transition(BattleStatus::Active);

        let Some(question) = self.session.questions.get(index) else {
            return;
        };

        let mut immediate = None;
        let mut forfeit = false;
        match self.resolver.as_mut() {
            Some(OpponentResolver::Bot(bot)) => {
                let planned = bot.schedule(question, round_secs);
                debug!(session_id = %self.session.id, round = index, delay = planned.delay_secs, "Bot move scheduled");
                immediate = bot.take_due(0).map(|bot_move| bot_move.label);
            }
            Some(OpponentResolver::Live(link)) => match link.take_early(index) {
                Some(early) => {
                    debug!(session_id = %self.session.id, round = index, ts = early.ts, "Applying held opponent answer");
                    immediate = Some(early.label);
                }
                None => forfeit = !link.is_connected(),
            },
            None => {}
        }

        if let Some(label) = immediate {
            self.record_submission(Side::Opponent, Some(label));
        }
        if forfeit {
            self.record_submission(Side::Opponent, None);
        }
        debug!(session_id = %self.session.id, round = index, "Round started");
    }

    fn tick_round(&mut self) {
        let round_secs = self.round_secs();
        self.session.time_left = self.session.time_left.saturating_sub(1);
        let elapsed = round_secs - self.session.time_left.min(round_secs);

        let due = match self.resolver.as_mut() {
            Some(OpponentResolver::Bot(bot)) => bot.take_due(elapsed),
            _ => None,
        };
        if let Some(bot_move) = due {
            if self.round.opponent.is_none() {
                self.record_submission(Side::Opponent, Some(bot_move.label));
            }
            self.resolve_if_complete();
        }

        if self.session.status == BattleStatus::Active && self.session.time_left == 0 {
            self.resolve_round(RoundClose::TimerExpired);
        }
    }

    /// Returns whether the answer was correct
    fn record_submission(&mut self, side: Side, label: Option<AnswerLabel>) -> bool {
        let elapsed_secs = self.round_secs().saturating_sub(self.session.time_left);
        *self.round.slot(side) = Some(Submission { label, elapsed_secs });

        match (label, self.session.current_question()) {
            (Some(label), Some(question)) => question.is_correct(label),
            _ => false,
        }
    }

    fn resolve_if_complete(&mut self) {
        if self.session.status != BattleStatus::Active || !self.round.both_in() {
            return;
        }
        let close = if self.round.opponent_forfeited() {
            RoundClose::OpponentLeft
        } else {
            RoundClose::BothAnswered
        };
        self.resolve_round(close);
    }

    fn resolve_round(&mut self, closed_by: RoundClose) {
        let round_secs = self.round_secs();
        let index = self.session.current_index;
        let Some(question) = self.session.questions.get(index) else {
            return;
        };

        let player = self.round.player;
        let opponent = self.round.opponent;
        let player_answer = player.and_then(|s| s.label);
        let opponent_answer = opponent.and_then(|s| s.label);
        let player_correct = player_answer.is_some_and(|label| question.is_correct(label));
        let opponent_correct = opponent_answer.is_some_and(|label| question.is_correct(label));
        let player_secs = match player {
            Some(Submission { label: Some(_), elapsed_secs }) => elapsed_secs,
            _ => round_secs,
        };

        let outcome = RoundOutcome {
            index,
            question_id: question.id.clone(),
            correct_answer: question.correct_answer,
            player_answer,
            opponent_answer,
            player_correct,
            opponent_correct,
            player_secs,
            closed_by,
        };

        if player_correct {
            self.session.score.award(Side::Player);
        }
        if opponent_correct {
            self.session.score.award(Side::Opponent);
        }
        self.session.answers.push(outcome);

        if let Some(OpponentResolver::Bot(bot)) = self.resolver.as_mut() {
            bot.cancel_pending();
        }
        self.transition(BattleStatus::RoundResolved);

        debug!(
            session_id = %self.session.id,
            round = index,
            ?closed_by,
            player_correct,
            opponent_correct,
            score_player = self.session.score.player,
            score_opponent = self.session.score.opponent,
            "Round resolved"
        );
    }

    fn advance(&mut self) {
        let next = self.session.current_index + 1;
        if next < self.session.questions.len() {
            self.begin_round(next);
        } else {
            self.complete();
        }
    }

    fn complete(&mut self) {
        self.transition(BattleStatus::Completed);

        let timing = AnswerTiming {
            total_secs: self.session.answers.iter().map(|a| a.player_secs).sum(),
            per_question_limit: self.round_secs(),
        };
        let rewards = self.calculator.compute(
            self.session.score,
            self.session.answers.len(),
            &self.streak,
            &timing,
        );
        self.session.rewards = Some(rewards);
        self.session.time_left = 0;

        let outcome = self.session.score.outcome();
        self.transition(outcome.status());

        info!(
            session_id = %self.session.id,
            status = %self.session.status,
            score_player = self.session.score.player,
            score_opponent = self.session.score.opponent,
            xp = rewards.xp_earned,
            coins = rewards.coins_earned,
            "Battle completed"
        );

        self.persist();
    }

    fn persist(&mut self) {
        if self.recorded {
            return;
        }
        let (Some(config), Some(rewards), Some(outcome)) =
            (self.session.config.as_ref(), self.session.rewards, self.session.outcome())
        else {
            return;
        };

        let record = BattleRecord {
            session_id: self.session.id,
            category: config.category.clone(),
            difficulty: config.difficulty,
            mode: config.mode,
            final_score: self.session.score,
            rewards,
            outcome,
            was_bot: config.is_bot,
            opponent: self.session.opponent.clone(),
            rounds: self.session.answers.clone(),
            finished_at: Utc::now(),
        };
        self.recorded = true;

        if let Err(err) = self.sink.record_battle_result(&record) {
            warn!(session_id = %self.session.id, "Failed to record battle result: {err}");
        }
    }

    fn announce_leave(&mut self, reason: &ForceEndReason) {
        if self.is_live() && *reason != ForceEndReason::OpponentLeft {
            self.outbound.push(ChannelEnvelope::new(
                self.session.id,
                ChannelMessage::PresenceLeft { side: Side::Player },
            ));
        }
    }

    fn fail(&mut self, err: &BattleError) {
        self.fail_with(SessionError::from(err));
    }

    fn fail_with(&mut self, session_error: SessionError) {
        if self.is_terminal() {
            return;
        }
        warn!(
            session_id = %self.session.id,
            status = %self.session.status,
            code = %session_error.code,
            "Battle failed: {}",
            session_error.message
        );

        if let Some(OpponentResolver::Bot(bot)) = self.resolver.as_mut() {
            bot.cancel_pending();
        }
        self.session.time_left = 0;
        self.session.error = Some(session_error);
        self.transition(BattleStatus::Error);

        if self.is_live() {
            self.outbound.push(ChannelEnvelope::new(
                self.session.id,
                ChannelMessage::PresenceLeft { side: Side::Player },
            ));
        }
    }
}
