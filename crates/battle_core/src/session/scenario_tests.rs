//! End-to-end battle scenarios against the controller
//!
//! Every scenario drives the reducer directly, one tick per second, with a
//! seeded bank so the drawn questions are reproducible.

use std::sync::Arc;

use super::*;
use crate::bank::QuestionBank;
use crate::channel::{ChannelEnvelope, ChannelMessage};
use crate::config::{BattleConfig, Difficulty, EngineSettings};
use crate::error::{BattleError, Result};
use crate::persistence::{BattleRecord, MemorySink, ResultSink};
use crate::question::{AnswerLabel, Question, QuestionSource};
use crate::reward::RewardPayload;

const CATEGORY: &str = "contracts";

fn bank(count: usize) -> Arc<QuestionBank> {
    let questions = (0..count)
        .map(|i| {
            Question::new(
                format!("c-{i:03}"),
                format!("Which clause applies in case {i}?"),
                [
                    "Offer".to_string(),
                    "Acceptance".to_string(),
                    "Consideration".to_string(),
                    "Capacity".to_string(),
                ],
                AnswerLabel::A,
            )
            .with_category(CATEGORY)
        })
        .collect();
    Arc::new(QuestionBank::seeded(questions, 2024).unwrap())
}

/// Bot that never answers correctly, no pre-round countdown
fn hopeless_bot() -> EngineSettings {
    let mut settings = EngineSettings::default();
    settings.bot.base_accuracy = 0.0;
    settings.timing.countdown_secs = 0;
    settings
}

fn no_countdown() -> EngineSettings {
    let mut settings = EngineSettings::default();
    settings.timing.countdown_secs = 0;
    settings
}

fn opponent(id: SessionId, message: ChannelMessage) -> ChannelEnvelope {
    ChannelEnvelope::new(id, message)
}

fn opponent_answer(id: SessionId, round: usize, label: AnswerLabel) -> ChannelEnvelope {
    ChannelEnvelope::for_round(
        id,
        round,
        ChannelMessage::AnswerSubmitted { side: Side::Opponent, label, ts: 1_700_000_000_000 },
    )
}

/// Live session that has been matched and is on round 0
fn live_in_round_zero() -> SessionController {
    let mut controller = SessionController::new(bank(10)).with_settings(no_countdown());
    controller.start(BattleConfig::new(CATEGORY, Difficulty::Medium)).unwrap();
    let id = controller.id();

    let matched = opponent(id, ChannelMessage::MatchFound { opponent_id: "u-77".to_string(), rating: 1510 });
    assert_eq!(controller.handle_channel(matched), Delivery::Applied);
    assert_eq!(controller.status(), BattleStatus::Matched);

    controller.mark_ready(Side::Player).unwrap();
    assert_eq!(controller.status(), BattleStatus::Matched);
    controller.handle_channel(opponent(id, ChannelMessage::Ready { side: Side::Opponent }));
    assert_eq!(controller.status(), BattleStatus::Active);
    controller
}

fn tick_while(controller: &mut SessionController, status: BattleStatus) -> u32 {
    let mut ticks = 0;
    while controller.status() == status {
        controller.tick();
        ticks += 1;
        assert!(ticks <= 120, "stuck in {status}");
    }
    ticks
}

#[test]
fn test_perfect_bot_battle_is_victory() {
    let sink = Arc::new(MemorySink::new());
    let mut controller = SessionController::new(bank(10))
        .with_settings(hopeless_bot())
        .with_sink(sink.clone());

    controller
        .start(BattleConfig::bot(CATEGORY, Difficulty::Medium).with_seed(11))
        .unwrap();
    controller.mark_ready(Side::Player).unwrap();

    for round in 0..5 {
        assert_eq!(controller.status(), BattleStatus::Active);
        assert_eq!(controller.session().current_index(), round);
        assert_eq!(
            controller.submit_answer(Side::Player, AnswerLabel::A).unwrap(),
            SubmitOutcome::Recorded { correct: true }
        );
        tick_while(&mut controller, BattleStatus::Active);
        assert_eq!(controller.status(), BattleStatus::RoundResolved);
        controller.tick();
    }

    assert_eq!(controller.status(), BattleStatus::Victory);
    assert_eq!(controller.session().score(), Score::new(5, 0));
    assert_eq!(
        controller.session().rewards().copied(),
        Some(RewardPayload { xp_earned: 50, coins_earned: 25, streak_bonus: 5, time_bonus: 10 })
    );
    assert!(controller.session().error().is_none());

    let history = controller.session().history();
    assert_eq!(&history[..4], &[
        BattleStatus::Idle,
        BattleStatus::Searching,
        BattleStatus::Matched,
        BattleStatus::Ready,
    ]);
    assert_eq!(&history[history.len() - 2..], &[BattleStatus::Completed, BattleStatus::Victory]);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].rounds.len(), 5);
    assert!(records[0].was_bot);
}

#[test]
fn test_unknown_category_stays_idle() {
    let mut controller = SessionController::new(bank(10));
    let err = controller
        .start(BattleConfig::bot("nonexistent", Difficulty::Medium))
        .unwrap_err();

    assert!(matches!(err, BattleError::InsufficientQuestions { available: 0, requested: 5, .. }));
    assert_eq!(err.error_code(), "INSUFFICIENT_QUESTIONS");
    assert_eq!(controller.status(), BattleStatus::Idle);
    assert!(controller.session().error().is_none());
}

#[test]
fn test_small_bank_is_insufficient() {
    let mut controller = SessionController::new(bank(3));
    let err = controller.start(BattleConfig::bot(CATEGORY, Difficulty::Easy)).unwrap_err();
    assert!(matches!(err, BattleError::InsufficientQuestions { available: 3, .. }));
    assert_eq!(controller.status(), BattleStatus::Idle);
}

#[test]
fn test_invalid_config_stays_idle() {
    let mut controller = SessionController::new(bank(10));
    let err = controller
        .start(BattleConfig::bot(CATEGORY, Difficulty::Easy).with_time_per_question(0))
        .unwrap_err();
    assert!(matches!(err, BattleError::Configuration(_)));
    assert_eq!(controller.status(), BattleStatus::Idle);
}

#[test]
fn test_silent_round_times_out() {
    let mut controller = SessionController::new(bank(10)).with_settings(hopeless_bot());
    controller.start(BattleConfig::bot(CATEGORY, Difficulty::Hard).with_seed(5)).unwrap();
    controller.mark_ready(Side::Player).unwrap();

    for _ in 0..29 {
        controller.tick();
    }
    assert_eq!(controller.status(), BattleStatus::Active);
    assert_eq!(controller.session().time_left(), 1);
    assert!(controller.snapshot().opponent_answered);

    controller.tick();
    assert_eq!(controller.status(), BattleStatus::RoundResolved);

    let round = &controller.session().answers()[0];
    assert_eq!(round.closed_by, RoundClose::TimerExpired);
    assert_eq!(round.player_answer, None);
    assert!(!round.player_correct);
    assert_eq!(round.player_secs, 30);

    controller.tick();
    assert_eq!(controller.status(), BattleStatus::Active);
    assert_eq!(controller.session().current_index(), 1);
    assert_eq!(controller.session().time_left(), 30);
}

#[test]
fn test_duplicate_submit_does_not_double_score() {
    let mut controller = SessionController::new(bank(10)).with_settings(hopeless_bot());
    controller.start(BattleConfig::bot(CATEGORY, Difficulty::Easy).with_seed(8)).unwrap();
    controller.mark_ready(Side::Player).unwrap();

    controller.submit_answer(Side::Player, AnswerLabel::A).unwrap();
    assert_eq!(
        controller.submit_answer(Side::Player, AnswerLabel::A).unwrap(),
        SubmitOutcome::Duplicate
    );
    tick_while(&mut controller, BattleStatus::Active);
    assert_eq!(controller.session().score(), Score::new(1, 0));
    assert_eq!(controller.session().answers().len(), 1);
}

#[test]
fn test_presence_left_mid_round_continues() {
    let mut controller = live_in_round_zero();
    let id = controller.id();

    let left = opponent(id, ChannelMessage::PresenceLeft { side: Side::Opponent });
    assert_eq!(controller.handle_channel(left), Delivery::Applied);
    assert_eq!(controller.status(), BattleStatus::Active);

    controller.submit_answer(Side::Player, AnswerLabel::A).unwrap();
    assert_eq!(controller.status(), BattleStatus::RoundResolved);
    assert_eq!(controller.session().answers()[0].closed_by, RoundClose::OpponentLeft);
    assert_eq!(controller.session().score(), Score::new(1, 0));

    // Still away: the next round starts with the opponent's forfeit in place
    controller.tick();
    assert_eq!(controller.session().current_index(), 1);
    assert!(controller.snapshot().opponent_answered);

    let joined = opponent(id, ChannelMessage::PresenceJoined { side: Side::Opponent });
    assert_eq!(controller.handle_channel(joined), Delivery::Applied);
    controller.submit_answer(Side::Player, AnswerLabel::B).unwrap();
    assert_eq!(controller.status(), BattleStatus::RoundResolved);

    controller.tick();
    assert_eq!(controller.session().current_index(), 2);
    assert!(!controller.snapshot().opponent_answered);

    assert_eq!(
        controller.handle_channel(opponent_answer(id, 1, AnswerLabel::A)),
        Delivery::Discarded("stale answer for another round")
    );
    assert_eq!(controller.handle_channel(opponent_answer(id, 2, AnswerLabel::A)), Delivery::Applied);
    assert!(controller.snapshot().opponent_answered);
    assert_eq!(controller.status(), BattleStatus::Active);
}

#[test]
fn test_grace_expiry_ends_battle_with_rewards() {
    let mut controller = live_in_round_zero();
    let id = controller.id();

    controller.submit_answer(Side::Player, AnswerLabel::A).unwrap();
    controller.handle_channel(opponent(id, ChannelMessage::PresenceLeft { side: Side::Opponent }));
    assert_eq!(controller.status(), BattleStatus::RoundResolved);

    for _ in 0..14 {
        controller.tick();
        assert_eq!(controller.status(), BattleStatus::Active);
    }
    controller.tick();

    assert_eq!(controller.status(), BattleStatus::Victory);
    let answers = controller.session().answers();
    assert_eq!(answers.len(), 2);
    assert_eq!(answers[1].closed_by, RoundClose::Forced);
    assert!(controller.session().rewards().is_some());
}

#[test]
fn test_live_answers_both_sides() {
    let mut controller = live_in_round_zero();
    let id = controller.id();

    assert_eq!(controller.handle_channel(opponent_answer(id, 0, AnswerLabel::A)), Delivery::Applied);
    assert_eq!(
        controller.handle_channel(opponent_answer(id, 0, AnswerLabel::B)),
        Delivery::Discarded("opponent already answered this round")
    );
    controller.submit_answer(Side::Player, AnswerLabel::C).unwrap();

    assert_eq!(controller.status(), BattleStatus::RoundResolved);
    assert_eq!(controller.session().score(), Score::new(0, 1));

    let outbound = controller.take_outbound();
    assert!(matches!(outbound[0].message, ChannelMessage::SearchRequested { .. }));
    assert_eq!(outbound[1].message, ChannelMessage::Ready { side: Side::Player });
    match &outbound[2] {
        ChannelEnvelope {
            round: Some(0),
            message: ChannelMessage::AnswerSubmitted { side: Side::Player, label: AnswerLabel::C, .. },
            ..
        } => {}
        other => panic!("unexpected outbound envelope: {other:?}"),
    }
}

#[test]
fn test_answer_for_next_round_counts_once_it_starts() {
    let mut controller = live_in_round_zero();
    let id = controller.id();

    controller.submit_answer(Side::Player, AnswerLabel::A).unwrap();
    controller.handle_channel(opponent_answer(id, 0, AnswerLabel::B));
    assert_eq!(controller.status(), BattleStatus::RoundResolved);

    // Remote clock already moved on to round 1
    assert_eq!(controller.handle_channel(opponent_answer(id, 1, AnswerLabel::A)), Delivery::Applied);
    assert_eq!(
        controller.handle_channel(opponent_answer(id, 0, AnswerLabel::A)),
        Delivery::Discarded("stale answer for another round")
    );
    assert_eq!(
        controller.handle_channel(opponent_answer(id, 2, AnswerLabel::A)),
        Delivery::Discarded("stale answer for another round")
    );

    controller.tick();
    assert_eq!(controller.status(), BattleStatus::Active);
    assert_eq!(controller.session().current_index(), 1);
    assert!(controller.snapshot().opponent_answered);

    controller.submit_answer(Side::Player, AnswerLabel::C).unwrap();
    assert_eq!(controller.status(), BattleStatus::RoundResolved);

    let round = &controller.session().answers()[1];
    assert_eq!(round.closed_by, RoundClose::BothAnswered);
    assert_eq!(round.opponent_answer, Some(AnswerLabel::A));
    assert!(round.opponent_correct);
    assert_eq!(controller.session().score(), Score::new(1, 1));
}

#[test]
fn test_answer_during_countdown_is_held_for_first_round() {
    let mut settings = EngineSettings::default();
    settings.timing.countdown_secs = 2;
    let mut controller = SessionController::new(bank(10)).with_settings(settings);
    controller.start(BattleConfig::new(CATEGORY, Difficulty::Medium)).unwrap();
    let id = controller.id();

    controller.handle_channel(opponent(id, ChannelMessage::MatchFound { opponent_id: "u-9".to_string(), rating: 1400 }));
    controller.mark_ready(Side::Player).unwrap();
    controller.handle_channel(opponent(id, ChannelMessage::Ready { side: Side::Opponent }));
    assert_eq!(controller.status(), BattleStatus::Ready);

    assert_eq!(controller.handle_channel(opponent_answer(id, 0, AnswerLabel::A)), Delivery::Applied);
    tick_while(&mut controller, BattleStatus::Ready);

    assert_eq!(controller.status(), BattleStatus::Active);
    assert!(controller.snapshot().opponent_answered);
}

#[test]
fn test_matchmaking_timeout() {
    let mut controller = SessionController::new(bank(10));
    controller.start(BattleConfig::new(CATEGORY, Difficulty::Easy)).unwrap();
    assert_eq!(controller.status(), BattleStatus::Searching);

    for _ in 0..29 {
        controller.tick();
    }
    assert_eq!(controller.status(), BattleStatus::Searching);
    controller.tick();

    assert_eq!(controller.status(), BattleStatus::Error);
    assert_eq!(controller.session().error().map(|e| e.code.as_str()), Some("MATCHMAKING_TIMEOUT"));
    assert!(controller.session().rewards().is_none());

    let late = opponent(controller.id(), ChannelMessage::MatchFound { opponent_id: "u-1".to_string(), rating: 1000 });
    assert_eq!(controller.handle_channel(late), Delivery::Discarded("session already ended"));
}

#[test]
fn test_channel_lost_is_fatal() {
    let mut controller = live_in_round_zero();
    controller.channel_lost();

    assert_eq!(controller.status(), BattleStatus::Error);
    assert_eq!(controller.session().error().map(|e| e.code.as_str()), Some("CHANNEL_DISCONNECTED"));
    assert!(controller
        .take_outbound()
        .iter()
        .any(|e| e.message == ChannelMessage::PresenceLeft { side: Side::Player }));
}

struct OfflineSource;

impl QuestionSource for OfflineSource {
    fn fetch_questions(&self, _: &str, _: Difficulty, _: usize) -> Result<Vec<Question>> {
        Err(BattleError::QuestionSource("connection refused".to_string()))
    }
}

#[test]
fn test_question_source_outage_is_error() {
    let mut controller = SessionController::new(Arc::new(OfflineSource));
    let err = controller.start(BattleConfig::bot(CATEGORY, Difficulty::Easy)).unwrap_err();

    assert!(matches!(err, BattleError::QuestionSource(_)));
    assert_eq!(controller.status(), BattleStatus::Error);
    assert_eq!(controller.session().error().map(|e| e.code.as_str()), Some("QUESTION_SOURCE_FAILED"));
}

struct BrokenSink;

impl ResultSink for BrokenSink {
    fn record_battle_result(&self, _: &BattleRecord) -> Result<()> {
        Err(BattleError::Persistence("disk full".to_string()))
    }
}

#[test]
fn test_sink_failure_keeps_result() {
    let mut controller = SessionController::new(bank(10))
        .with_settings(hopeless_bot())
        .with_sink(Arc::new(BrokenSink));
    controller
        .start(BattleConfig::bot(CATEGORY, Difficulty::Easy).with_questions_per_battle(1))
        .unwrap();
    controller.mark_ready(Side::Player).unwrap();
    controller.submit_answer(Side::Player, AnswerLabel::A).unwrap();
    tick_while(&mut controller, BattleStatus::Active);
    controller.tick();

    assert_eq!(controller.status(), BattleStatus::Victory);
    assert!(controller.session().rewards().is_some());
}

#[test]
fn test_draw_when_both_miss_everything() {
    let mut controller = SessionController::new(bank(10)).with_settings(hopeless_bot());
    controller
        .start(BattleConfig::bot(CATEGORY, Difficulty::Easy).with_questions_per_battle(2))
        .unwrap();
    controller.mark_ready(Side::Player).unwrap();

    while !controller.is_terminal() {
        controller.tick();
    }

    assert_eq!(controller.status(), BattleStatus::Draw);
    assert_eq!(controller.session().rewards().copied(), Some(RewardPayload::default()));
    assert_eq!(controller.streak_after(), Some(Default::default()));
}
