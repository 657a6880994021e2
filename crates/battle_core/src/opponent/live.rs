//! Live opponent link
//!
//! Decodes realtime envelopes addressed to this session into
//! [`LiveSignal`]s and tracks the opponent's presence. Fencing happens here:
//! envelopes for another session, echoes of our own side, and answers for a
//! round that already closed never reach the state machine. The two clients
//! tick on separate clocks, so an answer for the round that starts next is
//! held until that round begins.

use serde::{Deserialize, Serialize};

use crate::channel::{ChannelEnvelope, ChannelMessage};
use crate::question::AnswerLabel;
use crate::session::{SessionId, Side};

/// Opponent presence on the realtime channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Presence {
    Connected,
    /// Left; the match is ended when `grace_left` runs out
    Away { grace_left: u32 },
}

/// Round indices an inbound answer may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundWindow {
    /// Round currently accepting answers
    pub open: Option<usize>,
    /// Round that starts next
    pub next: Option<usize>,
}

/// Opponent answer received before its round started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarlyAnswer {
    pub round: usize,
    pub label: AnswerLabel,
    pub ts: i64,
}

/// What an inbound envelope means for the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveSignal {
    Matched { opponent_id: String, rating: u32 },
    Ready,
    Answer { label: AnswerLabel, ts: i64 },
    /// Answer for the next round, held until it begins
    Held { round: usize },
    Left,
    Returned,
    /// Dropped at the boundary; the reason is logged by the caller
    Discard(&'static str),
}

/// Live opponent state for one session
#[derive(Debug, Clone)]
pub struct LiveLink {
    session_id: SessionId,
    grace_secs: u32,
    presence: Presence,
    ready: bool,
    early: Option<EarlyAnswer>,
}

impl LiveLink {
    pub fn new(session_id: SessionId, grace_secs: u32) -> Self {
        Self { session_id, grace_secs, presence: Presence::Connected, ready: false, early: None }
    }

    pub fn presence(&self) -> Presence {
        self.presence
    }

    pub fn is_connected(&self) -> bool {
        self.presence == Presence::Connected
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Readiness acknowledged out of band
    pub fn mark_ready(&mut self) {
        self.ready = true;
    }

    /// Held answer for `round`, if one arrived before it started
    pub fn take_early(&mut self, round: usize) -> Option<EarlyAnswer> {
        match self.early {
            Some(early) if early.round == round => self.early.take(),
            _ => None,
        }
    }

    /// Decode an envelope against the rounds currently accepting answers
    pub fn interpret(&mut self, envelope: &ChannelEnvelope, window: RoundWindow) -> LiveSignal {
        if envelope.session_id != self.session_id {
            return LiveSignal::Discard("envelope for another session");
        }

        if let Some(side) = envelope.message.side() {
            if side == Side::Player {
                return LiveSignal::Discard("echo of our own message");
            }
        }

        match &envelope.message {
            ChannelMessage::MatchFound { opponent_id, rating } => {
                LiveSignal::Matched { opponent_id: opponent_id.clone(), rating: *rating }
            }
            ChannelMessage::Ready { .. } => {
                self.ready = true;
                LiveSignal::Ready
            }
            ChannelMessage::AnswerSubmitted { label, ts, .. } => {
                let Some(round) = envelope.round else {
                    return LiveSignal::Discard("answer without round index");
                };
                if window.open == Some(round) {
                    return LiveSignal::Answer { label: *label, ts: *ts };
                }
                if window.next != Some(round) {
                    return LiveSignal::Discard("stale answer for another round");
                }
                if self.early.is_some_and(|early| early.round == round) {
                    return LiveSignal::Discard("opponent already answered the next round");
                }
                self.early = Some(EarlyAnswer { round, label: *label, ts: *ts });
                LiveSignal::Held { round }
            }
            ChannelMessage::PresenceLeft { .. } => {
                if !self.is_connected() {
                    return LiveSignal::Discard("opponent already away");
                }
                self.presence = Presence::Away { grace_left: self.grace_secs };
                LiveSignal::Left
            }
            ChannelMessage::PresenceJoined { .. } => {
                if self.is_connected() {
                    return LiveSignal::Discard("opponent already connected");
                }
                self.presence = Presence::Connected;
                LiveSignal::Returned
            }
            ChannelMessage::SearchRequested { .. } => {
                LiveSignal::Discard("search request is outbound only")
            }
        }
    }

    /// Advance the grace window by one tick. Returns `true` once it has run out.
    pub fn tick(&mut self) -> bool {
        match self.presence {
            Presence::Connected => false,
            Presence::Away { grace_left } => {
                let grace_left = grace_left.saturating_sub(1);
                self.presence = Presence::Away { grace_left };
                grace_left == 0
            }
        }
    }
}
