//! Realtime channel seam
//!
//! Messages are a tagged enum decoded at the boundary; the state machine
//! never sees raw payloads. Each envelope is keyed by session id and, for
//! answers, by round index.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::{BattleMode, Difficulty};
use crate::error::{BattleError, Result};
use crate::question::AnswerLabel;
use crate::session::{SessionId, Side};

/// Inbound buffer per subscription
pub const SUBSCRIPTION_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    /// Matchmaking paired this session with an opponent
    MatchFound { opponent_id: String, rating: u32 },
    /// `ts` is unix milliseconds at the sender
    AnswerSubmitted { side: Side, label: AnswerLabel, ts: i64 },
    PresenceLeft { side: Side },
    PresenceJoined { side: Side },
    Ready { side: Side },
    /// Published when a live session starts searching
    SearchRequested { category: String, difficulty: Difficulty, mode: BattleMode },
}

impl ChannelMessage {
    pub fn side(&self) -> Option<Side> {
        match self {
            Self::AnswerSubmitted { side, .. }
            | Self::PresenceLeft { side }
            | Self::PresenceJoined { side }
            | Self::Ready { side } => Some(*side),
            Self::MatchFound { .. } | Self::SearchRequested { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEnvelope {
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<usize>,
    pub message: ChannelMessage,
}

impl ChannelEnvelope {
    pub fn new(session_id: SessionId, message: ChannelMessage) -> Self {
        Self { session_id, round: None, message }
    }

    pub fn for_round(session_id: SessionId, round: usize, message: ChannelMessage) -> Self {
        Self { session_id, round: Some(round), message }
    }

    pub fn decode(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Publish/subscribe transport keyed by session id.
///
/// Dropping the receiver returned by `subscribe` unsubscribes.
pub trait RealtimeChannel: Send + Sync {
    fn subscribe(&self, session_id: SessionId) -> Result<mpsc::Receiver<ChannelEnvelope>>;

    fn publish(&self, envelope: ChannelEnvelope) -> Result<()>;
}

/// In-process channel hub
///
/// Routes every published envelope to the subscribers of its session id and
/// keeps a log of everything published.
#[derive(Debug, Default)]
pub struct LocalChannel {
    subscribers: Mutex<HashMap<SessionId, Vec<mpsc::Sender<ChannelEnvelope>>>>,
    published: Mutex<Vec<ChannelEnvelope>>,
}

impl LocalChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, oldest first
    pub fn published(&self) -> Vec<ChannelEnvelope> {
        self.published.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn subscriber_count(&self, session_id: SessionId) -> usize {
        let mut subscribers =
            self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match subscribers.get_mut(&session_id) {
            Some(senders) => {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            }
            None => 0,
        }
    }

    /// Close every subscription of a session, as a dropped connection would
    pub fn disconnect(&self, session_id: SessionId) {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&session_id);
    }
}

impl RealtimeChannel for LocalChannel {
    fn subscribe(&self, session_id: SessionId) -> Result<mpsc::Receiver<ChannelEnvelope>> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(session_id)
            .or_default()
            .push(tx);
        debug!(%session_id, "Channel subscription opened");
        Ok(rx)
    }

    fn publish(&self, envelope: ChannelEnvelope) -> Result<()> {
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(envelope.clone());

        let mut subscribers =
            self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(senders) = subscribers.get_mut(&envelope.session_id) else {
            return Ok(());
        };

        senders.retain(|tx| !tx.is_closed());
        let mut failed = None;
        for (subscriber, tx) in senders.iter().enumerate() {
            if let Err(e) = tx.try_send(envelope.clone()) {
                warn!(session_id = %envelope.session_id, subscriber, "Dropping channel message: {e}");
                if failed.is_none() {
                    failed = Some(e.to_string());
                }
            }
        }
        match failed {
            Some(reason) => Err(BattleError::ChannelDisconnected(reason)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let id = SessionId::new();
        let envelope = ChannelEnvelope::for_round(
            id,
            3,
            ChannelMessage::AnswerSubmitted { side: Side::Opponent, label: AnswerLabel::D, ts: 1_700 },
        );
        let json: serde_json::Value = serde_json::from_str(&envelope.encode().unwrap()).unwrap();

        assert_eq!(json["round"], 3);
        assert_eq!(json["message"]["type"], "answer_submitted");
        assert_eq!(json["message"]["side"], "opponent");
        assert_eq!(json["message"]["label"], "D");
    }

    #[test]
    fn test_decode_rejects_untyped_payloads() {
        let id = SessionId::new();
        let json = format!(r#"{{"session_id":"{id}","message":{{"opponent_id":"x"}}}}"#);
        assert!(ChannelEnvelope::decode(&json).is_err());

        let json = format!(
            r#"{{"session_id":"{id}","message":{{"type":"match_found","opponent_id":"x","rating":1200}}}}"#
        );
        let envelope = ChannelEnvelope::decode(&json).unwrap();
        assert_eq!(envelope.round, None);
        assert_eq!(
            envelope.message,
            ChannelMessage::MatchFound { opponent_id: "x".to_string(), rating: 1200 }
        );
    }

    #[tokio::test]
    async fn test_local_channel_routes_by_session() {
        let hub = LocalChannel::new();
        let a = SessionId::new();
        let b = SessionId::new();
        let mut rx_a = hub.subscribe(a).unwrap();
        let mut rx_b = hub.subscribe(b).unwrap();

        hub.publish(ChannelEnvelope::new(a, ChannelMessage::Ready { side: Side::Opponent }))
            .unwrap();

        assert_eq!(rx_a.recv().await.unwrap().session_id, a);
        assert!(rx_b.try_recv().is_err());
        assert_eq!(hub.published().len(), 1);
    }

    #[tokio::test]
    async fn test_dropping_receiver_unsubscribes() {
        let hub = LocalChannel::new();
        let id = SessionId::new();
        let rx = hub.subscribe(id).unwrap();
        assert_eq!(hub.subscriber_count(id), 1);

        drop(rx);
        assert_eq!(hub.subscriber_count(id), 0);
        assert!(hub
            .publish(ChannelEnvelope::new(id, ChannelMessage::Ready { side: Side::Opponent }))
            .is_ok());
    }

    #[tokio::test]
    async fn test_full_subscriber_does_not_starve_others() {
        let hub = LocalChannel::new();
        let id = SessionId::new();
        let _stalled = hub.subscribe(id).unwrap();
        let mut healthy = hub.subscribe(id).unwrap();
        let ready = ChannelEnvelope::new(id, ChannelMessage::Ready { side: Side::Opponent });

        for _ in 0..SUBSCRIPTION_CAPACITY {
            hub.publish(ready.clone()).unwrap();
            healthy.recv().await.unwrap();
        }

        let err = hub.publish(ready.clone()).unwrap_err();
        assert!(matches!(err, BattleError::ChannelDisconnected(_)));
        assert_eq!(healthy.recv().await.unwrap(), ready);
    }

    #[tokio::test]
    async fn test_disconnect_closes_subscription() {
        let hub = LocalChannel::new();
        let id = SessionId::new();
        let mut rx = hub.subscribe(id).unwrap();

        hub.disconnect(id);
        assert!(rx.recv().await.is_none());
    }
}
