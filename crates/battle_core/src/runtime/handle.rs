//! Client-facing handle for a running battle.
//!
//! [`BattleHandle`] hides the command plumbing. Snapshots are published on a
//! watch channel after every step of the session loop.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::Command;
use crate::error::{BattleError, Result};
use crate::question::AnswerLabel;
use crate::session::{ForceEndReason, SessionId, SessionSnapshot, SubmitOutcome};

/// Handle to one running session.
///
/// Dropping the handle closes the command channel; the session loop treats
/// that as the player abandoning the battle.
#[derive(Debug)]
pub struct BattleHandle {
    session_id: SessionId,
    command_tx: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    task: Option<JoinHandle<SessionSnapshot>>,
}

impl BattleHandle {
    pub(crate) fn new(
        session_id: SessionId,
        command_tx: mpsc::Sender<Command>,
        snapshot_rx: watch::Receiver<SessionSnapshot>,
        task: JoinHandle<SessionSnapshot>,
    ) -> Self {
        Self { session_id, command_tx, snapshot_rx, task: Some(task) }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Player readiness acknowledgement
    pub async fn ready(&self) -> Result<()> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(Command::Ready { reply }).await?;
        reply_rx.await.map_err(|_| BattleError::RuntimeStopped)?
    }

    /// Submit the player's answer for the current round
    pub async fn submit_answer(&self, label: AnswerLabel) -> Result<SubmitOutcome> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(Command::Submit { label, reply }).await?;
        reply_rx.await.map_err(|_| BattleError::RuntimeStopped)?
    }

    pub async fn force_end(&self, reason: ForceEndReason) -> Result<()> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(Command::ForceEnd { reason, reply }).await?;
        reply_rx.await.map_err(|_| BattleError::RuntimeStopped)?
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Wait until the session reaches a terminal status
    pub async fn wait_for_terminal(&self) -> SessionSnapshot {
        let mut rx = self.snapshot_rx.clone();
        let reached = rx.wait_for(SessionSnapshot::is_terminal).await.map(|s| s.clone());
        match reached {
            Ok(snapshot) => snapshot,
            // Loop exited; the last value is the final one
            Err(_) => rx.borrow().clone(),
        }
    }

    /// Wait for the session loop to exit and return its final snapshot
    pub async fn join(mut self) -> Result<SessionSnapshot> {
        let Some(task) = self.task.take() else {
            return Err(BattleError::RuntimeStopped);
        };
        task.await.map_err(|_| BattleError::RuntimeStopped)
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.command_tx.send(command).await.map_err(|_| BattleError::RuntimeStopped)
    }
}
