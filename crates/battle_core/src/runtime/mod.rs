//! Battle runtime
//!
//! Drives a [`SessionController`] from a single Tokio task. UI commands,
//! realtime envelopes and clock ticks are multiplexed with `select!` and
//! applied one at a time, so the controller never sees concurrent input.
//!
//! ```text
//!  BattleHandle ──commands──▶ ┌──────────────┐ ──publish──▶ RealtimeChannel
//!  RealtimeChannel ─inbound─▶ │ session loop │
//!  interval ───────ticks────▶ └──────────────┘ ──watch────▶ SessionSnapshot
//! ```

pub mod handle;

pub use handle::BattleHandle;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::channel::{ChannelEnvelope, RealtimeChannel};
use crate::error::{BattleError, Result};
use crate::question::AnswerLabel;
use crate::session::{
    BattleStatus, ForceEndReason, SessionController, SessionSnapshot, Side, SubmitOutcome,
};

/// Pending commands per session
pub const COMMAND_CAPACITY: usize = 32;

/// Tick period matching the one-second round clock
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub(crate) enum Command {
    Ready { reply: oneshot::Sender<Result<()>> },
    Submit { label: AnswerLabel, reply: oneshot::Sender<Result<SubmitOutcome>> },
    ForceEnd { reason: ForceEndReason, reply: oneshot::Sender<Result<()>> },
}

/// Spawns session loops
#[derive(Debug, Clone, Copy, Default)]
pub struct BattleRuntime;

impl BattleRuntime {
    /// Spawn the loop for a started session.
    ///
    /// Live sessions subscribe to `channel` here and need one; bot sessions
    /// ignore it. Must be called from within a Tokio runtime.
    pub fn launch(
        controller: SessionController,
        channel: Option<Arc<dyn RealtimeChannel>>,
        tick: Duration,
    ) -> Result<BattleHandle> {
        if tick.is_zero() {
            return Err(BattleError::Configuration("tick period must be non-zero".to_string()));
        }

        let status = controller.status();
        if status == BattleStatus::Idle || status.is_terminal() {
            return Err(BattleError::InvalidState { operation: "launch a battle", status });
        }

        let inbound = match (&channel, controller.is_live()) {
            (Some(channel), true) => Some(channel.subscribe(controller.id())?),
            (None, true) => {
                return Err(BattleError::Configuration(
                    "live battles need a realtime channel".to_string(),
                ));
            }
            (_, false) => None,
        };

        let session_id = controller.id();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(controller.snapshot());

        info!(%session_id, live = inbound.is_some(), tick_ms = tick.as_millis() as u64, "Launching battle loop");

        let task = tokio::spawn(run(controller, command_rx, inbound, channel, snapshot_tx, tick));
        Ok(BattleHandle::new(session_id, command_tx, snapshot_rx, task))
    }
}

async fn run(
    mut controller: SessionController,
    mut commands: mpsc::Receiver<Command>,
    mut inbound: Option<mpsc::Receiver<ChannelEnvelope>>,
    channel: Option<Arc<dyn RealtimeChannel>>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    tick: Duration,
) -> SessionSnapshot {
    let mut ticker = time::interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    flush(&mut controller, channel.as_deref(), &snapshot_tx);

    while !controller.is_terminal() {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => apply(&mut controller, command),
                None => {
                    info!(session_id = %controller.id(), "Handle dropped, abandoning battle");
                    if let Err(err) = controller.force_end(ForceEndReason::PlayerAbandoned) {
                        warn!(session_id = %controller.id(), "Could not end battle: {err}");
                        break;
                    }
                }
            },
            envelope = next_inbound(&mut inbound) => match envelope {
                Some(envelope) => {
                    controller.handle_channel(envelope);
                }
                None => {
                    inbound = None;
                    controller.channel_lost();
                }
            },
            _ = ticker.tick() => controller.tick(),
        }

        flush(&mut controller, channel.as_deref(), &snapshot_tx);
    }

    debug!(session_id = %controller.id(), status = %controller.status(), "Battle loop finished");
    controller.snapshot()
}

async fn next_inbound(inbound: &mut Option<mpsc::Receiver<ChannelEnvelope>>) -> Option<ChannelEnvelope> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn apply(controller: &mut SessionController, command: Command) {
    // A dropped reply receiver only means the caller stopped waiting
    match command {
        Command::Ready { reply } => {
            let _ = reply.send(controller.mark_ready(Side::Player));
        }
        Command::Submit { label, reply } => {
            let _ = reply.send(controller.submit_answer(Side::Player, label));
        }
        Command::ForceEnd { reason, reply } => {
            let _ = reply.send(controller.force_end(reason));
        }
    }
}

fn flush(
    controller: &mut SessionController,
    channel: Option<&dyn RealtimeChannel>,
    snapshot_tx: &watch::Sender<SessionSnapshot>,
) {
    for envelope in controller.take_outbound() {
        let Some(channel) = channel else {
            continue;
        };
        if let Err(err) = channel.publish(envelope) {
            warn!(session_id = %controller.id(), "Failed to publish to channel: {err}");
        }
    }

    let snapshot = controller.snapshot();
    snapshot_tx.send_if_modified(|current| {
        if *current == snapshot {
            return false;
        }
        *current = snapshot;
        true
    });
}
