use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::commands::{CommandIntent, CommandRequest};
use crate::error::{DispatchError, TransportError};
use crate::models::{Ack, PlaybackStatus, Snapshot};
use crate::transport::Transport;

/// Turns user intents into device-bound requests for one endpoint.
///
/// All callers are funneled through a fair ordering gate: two rapid
/// `issue` calls reach the device in call order and never concurrently.
/// Each request carries a client-monotonic sequence number; an
/// unacknowledged request is retried exactly once with the same number,
/// and a second miss surfaces as [`DispatchError::Unreachable`].
pub struct CommandDispatcher {
    transport: Arc<dyn Transport>,
    snapshots: watch::Receiver<Snapshot>,
    next_seq: AtomicU64,
    order_gate: Mutex<()>,
}

impl CommandDispatcher {
    pub fn new(transport: Arc<dyn Transport>, snapshots: watch::Receiver<Snapshot>) -> Self {
        CommandDispatcher {
            transport,
            snapshots,
            next_seq: AtomicU64::new(1),
            order_gate: Mutex::new(()),
        }
    }

    /// Issue a user intent and wait for the device's acknowledgment.
    ///
    /// Intents already satisfied by the current snapshot (play while
    /// playing, pause while paused) acknowledge as [`Ack::NoOp`] without a
    /// device round trip.
    ///
    /// Dropping the returned future before the ack abandons the exchange.
    /// The device applies each sequence number at most once, so a command
    /// that landed anyway leaves the device where the caller asked, and the
    /// next status report reconciles the snapshot.
    pub async fn issue(&self, intent: CommandIntent) -> Result<Ack, DispatchError> {
        let _gate = self.order_gate.lock().await;

        // Validated under the gate so our own in-flight commands cannot
        // race the check.
        if let Some(ack) = self.short_circuit(&intent) {
            debug!(cmd = intent.name(), "intent already satisfied, not forwarded");
            return Ok(ack);
        }

        let request = CommandRequest::new(self.next_seq.fetch_add(1, Ordering::SeqCst), intent);
        match self.transport.send(&request).await {
            Ok(ack) => Ok(ack),
            Err(error) if error.is_retryable() => {
                warn!(
                    cmd = request.intent.name(),
                    seq = request.seq,
                    %error,
                    "no acknowledgment, retrying once with the same sequence number"
                );
                match self.transport.send(&request).await {
                    Ok(ack) => Ok(ack),
                    Err(retry_error) if retry_error.is_retryable() => {
                        warn!(
                            cmd = request.intent.name(),
                            seq = request.seq,
                            "retry exhausted, device unreachable"
                        );
                        Err(DispatchError::Unreachable)
                    }
                    Err(retry_error) => Err(Self::map_terminal(retry_error)),
                }
            }
            Err(error) => Err(Self::map_terminal(error)),
        }
    }

    fn map_terminal(error: TransportError) -> DispatchError {
        match error {
            TransportError::Rejected { reason, .. } => DispatchError::Rejected(reason),
            other => DispatchError::Transport(other),
        }
    }

    /// Idempotence check against the current snapshot. Skipped while the
    /// state is unreachable: a stale snapshot proves nothing about the
    /// device, so the command goes out and the device decides.
    fn short_circuit(&self, intent: &CommandIntent) -> Option<Ack> {
        let snapshot = self.snapshots.borrow();
        if snapshot.status == PlaybackStatus::Unreachable {
            return None;
        }
        match intent {
            CommandIntent::Play if snapshot.is_playing() => Some(Ack::NoOp),
            CommandIntent::Pause if snapshot.is_paused() => Some(Ack::NoOp),
            CommandIntent::Mute if snapshot.muted => Some(Ack::NoOp),
            CommandIntent::Unmute if !snapshot.muted => Some(Ack::NoOp),
            _ => None,
        }
    }
}
