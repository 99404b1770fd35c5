use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::events::DeviceEvent;
use crate::models::{PlaybackStatus, Snapshot, VolumeLevel};
use crate::state::ConnectionState;

/// Owns the externally visible playback state for one endpoint.
///
/// Single-writer: only this type constructs snapshots, and every update is
/// swapped in whole through a `watch` channel, so a reader can never see
/// metadata from one report paired with the volume of another. Events are
/// applied in arrival order; when reports carry a device-side sequence
/// number, duplicates and reordered stragglers are dropped.
pub struct StateReconciler {
    snapshot_tx: watch::Sender<Snapshot>,
    inner: Mutex<ReconcilerInner>,
}

struct ReconcilerInner {
    last_event_at: Option<Instant>,
    last_device_seq: Option<u64>,
}

impl StateReconciler {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(Snapshot::unreachable());
        StateReconciler {
            snapshot_tx,
            inner: Mutex::new(ReconcilerInner {
                last_event_at: None,
                last_device_seq: None,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn current_snapshot(&self) -> Snapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Merge one inbound event and return the snapshot now current.
    ///
    /// A full status report replaces the snapshot wholesale; a volume
    /// report replaces only the volume group (still as a whole-snapshot
    /// swap); heartbeats refresh freshness without touching state.
    pub fn apply_event(&self, event: DeviceEvent) -> Snapshot {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(seq) = event.device_seq() {
                if let Some(last) = inner.last_device_seq {
                    if seq <= last {
                        trace!(seq, last, "dropping duplicate or out-of-order report");
                        return self.current_snapshot();
                    }
                }
                inner.last_device_seq = Some(seq);
            }
            inner.last_event_at = Some(Instant::now());
        }

        match event {
            DeviceEvent::Status(report) => {
                // The device flags `result: "fail"` while switching
                // episodes; such a report carries no usable playback state.
                if report.is_failure() {
                    debug!("device report flagged failure; keeping current state");
                    return self.current_snapshot();
                }
                let next = Snapshot {
                    status: report.status(),
                    track: report.track(),
                    volume: VolumeLevel::clamped(report.volume_value()),
                    muted: report.is_muted(),
                    connection: self.snapshot_tx.borrow().connection,
                };
                trace!(status = next.status.as_str(), volume = next.volume.get(), "applied status report");
                self.snapshot_tx.send_replace(next.clone());
                next
            }
            DeviceEvent::VolumeChanged(report) => {
                let mut next = self.current_snapshot();
                next.volume = VolumeLevel::clamped(report.volume_value());
                next.muted = report.is_muted();
                // A volume report says nothing about playback, so it does
                // not clear an unreachable status on its own.
                self.snapshot_tx.send_replace(next.clone());
                next
            }
            DeviceEvent::Heartbeat | DeviceEvent::Unknown(_) => self.current_snapshot(),
        }
    }

    /// Record a connectivity observation. Losing the session makes the
    /// visible status unreachable until a fresh report proves otherwise.
    pub fn set_connection(&self, state: ConnectionState) {
        self.snapshot_tx.send_if_modified(|snapshot| {
            if snapshot.connection == state {
                return false;
            }
            snapshot.connection = state;
            if state == ConnectionState::Disconnected {
                snapshot.status = PlaybackStatus::Unreachable;
            }
            true
        });
    }

    /// True when no event has arrived within `window`.
    pub fn is_stale(&self, window: Duration) -> bool {
        let inner = self.inner.lock().unwrap();
        match inner.last_event_at {
            Some(at) => at.elapsed() >= window,
            None => true,
        }
    }

    /// Force the visible status to `Unreachable`, keeping the last known
    /// track and volume for display. The next valid report restores a
    /// concrete state.
    pub fn mark_stale(&self) {
        self.snapshot_tx.send_if_modified(|snapshot| {
            if snapshot.status == PlaybackStatus::Unreachable {
                return false;
            }
            warn!("no device report within the freshness window; state is unreachable");
            snapshot.status = PlaybackStatus::Unreachable;
            true
        });
    }
}

impl Default for StateReconciler {
    fn default() -> Self {
        Self::new()
    }
}
