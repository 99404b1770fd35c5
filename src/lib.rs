mod codec;
pub use codec::FrameCodec;
mod commands;
pub use commands::{CommandIntent, CommandRequest};
mod config;
pub use config::EndpointConfig;
mod dispatcher;
pub use dispatcher::CommandDispatcher;
mod error;
pub use error::{DispatchError, TransportError};
mod events;
pub use events::{parse_frame, DeviceEvent};
mod models;
pub use models::{
    Ack, ControlAck, PlaybackStatus, Snapshot, StatusReport, TrackMetadata, VolumeLevel,
    VolumeReport,
};
mod reconciler;
pub use reconciler::StateReconciler;
mod state;
pub use state::ConnectionState;
mod transport;
pub use transport::{HttpTransport, Transport};
mod utils;
pub use utils::parsing::DeviceValueParser;

use futures::FutureExt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::{broadcast, watch, Notify, RwLock};
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Client for one Storybutton podcast player on the local network.
///
/// The client keeps a continuously reconciled [`Snapshot`] of the device
/// (playback status, current episode, volume, connectivity) and dispatches
/// playback commands to it. One client per configured device; construct
/// another for another endpoint.
///
/// # Logging
///
/// This library uses the `tracing` crate for logging. To enable logs,
/// initialize a tracing subscriber in your application.
///
/// Example using `tracing_subscriber`:
/// ```no_run
/// use tracing::Level;
/// use tracing_subscriber::FmtSubscriber;
///
/// let subscriber = FmtSubscriber::builder()
///     .with_max_level(Level::DEBUG)
///     .finish();
///
/// tracing::subscriber::set_global_default(subscriber)
///     .expect("Failed to set tracing subscriber");
/// ```
pub struct StorybuttonClient {
    transport: Arc<HttpTransport>,
    reconciler: Arc<StateReconciler>,
    dispatcher: CommandDispatcher,
    config: EndpointConfig,
    stop_signal: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    feed_task: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl StorybuttonClient {
    pub fn new(config: EndpointConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(config.clone()));
        let reconciler = Arc::new(StateReconciler::new());
        let dispatcher = CommandDispatcher::new(
            transport.clone() as Arc<dyn Transport>,
            reconciler.subscribe(),
        );

        Self {
            transport,
            reconciler,
            dispatcher,
            config,
            stop_signal: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            feed_task: RwLock::new(None),
        }
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Display name configured for this endpoint, when one was provided.
    pub fn friendly_name(&self) -> Option<&str> {
        self.config.friendly_name.as_deref()
    }

    /// Identity this controller announces to the device.
    pub fn controller_id(&self) -> &str {
        self.transport.controller_id()
    }

    /// Subscribe to snapshot updates. Each received value is one
    /// atomically-consistent read; the channel always holds the current
    /// snapshot, so new subscribers see state immediately.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.reconciler.subscribe()
    }

    pub fn current_snapshot(&self) -> Snapshot {
        self.reconciler.current_snapshot()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.transport.connection_state().borrow()
    }

    /// Connect to the device and start background synchronization.
    ///
    /// An unreachable or misconfigured endpoint fails here with
    /// [`TransportError::Configuration`]; no retry loop is started in that
    /// case. After a successful connect, connectivity loss is handled
    /// internally with backoff and only shows up as snapshot observations.
    pub async fn connect(&self) -> Result<(), TransportError> {
        self.stop_signal.store(false, Ordering::SeqCst);
        // Drain any shutdown permit left over from a previous teardown
        while self.shutdown.notified().now_or_never().is_some() {}
        self.transport.connect().await?;
        self.spawn_feed_task().await;
        Ok(())
    }

    /// Stop background synchronization and tear the session down.
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        info!(host = %self.config.host, "disconnecting client");
        self.stop_signal.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();

        let handle = {
            let mut task_guard = self.feed_task.write().await;
            task_guard.take()
        };
        if let Some(handle) = handle {
            handle.await?;
        }

        self.transport.disconnect().await?;
        self.reconciler.set_connection(ConnectionState::Disconnected);
        Ok(())
    }

    /// Issue a playback intent. See [`CommandDispatcher::issue`].
    pub async fn issue(&self, intent: CommandIntent) -> Result<Ack, DispatchError> {
        self.dispatcher.issue(intent).await
    }

    /// Pump transport events into the reconciler and watch freshness.
    async fn spawn_feed_task(&self) {
        let mut task_guard = self.feed_task.write().await;
        if task_guard.is_some() {
            return;
        }

        let mut events = self.transport.subscribe_events();
        let mut connection = self.transport.connection_state();
        let reconciler = self.reconciler.clone();
        let freshness_window = self.config.freshness_window;
        let shutdown = self.shutdown.clone();
        let stop_signal = self.stop_signal.clone();

        let handle = tokio::spawn(async move {
            let tick = (freshness_window / 4).max(Duration::from_millis(250));
            let mut watchdog = tokio::time::interval(tick);
            watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if stop_signal.load(Ordering::Relaxed) {
                    break;
                }

                tokio::select! {
                    biased;

                    _ = shutdown.notified() => {
                        break;
                    }

                    changed = connection.changed() => {
                        match changed {
                            Ok(()) => {
                                let state = *connection.borrow_and_update();
                                reconciler.set_connection(state);
                            }
                            Err(_) => break,
                        }
                    }

                    event = events.recv() => {
                        match event {
                            Ok(event) => {
                                reconciler.apply_event(event);
                            }
                            Err(broadcast::error::RecvError::Lagged(missed)) => {
                                warn!(missed, "event feed lagged, stale reports dropped");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }

                    _ = watchdog.tick() => {
                        if reconciler.is_stale(freshness_window) {
                            reconciler.mark_stale();
                        }
                    }
                }
            }
            debug!("event feed task stopped");
        });

        *task_guard = Some(handle);
    }

    // --- Command wrappers ---

    pub async fn play(&self) -> Result<Ack, DispatchError> {
        self.issue(CommandIntent::Play).await
    }

    pub async fn pause(&self) -> Result<Ack, DispatchError> {
        self.issue(CommandIntent::Pause).await
    }

    /// The device has no distinct stop verb; stop is delivered as a pause.
    pub async fn stop(&self) -> Result<Ack, DispatchError> {
        self.issue(CommandIntent::Pause).await
    }

    pub async fn next(&self) -> Result<Ack, DispatchError> {
        self.issue(CommandIntent::Next).await
    }

    pub async fn previous(&self) -> Result<Ack, DispatchError> {
        self.issue(CommandIntent::Previous).await
    }

    /// Set the volume; the requested value is clamped to [0, 100].
    pub async fn set_volume(&self, level: i32) -> Result<Ack, DispatchError> {
        self.issue(CommandIntent::set_volume(level)).await
    }

    /// Raise the volume one step. At the top of the range this is a no-op
    /// that does not contact the device.
    pub async fn volume_up(&self) -> Result<VolumeLevel, DispatchError> {
        let current = self.current_snapshot().volume;
        if current >= VolumeLevel::MAX {
            return Ok(current);
        }
        let next = i32::from(current.get()) + 1;
        self.issue(CommandIntent::set_volume(next)).await?;
        Ok(VolumeLevel::clamped(next))
    }

    /// Lower the volume one step. At the bottom of the range this is a
    /// no-op that does not contact the device.
    pub async fn volume_down(&self) -> Result<VolumeLevel, DispatchError> {
        let current = self.current_snapshot().volume;
        if current <= VolumeLevel::MIN {
            return Ok(current);
        }
        let next = i32::from(current.get()) - 1;
        self.issue(CommandIntent::set_volume(next)).await?;
        Ok(VolumeLevel::clamped(next))
    }

    pub async fn mute(&self) -> Result<Ack, DispatchError> {
        self.issue(CommandIntent::Mute).await
    }

    pub async fn unmute(&self) -> Result<Ack, DispatchError> {
        self.issue(CommandIntent::Unmute).await
    }
}

impl std::fmt::Debug for StorybuttonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorybuttonClient")
            .field("host", &self.config.host)
            .field("controller_id", &self.transport.controller_id())
            .finish()
    }
}

impl Drop for StorybuttonClient {
    fn drop(&mut self) {
        // Signal only; the transport's own Drop stops its manager task
        self.stop_signal.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }
}
