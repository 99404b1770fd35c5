use async_trait::async_trait;
use bytes::BytesMut;
use futures::{FutureExt, StreamExt};
use reqwest::Client;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::{broadcast, watch, Mutex, Notify, RwLock};
use tokio::time::{sleep, timeout, Duration};
use tokio_util::codec::Decoder;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::codec::FrameCodec;
use crate::commands::CommandRequest;
use crate::config::EndpointConfig;
use crate::error::TransportError;
use crate::events::{self, DeviceEvent};
use crate::models::{Ack, ControlAck};
use crate::state::ConnectionState;

/// Boundary to the physical device.
///
/// The wire format behind this trait is an implementation detail; the
/// contract is only that requests carry a monotonic sequence number, that an
/// acknowledgment (or device error) is distinguishable from a timeout, and
/// that inbound events form an infinite stream which survives reconnects.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the initial handshake and start the background session.
    ///
    /// A failure here is a configuration problem (bad address, device not
    /// on the network) and is surfaced immediately; no retry loop is
    /// started. After a successful connect, later connectivity loss is
    /// retried internally and reported only through `connection_state`.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Tear the session down. Idempotent.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Deliver one request and wait for the device's acknowledgment.
    /// Requests are serialized: at most one is in flight per endpoint.
    /// A request not acknowledged within the configured window fails with
    /// `CommandTimeout` and is never silently retried here; retrying is the
    /// dispatcher's decision.
    async fn send(&self, request: &CommandRequest) -> Result<Ack, TransportError>;

    /// Subscribe to the inbound event stream. Receivers may join at any
    /// time, including across reconnects.
    fn subscribe_events(&self) -> broadcast::Receiver<DeviceEvent>;

    /// Observe connectivity. Only the transport writes this.
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;
}

/// Outcome of one long-poll cycle against the event stream.
enum PollOutcome {
    /// Stream ended normally; re-poll immediately.
    Completed,
    /// No frame within the heartbeat window; the link is suspect.
    HeartbeatMissed,
}

/// Everything the background session task needs, detached from `self` so
/// the task owns its clones outright.
struct ManagerContext {
    client: Arc<Client>,
    config: EndpointConfig,
    controller_id: String,
    event_tx: broadcast::Sender<DeviceEvent>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    shutdown: Arc<Notify>,
}

/// HTTP implementation of [`Transport`] for the Storybutton's local web
/// frontend: a probe of the device root, a long-polled event stream of
/// length-prefixed JSON frames, and form-encoded commands with a JSON
/// acknowledgment body.
pub struct HttpTransport {
    client: Arc<Client>,
    config: EndpointConfig,
    controller_id: String,
    event_tx: broadcast::Sender<DeviceEvent>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    // Serializes the send path: one request in flight per endpoint
    send_gate: Mutex<()>,
    stop_signal: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    manager_task: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl HttpTransport {
    pub fn new(config: EndpointConfig) -> Self {
        let client = Arc::new(
            Client::builder()
                .timeout(config.request_timeout)
                .connect_timeout(config.request_timeout)
                .build()
                .unwrap_or_default(),
        );
        let (event_tx, _) = broadcast::channel(config.event_buffer_capacity);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        Self {
            client,
            config,
            controller_id: Uuid::new_v4().to_string(),
            event_tx,
            state_tx: Arc::new(state_tx),
            state_rx,
            send_gate: Mutex::new(()),
            stop_signal: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            manager_task: RwLock::new(None),
        }
    }

    /// Identity this controller announces to the device.
    pub fn controller_id(&self) -> &str {
        &self.controller_id
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }

    /// Reachability probe: a plain GET of the device root, the same check
    /// the device's own frontend performs.
    async fn probe(&self) -> Result<(), TransportError> {
        let response = self
            .client
            .get(self.config.base_url())
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TransportError::InvalidResponse(format!(
                "device probe returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn spawn_manager(&self) {
        let ctx = ManagerContext {
            client: self.client.clone(),
            config: self.config.clone(),
            controller_id: self.controller_id.clone(),
            event_tx: self.event_tx.clone(),
            state_tx: self.state_tx.clone(),
            shutdown: self.shutdown.clone(),
        };
        let stop_signal = self.stop_signal.clone();

        let handle = tokio::spawn(async move {
            info!(host = %ctx.config.host, "event stream manager started");
            let mut backoff = ctx.config.min_backoff;
            loop {
                if stop_signal.load(Ordering::Relaxed) {
                    break;
                }

                tokio::select! {
                    biased;

                    _ = ctx.shutdown.notified() => {
                        info!("event stream manager received shutdown notification");
                        break;
                    }

                    _ = async {
                        if stop_signal.load(Ordering::Relaxed) {
                            return;
                        }

                        // A degraded or failed link goes back through
                        // Connecting before the next poll attempt.
                        let _ = ctx.state_tx.send_if_modified(|prev| {
                            if *prev == ConnectionState::Connected {
                                false
                            } else {
                                *prev = ConnectionState::Connecting;
                                true
                            }
                        });

                        match Self::poll_event_stream(&ctx).await {
                            Ok(PollOutcome::Completed) => {
                                backoff = ctx.config.min_backoff;
                            }
                            Ok(PollOutcome::HeartbeatMissed) => {
                                warn!(
                                    "no frame within {:?}; marking link degraded",
                                    ctx.config.heartbeat_timeout
                                );
                                let _ = ctx.state_tx.send(ConnectionState::Degraded);
                                backoff = ctx.config.min_backoff;
                            }
                            Err(TransportError::ConnectionClosed) => {
                                // Shutdown requested mid-poll; outer loop exits next pass
                            }
                            Err(error) => {
                                warn!(%error, "transient connectivity failure on event stream");
                                let _ = ctx.state_tx.send(ConnectionState::Degraded);
                                let delay = backoff_with_jitter(backoff);
                                debug!("backing off for {:?}", delay);
                                tokio::select! {
                                    _ = sleep(delay) => {}
                                    _ = ctx.shutdown.notified() => { return; }
                                }
                                backoff = (backoff * 2).min(ctx.config.max_backoff);
                            }
                        }
                    } => {}
                }
            }

            let _ = ctx.state_tx.send_replace(ConnectionState::Disconnected);
            info!("event stream manager stopped");
        });

        let mut task_guard = self.manager_task.write().await;
        *task_guard = Some(handle);
    }

    /// One long-poll of the event stream: open the request, decode frames
    /// until the server ends the cycle, the heartbeat window lapses, or
    /// shutdown is requested.
    async fn poll_event_stream(ctx: &ManagerContext) -> Result<PollOutcome, TransportError> {
        let url = format!("{}/api/events", ctx.config.base_url());
        let params = [("controller", ctx.controller_id.as_str())];

        trace!(%url, "opening event stream");
        let response_result = tokio::select! {
            biased;
            _ = ctx.shutdown.notified() => {
                return Err(TransportError::ConnectionClosed);
            }
            res = ctx.client
                .get(&url)
                .query(&params)
                .timeout(ctx.config.long_poll_timeout)
                .send() => res,
        };
        // Network-level failures here are recoverable; the manager absorbs
        // them into the backoff loop
        let response =
            response_result.map_err(|e| TransportError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::InvalidResponse(format!(
                "event stream returned {}",
                response.status()
            )));
        }

        let _ = ctx.state_tx.send_if_modified(|prev| {
            if *prev == ConnectionState::Connected {
                false
            } else {
                *prev = ConnectionState::Connected;
                true
            }
        });
        debug!("event stream open");

        let mut stream = response.bytes_stream();
        let mut codec = FrameCodec::new();
        let mut buffer = BytesMut::with_capacity(ctx.config.streaming_buffer_capacity);

        loop {
            tokio::select! {
                biased;

                _ = ctx.shutdown.notified() => {
                    return Err(TransportError::ConnectionClosed);
                }

                maybe_chunk = timeout(ctx.config.heartbeat_timeout, stream.next()) => {
                    match maybe_chunk {
                        Ok(Some(Ok(chunk))) => {
                            if chunk.is_empty() {
                                continue;
                            }
                            buffer.extend_from_slice(&chunk);
                            while let Some(frame) = codec.decode(&mut buffer)? {
                                let event = events::parse_frame(&frame);
                                trace!(event = event.event_type(), "decoded device event");
                                let _ = ctx.event_tx.send(event);
                            }
                        }
                        Ok(Some(Err(error))) => {
                            if error.is_timeout() {
                                debug!("event stream request timed out; re-polling");
                                return Ok(PollOutcome::Completed);
                            }
                            return Err(TransportError::Transient(error.to_string()));
                        }
                        Ok(None) => {
                            debug!("event stream closed by device; re-polling");
                            return Ok(PollOutcome::Completed);
                        }
                        Err(_) => {
                            return Ok(PollOutcome::HeartbeatMissed);
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.manager_task.read().await.is_some() {
            debug!("connect called while session already active");
            return Ok(());
        }

        info!(host = %self.config.host, "connecting to device");
        if self.config.host.trim().is_empty() {
            return Err(TransportError::Configuration(
                "endpoint host is empty".to_string(),
            ));
        }

        self.stop_signal.store(false, Ordering::SeqCst);
        // Drain any shutdown permit left over from a previous teardown
        while self.shutdown.notified().now_or_never().is_some() {}
        let _ = self.state_tx.send(ConnectionState::Connecting);

        match self.probe().await {
            Ok(()) => {
                let _ = self.state_tx.send(ConnectionState::Connected);
                self.spawn_manager().await;
                info!("device reachable, session started");
                Ok(())
            }
            Err(error) => {
                let _ = self.state_tx.send(ConnectionState::Disconnected);
                error!(%error, "initial probe failed");
                Err(TransportError::Configuration(format!(
                    "device at {} is not reachable: {}",
                    self.config.host, error
                )))
            }
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        info!(host = %self.config.host, "disconnecting from device");
        self.stop_signal.store(true, Ordering::SeqCst);
        // notify_one stores a permit, so the manager wakes even if it was
        // not parked on the notification yet
        self.shutdown.notify_one();

        let handle = {
            let mut task_guard = self.manager_task.write().await;
            task_guard.take()
        };
        if let Some(handle) = handle {
            handle.await?;
        }

        let _ = self.state_tx.send_replace(ConnectionState::Disconnected);
        Ok(())
    }

    async fn send(&self, request: &CommandRequest) -> Result<Ack, TransportError> {
        let state = *self.state_rx.borrow();
        if !state.is_connected() {
            warn!(state = state.as_str(), seq = request.seq, "send attempted without a session");
            return Err(TransportError::NotConnected);
        }

        let _gate = self.send_gate.lock().await;

        let body = serde_urlencoded::to_string(request.form_fields())?;
        debug!(cmd = request.intent.name(), seq = request.seq, "sending command");

        let timeout_err = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::CommandTimeout {
                    seq: request.seq,
                    timeout: self.config.ack_timeout,
                }
            } else {
                TransportError::RequestFailed(e)
            }
        };

        let response = self
            .client
            .post(self.endpoint("/api/control"))
            .query(&[("controller", self.controller_id.as_str())])
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .timeout(self.config.ack_timeout)
            .send()
            .await
            .map_err(timeout_err)?;

        if !response.status().is_success() {
            return Err(TransportError::InvalidResponse(format!(
                "command '{}' failed with status {}",
                request.intent.name(),
                response.status()
            )));
        }

        let ack: ControlAck = response.json().await.map_err(timeout_err)?;
        if ack.is_success() {
            trace!(seq = request.seq, "command acknowledged");
            Ok(Ack::Applied { seq: request.seq })
        } else {
            Err(TransportError::Rejected {
                seq: request.seq,
                reason: ack
                    .error
                    .unwrap_or_else(|| "unspecified device error".to_string()),
            })
        }
    }

    fn subscribe_events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.event_tx.subscribe()
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        // Signal only; drop must not block on the manager task
        self.stop_signal.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }
}

/// Backoff delay with +/-30% jitter so a fleet of controllers does not
/// hammer a recovering device in lockstep.
fn backoff_with_jitter(base: Duration) -> Duration {
    let jitter_factor = rand::random::<f32>() * 0.6 - 0.3;
    let jitter = base.mul_f32(jitter_factor.abs());
    if jitter_factor >= 0.0 {
        base + jitter
    } else {
        base - jitter
    }
}
