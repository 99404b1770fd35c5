use std::{env, time::Duration};

/// Per-endpoint configuration: the device address plus every tunable the
/// transport and reconciler consume. One value per configured device, no
/// process-wide state; `from_env` merges environment overrides into the
/// defaults for deployments that tune without recompiling.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Host or host:port of the device on the local network.
    pub host: String,
    /// Optional display name; the device's own name is used when absent.
    pub friendly_name: Option<String>,
    /// Timeout for the initial probe and plain HTTP requests.
    pub request_timeout: Duration,
    /// How long to wait for a command acknowledgment before reporting a
    /// timeout to the dispatcher.
    pub ack_timeout: Duration,
    /// Overall timeout for one long-poll of the event stream.
    pub long_poll_timeout: Duration,
    /// Event-stream silence tolerated before the link is considered degraded.
    pub heartbeat_timeout: Duration,
    /// Silence tolerated before the visible snapshot becomes unreachable.
    pub freshness_window: Duration,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub event_buffer_capacity: usize,
    pub streaming_buffer_capacity: usize,
}

impl EndpointConfig {
    pub fn new(host: impl Into<String>) -> Self {
        EndpointConfig {
            host: host.into(),
            friendly_name: None,
            // The device frontend answers slowly while switching episodes;
            // 3s matches what it needs in practice.
            request_timeout: Duration::from_secs(3),
            ack_timeout: Duration::from_secs(5),
            long_poll_timeout: Duration::from_secs(300),
            heartbeat_timeout: Duration::from_secs(32),
            freshness_window: Duration::from_secs(45),
            min_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            event_buffer_capacity: 100,
            streaming_buffer_capacity: 16 * 1024,
        }
    }

    /// Defaults overridden by `STORYBUTTON_*` environment variables
    /// (a `.env` file is honored when present).
    pub fn from_env(host: impl Into<String>) -> Self {
        let _ = dotenvy::dotenv();

        fn parse_usize(var: &str, default: usize) -> usize {
            env::var(var)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        fn parse_secs(var: &str, default: Duration) -> Duration {
            env::var(var)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        }

        fn parse_millis(var: &str, default: Duration) -> Duration {
            env::var(var)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        }

        let defaults = Self::new(host);
        EndpointConfig {
            request_timeout: parse_secs(
                "STORYBUTTON_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout,
            ),
            ack_timeout: parse_secs("STORYBUTTON_ACK_TIMEOUT_SECS", defaults.ack_timeout),
            long_poll_timeout: parse_secs(
                "STORYBUTTON_LONG_POLL_TIMEOUT_SECS",
                defaults.long_poll_timeout,
            ),
            heartbeat_timeout: parse_secs(
                "STORYBUTTON_HEARTBEAT_TIMEOUT_SECS",
                defaults.heartbeat_timeout,
            ),
            freshness_window: parse_secs(
                "STORYBUTTON_FRESHNESS_WINDOW_SECS",
                defaults.freshness_window,
            ),
            min_backoff: parse_millis("STORYBUTTON_MIN_BACKOFF_MS", defaults.min_backoff),
            max_backoff: parse_secs("STORYBUTTON_MAX_BACKOFF_SECS", defaults.max_backoff),
            event_buffer_capacity: parse_usize(
                "STORYBUTTON_EVENT_BUFFER_CAPACITY",
                defaults.event_buffer_capacity,
            ),
            streaming_buffer_capacity: parse_usize(
                "STORYBUTTON_STREAMING_BUFFER_CAPACITY",
                defaults.streaming_buffer_capacity,
            ),
            ..defaults
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.host)
    }
}
