/// Connectivity of the transport link to the device.
///
/// Owned and mutated exclusively by the transport; everything else observes
/// it read-only through a `watch` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No session. Initial state, and the terminal state after teardown.
    #[default]
    Disconnected,
    /// Handshake or reconnect attempt in progress.
    Connecting,
    Connected,
    /// A session exists but the device missed its heartbeat window.
    Degraded,
}

impl ConnectionState {
    /// A session exists; commands may be attempted. A degraded link still
    /// carries requests, they just risk timing out.
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Degraded
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Degraded => "DEGRADED",
        }
    }
}
