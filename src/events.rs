use tracing::{debug, warn};

use crate::models::{StatusReport, VolumeReport};

/// Typed inbound events decoded from the device's event stream.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Status(StatusReport),
    VolumeChanged(VolumeReport),
    /// Liveness frame with no payload.
    Heartbeat,
    /// A frame we could not interpret, kept verbatim for logging.
    Unknown(String),
}

impl DeviceEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DeviceEvent::Status(_) => "status",
            DeviceEvent::VolumeChanged(_) => "volume",
            DeviceEvent::Heartbeat => "heartbeat",
            DeviceEvent::Unknown(_) => "unknown",
        }
    }

    /// Device-side report counter, when the frame carries one. Used by the
    /// reconciler to drop duplicate and out-of-order reports.
    pub fn device_seq(&self) -> Option<u64> {
        match self {
            DeviceEvent::Status(report) => report.seq,
            DeviceEvent::VolumeChanged(report) => report.seq,
            _ => None,
        }
    }
}

/// Interpret one decoded frame. Frames are JSON objects with a `kind`
/// discriminator; anything malformed or unrecognized becomes `Unknown`
/// rather than killing the stream.
pub fn parse_frame(frame: &str) -> DeviceEvent {
    let value: serde_json::Value = match serde_json::from_str(frame) {
        Ok(value) => value,
        Err(error) => {
            warn!(%error, "discarding frame that is not valid JSON");
            return DeviceEvent::Unknown(frame.to_string());
        }
    };

    let kind = value.get("kind").and_then(|k| k.as_str()).unwrap_or("");
    match kind {
        "status" => match serde_json::from_value::<StatusReport>(value.clone()) {
            Ok(report) => DeviceEvent::Status(report),
            Err(error) => {
                warn!(%error, "malformed status frame");
                DeviceEvent::Unknown(frame.to_string())
            }
        },
        "volume" => match serde_json::from_value::<VolumeReport>(value.clone()) {
            Ok(report) => DeviceEvent::VolumeChanged(report),
            Err(error) => {
                warn!(%error, "malformed volume frame");
                DeviceEvent::Unknown(frame.to_string())
            }
        },
        "heartbeat" => DeviceEvent::Heartbeat,
        other => {
            debug!(kind = other, "unrecognized event kind");
            DeviceEvent::Unknown(frame.to_string())
        }
    }
}
