use serde::Deserialize;

use crate::state::ConnectionState;
use crate::utils::parsing::DeviceValueParser;

/// Playback state as reported by the device, plus the synthetic
/// `Unreachable` used when the device has gone silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
    Buffering,
    /// No fresh report within the freshness window, or no session at all.
    Unreachable,
}

impl PlaybackStatus {
    /// Map the device's `chStatus` string. The frontend prefixes the value
    /// with `"Play state: "`; anything unrecognized is treated as stopped.
    pub fn from_report(raw: &str) -> Self {
        let value = raw.strip_prefix("Play state: ").unwrap_or(raw);
        match value {
            "playing" => PlaybackStatus::Playing,
            "paused" => PlaybackStatus::Paused,
            "buffering" => PlaybackStatus::Buffering,
            _ => PlaybackStatus::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackStatus::Stopped => "STOPPED",
            PlaybackStatus::Playing => "PLAYING",
            PlaybackStatus::Paused => "PAUSED",
            PlaybackStatus::Buffering => "BUFFERING",
            PlaybackStatus::Unreachable => "UNREACHABLE",
        }
    }
}

/// Volume in [0, 100]. Construction clamps, so a `VolumeLevel` is in range
/// by definition; out-of-range device reports never propagate raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct VolumeLevel(u8);

impl VolumeLevel {
    pub const MIN: VolumeLevel = VolumeLevel(0);
    pub const MAX: VolumeLevel = VolumeLevel(100);

    pub fn clamped(raw: i32) -> Self {
        VolumeLevel(raw.clamp(0, 100) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for VolumeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What is playing right now. Replaced wholesale on each update, never
/// patched field by field.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    /// Seconds; `None` when the device does not report it.
    pub duration: Option<f64>,
    pub position: Option<f64>,
}

impl TrackMetadata {
    pub fn progress_percentage(&self) -> Option<f64> {
        match (self.position, self.duration) {
            (Some(position), Some(duration)) if duration > 0.0 => {
                Some((position / duration) * 100.0)
            }
            _ => None,
        }
    }
}

/// One atomically-consistent read of the device: status, track, volume and
/// connectivity all from the same instant. Exactly one snapshot is current
/// at any time; observers receive whole snapshots, never partial updates.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub status: PlaybackStatus,
    pub track: Option<TrackMetadata>,
    pub volume: VolumeLevel,
    pub muted: bool,
    pub connection: ConnectionState,
}

impl Snapshot {
    /// Starting state: nothing known until the first successful handshake.
    pub fn unreachable() -> Self {
        Snapshot {
            status: PlaybackStatus::Unreachable,
            track: None,
            volume: VolumeLevel::MIN,
            muted: false,
            connection: ConnectionState::Disconnected,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.status == PlaybackStatus::Paused
    }
}

/// Device confirmation for an issued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// The device acknowledged the request with this sequence number.
    Applied { seq: u64 },
    /// The intent was already satisfied; nothing was sent to the device.
    NoOp,
}

/// Full status report from the device's event stream.
///
/// The frontend speaks in strings ("Play state: playing", numeric values
/// quoted), so every field is lenient: missing keys default and malformed
/// numerics parse to zero.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusReport {
    /// Episode title.
    #[serde(default)]
    pub name: String,
    #[serde(rename = "chStatus", default)]
    pub ch_status: String,
    #[serde(default)]
    pub volume: String,
    #[serde(default)]
    pub muted: String,
    /// Seconds into the current episode.
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub duration: String,
    /// Device-side report counter, when the firmware provides one.
    #[serde(default)]
    pub seq: Option<u64>,
    #[serde(default)]
    pub result: String,
}

impl StatusReport {
    pub fn status(&self) -> PlaybackStatus {
        PlaybackStatus::from_report(&self.ch_status)
    }

    pub fn volume_value(&self) -> i32 {
        <str as DeviceValueParser>::parse_int(&self.volume)
    }

    pub fn is_muted(&self) -> bool {
        <str as DeviceValueParser>::parse_bool(&self.muted)
    }

    pub fn position_value(&self) -> f64 {
        <str as DeviceValueParser>::parse_float(&self.position)
    }

    pub fn duration_value(&self) -> f64 {
        <str as DeviceValueParser>::parse_float(&self.duration)
    }

    /// Reports carry `result: "fail"` while the device is between episodes.
    pub fn is_failure(&self) -> bool {
        self.result == "fail"
    }

    pub fn track(&self) -> Option<TrackMetadata> {
        if self.name.is_empty() {
            return None;
        }
        let duration = self.duration_value();
        let position = self.position_value();
        Some(TrackMetadata {
            title: self.name.clone(),
            duration: (duration > 0.0).then_some(duration),
            position: (!self.position.is_empty()).then_some(position),
        })
    }
}

/// Volume-only report; arrives when the physical knob moves.
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeReport {
    #[serde(default)]
    pub volume: String,
    #[serde(default)]
    pub muted: String,
    #[serde(default)]
    pub seq: Option<u64>,
}

impl VolumeReport {
    pub fn volume_value(&self) -> i32 {
        <str as DeviceValueParser>::parse_int(&self.volume)
    }

    pub fn is_muted(&self) -> bool {
        <str as DeviceValueParser>::parse_bool(&self.muted)
    }
}

/// Body of the device's reply on the control endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlAck {
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl ControlAck {
    pub fn is_success(&self) -> bool {
        self.result == "success"
    }
}
