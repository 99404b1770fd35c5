use crate::models::VolumeLevel;

/// User intents the dispatcher accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandIntent {
    Play,
    Pause,
    Next,
    Previous,
    SetVolume { level: VolumeLevel },
    Mute,
    Unmute,
}

impl CommandIntent {
    /// Wire name of the command, as the control endpoint expects it.
    pub fn name(&self) -> &'static str {
        match self {
            CommandIntent::Play => "play",
            CommandIntent::Pause => "pause",
            CommandIntent::Next => "next",
            CommandIntent::Previous => "previous",
            CommandIntent::SetVolume { .. } => "setVolume",
            CommandIntent::Mute => "mute",
            CommandIntent::Unmute => "unmute",
        }
    }

    /// Build a volume-set intent, clamping the requested value to [0, 100].
    pub fn set_volume(raw: i32) -> Self {
        CommandIntent::SetVolume {
            level: VolumeLevel::clamped(raw),
        }
    }
}

/// One outbound request. Owned by the dispatcher until acknowledged or
/// timed out; the sequence number is client-monotonic and reused verbatim
/// on the single retry so the device can deduplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub seq: u64,
    pub intent: CommandIntent,
}

impl CommandRequest {
    pub fn new(seq: u64, intent: CommandIntent) -> Self {
        CommandRequest { seq, intent }
    }

    /// Form fields for the control endpoint body.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("cmd", self.intent.name().to_string()),
            ("seq", self.seq.to_string()),
        ];
        if let CommandIntent::SetVolume { level } = &self.intent {
            fields.push(("volume", level.to_string()));
        }
        fields
    }
}
