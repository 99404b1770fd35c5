use bytes::BytesMut;
use serde_json::json;
use storybutton_rs::{
    parse_frame, CommandIntent, CommandRequest, ControlAck, DeviceEvent, DeviceValueParser,
    FrameCodec, PlaybackStatus, StatusReport, VolumeLevel,
};
use tokio_util::codec::Decoder;

// Test wire model deserialization
#[test]
fn test_status_report_model() {
    let report_json = json!({
        "kind": "status",
        "name": "The Dragon's Lost Library - Episode 12",
        "chStatus": "Play state: playing",
        "volume": "37",
        "muted": "false",
        "position": "42.5",
        "duration": "1800.0",
        "seq": 7,
        "result": "success"
    });
    let report: StatusReport = serde_json::from_value(report_json).unwrap();
    assert_eq!(report.status(), PlaybackStatus::Playing);
    assert_eq!(report.volume_value(), 37);
    assert!(!report.is_muted());
    assert_eq!(report.position_value(), 42.5);
    assert_eq!(report.duration_value(), 1800.0);
    assert_eq!(report.seq, Some(7));
    assert!(!report.is_failure());

    let track = report.track().expect("expected track metadata");
    assert_eq!(track.title, "The Dragon's Lost Library - Episode 12");
    assert_eq!(track.duration, Some(1800.0));
    assert_eq!(track.position, Some(42.5));

    // Missing fields default and malformed numerics parse to zero
    let sparse: StatusReport = serde_json::from_value(json!({
        "chStatus": "Play state: paused",
        "volume": "not_a_number"
    }))
    .unwrap();
    assert_eq!(sparse.status(), PlaybackStatus::Paused);
    assert_eq!(sparse.volume_value(), 0);
    assert!(sparse.track().is_none());
    assert_eq!(sparse.seq, None);

    // The device reports failure while between episodes
    let failing: StatusReport =
        serde_json::from_value(json!({ "result": "fail", "chStatus": "" })).unwrap();
    assert!(failing.is_failure());
    assert_eq!(failing.status(), PlaybackStatus::Stopped);
}

#[test]
fn test_playback_status_mapping() {
    assert_eq!(
        PlaybackStatus::from_report("Play state: playing"),
        PlaybackStatus::Playing
    );
    assert_eq!(
        PlaybackStatus::from_report("Play state: paused"),
        PlaybackStatus::Paused
    );
    assert_eq!(
        PlaybackStatus::from_report("Play state: buffering"),
        PlaybackStatus::Buffering
    );
    // Prefix-less values are accepted too
    assert_eq!(PlaybackStatus::from_report("playing"), PlaybackStatus::Playing);
    // Anything unrecognized is treated as stopped
    assert_eq!(PlaybackStatus::from_report(""), PlaybackStatus::Stopped);
    assert_eq!(
        PlaybackStatus::from_report("Play state: transcoding"),
        PlaybackStatus::Stopped
    );

    assert_eq!(PlaybackStatus::Playing.as_str(), "PLAYING");
    assert_eq!(PlaybackStatus::Unreachable.as_str(), "UNREACHABLE");
}

#[test]
fn test_volume_level_clamping() {
    assert_eq!(VolumeLevel::clamped(137), VolumeLevel::MAX);
    assert_eq!(VolumeLevel::clamped(-5), VolumeLevel::MIN);
    assert_eq!(VolumeLevel::clamped(55).get(), 55);
    assert_eq!(VolumeLevel::clamped(100).get(), 100);
    assert_eq!(VolumeLevel::clamped(0).get(), 0);
    assert_eq!(VolumeLevel::clamped(70).to_string(), "70");
}

#[test]
fn test_control_ack() {
    let ack: ControlAck = serde_json::from_value(json!({ "result": "success" })).unwrap();
    assert!(ack.is_success());

    let failure: ControlAck =
        serde_json::from_value(json!({ "result": "fail", "error": "busy" })).unwrap();
    assert!(!failure.is_success());
    assert_eq!(failure.error.as_deref(), Some("busy"));
}

// Test command names and wire encoding
#[test]
fn test_command_form_fields() {
    assert_eq!(CommandIntent::Play.name(), "play");
    assert_eq!(CommandIntent::Pause.name(), "pause");
    assert_eq!(CommandIntent::Next.name(), "next");
    assert_eq!(CommandIntent::Previous.name(), "previous");
    assert_eq!(CommandIntent::Mute.name(), "mute");
    assert_eq!(CommandIntent::Unmute.name(), "unmute");
    assert_eq!(CommandIntent::set_volume(40).name(), "setVolume");

    let request = CommandRequest::new(9, CommandIntent::Pause);
    assert_eq!(
        request.form_fields(),
        vec![("cmd", "pause".to_string()), ("seq", "9".to_string())]
    );

    // A requested volume outside [0, 100] is clamped before it can reach
    // the wire
    let request = CommandRequest::new(10, CommandIntent::set_volume(150));
    assert_eq!(
        request.form_fields(),
        vec![
            ("cmd", "setVolume".to_string()),
            ("seq", "10".to_string()),
            ("volume", "100".to_string()),
        ]
    );
}

// Test the event stream frame decoder
#[test]
fn test_frame_codec_decodes_framed_payloads() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::new();

    let payload = r#"{"kind":"heartbeat"}"#;
    buf.extend_from_slice(format!("{}\n{}", payload.len(), payload).as_bytes());

    assert_eq!(codec.decode(&mut buf).unwrap(), Some(payload.to_string()));
    assert_eq!(codec.decode(&mut buf).unwrap(), None);
}

#[test]
fn test_frame_codec_handles_partial_input() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::new();

    let payload = r#"{"kind":"volume","volume":"80"}"#;
    let framed = format!("{}\n{}", payload.len(), payload);
    let (head, tail) = framed.as_bytes().split_at(10);

    buf.extend_from_slice(head);
    assert_eq!(codec.decode(&mut buf).unwrap(), None);

    buf.extend_from_slice(tail);
    assert_eq!(codec.decode(&mut buf).unwrap(), Some(payload.to_string()));
}

#[test]
fn test_frame_codec_skips_keep_alive_padding() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::new();

    buf.extend_from_slice(b"\n\n5\nhello");
    assert_eq!(codec.decode(&mut buf).unwrap(), Some("hello".to_string()));
}

#[test]
fn test_frame_codec_rejects_garbage_header() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::new();

    buf.extend_from_slice(b"not-a-length\n{}");
    assert!(codec.decode(&mut buf).is_err());
}

// Test frame interpretation
#[test]
fn test_parse_frame_variants() {
    let event = parse_frame(
        r#"{"kind":"status","name":"Ep 3","chStatus":"Play state: paused","volume":"25","seq":4}"#,
    );
    match event {
        DeviceEvent::Status(report) => {
            assert_eq!(report.status(), PlaybackStatus::Paused);
            assert_eq!(report.volume_value(), 25);
            assert_eq!(report.seq, Some(4));
        }
        other => panic!("expected status event, got {}", other.event_type()),
    }

    let event = parse_frame(r#"{"kind":"volume","volume":"80","muted":"true","seq":5}"#);
    match event {
        DeviceEvent::VolumeChanged(report) => {
            assert_eq!(report.volume_value(), 80);
            assert!(report.is_muted());
        }
        other => panic!("expected volume event, got {}", other.event_type()),
    }

    assert!(matches!(
        parse_frame(r#"{"kind":"heartbeat"}"#),
        DeviceEvent::Heartbeat
    ));
    assert!(matches!(
        parse_frame(r#"{"kind":"firmwareUpdate"}"#),
        DeviceEvent::Unknown(_)
    ));
    assert!(matches!(parse_frame("not json"), DeviceEvent::Unknown(_)));
}

#[test]
fn test_device_seq_extraction() {
    let status = parse_frame(r#"{"kind":"status","seq":11}"#);
    assert_eq!(status.device_seq(), Some(11));

    let heartbeat = parse_frame(r#"{"kind":"heartbeat"}"#);
    assert_eq!(heartbeat.device_seq(), None);
}

#[test]
fn test_track_progress_percentage() {
    let report: StatusReport = serde_json::from_value(json!({
        "name": "Ep 4",
        "chStatus": "Play state: playing",
        "position": "450.0",
        "duration": "1800.0"
    }))
    .unwrap();
    let track = report.track().unwrap();
    assert_eq!(track.progress_percentage(), Some(25.0));

    let report: StatusReport = serde_json::from_value(json!({
        "name": "Ep 4",
        "chStatus": "Play state: playing"
    }))
    .unwrap();
    assert_eq!(report.track().unwrap().progress_percentage(), None);
}

// Test DeviceValueParser utility trait
#[test]
fn test_device_value_parser() {
    assert_eq!(<str as DeviceValueParser>::parse_float("42.5"), 42.5);
    assert_eq!(<str as DeviceValueParser>::parse_float("not_a_number"), 0.0);

    assert_eq!(<str as DeviceValueParser>::parse_int("42"), 42);
    assert_eq!(<str as DeviceValueParser>::parse_int("not_a_number"), 0);

    assert!(<str as DeviceValueParser>::parse_bool("true"));
    assert!(!<str as DeviceValueParser>::parse_bool("false"));
    assert!(!<str as DeviceValueParser>::parse_bool("anything_else"));
}
