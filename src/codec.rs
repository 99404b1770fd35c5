// Streaming decoder for the device's event stream.
// Frames arrive as: <payload byte length>\n<payload>

use bytes::BytesMut;
use tokio_util::codec::Decoder;

pub struct FrameCodec {
    state: FrameCodecState,
}

enum FrameCodecState {
    // Waiting for the newline-terminated length line
    ReadingLength,
    // Length known, accumulating the payload
    ReadingPayload { expected: usize },
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            state: FrameCodecState::ReadingLength,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match &mut self.state {
                FrameCodecState::ReadingLength => {
                    let Some(newline) = buf.iter().position(|&b| b == b'\n') else {
                        // No complete length line yet
                        return Ok(None);
                    };
                    let line = buf.split_to(newline + 1);
                    let header = std::str::from_utf8(&line[..line.len() - 1])
                        .map_err(|_| {
                            std::io::Error::new(
                                std::io::ErrorKind::InvalidData,
                                "length header is not UTF-8",
                            )
                        })?
                        .trim();

                    // The device pads the stream with blank lines as keep-alive
                    if header.is_empty() {
                        continue;
                    }

                    let expected = header.parse::<usize>().map_err(|_| {
                        std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            format!("expected numeric frame length, got: {header}"),
                        )
                    })?;
                    self.state = FrameCodecState::ReadingPayload { expected };
                    // Payload may already be buffered
                }

                FrameCodecState::ReadingPayload { expected } => {
                    if buf.len() < *expected {
                        return Ok(None);
                    }
                    let payload = buf.split_to(*expected);
                    let frame = String::from_utf8(payload.to_vec()).map_err(|_| {
                        std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            "frame payload is not UTF-8",
                        )
                    })?;
                    self.state = FrameCodecState::ReadingLength;
                    return Ok(Some(frame));
                }
            }
        }
    }
}
