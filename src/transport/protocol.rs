use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Upper bound on a frame payload. Event records are tens of bytes; anything
/// larger means the stream is corrupt and the connection must be dropped.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Length of the big-endian frame prefix.
pub const FRAME_PREFIX_LEN: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error on event stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid frame length {0}")]
    InvalidLength(usize),

    #[error("malformed event payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

/// Touch actions, matching the phone-side motion event actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TouchAction {
    Down,
    Move,
    Up,
}

/// Button codes reported by the phone app.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonCode {
    Home,
    App,
    Click,
    VolumeUp,
    VolumeDown,
}

/// One event record on the emulator stream. The stream is one-directional
/// (phone to client); there is no acknowledgement.
///
/// Orientation, gyro, and accel values are in the phone's own right-handed
/// convention; the emulator provider converts them on ingestion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteEvent {
    Touch {
        action: TouchAction,
        /// Normalized touch position, [0,1] x [0,1].
        x: f32,
        y: f32,
        timestamp_ms: i64,
    },
    Orientation {
        x: f32,
        y: f32,
        z: f32,
        w: f32,
        timestamp_ms: i64,
    },
    Gyroscope {
        x: f32,
        y: f32,
        z: f32,
        timestamp_ms: i64,
    },
    Accelerometer {
        x: f32,
        y: f32,
        z: f32,
        timestamp_ms: i64,
    },
    Button {
        code: ButtonCode,
        pressed: bool,
        timestamp_ms: i64,
    },
}

/// Serializes an event into a payload (without the length prefix).
pub fn encode_payload(event: &RemoteEvent) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(event)?)
}

/// Decodes a complete frame payload into an event record.
pub fn decode_payload(payload: &[u8]) -> Result<RemoteEvent, ProtocolError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Writes one `[4-byte big-endian length][payload]` frame.
pub fn write_frame<W: Write>(writer: &mut W, event: &RemoteEvent) -> Result<(), ProtocolError> {
    let payload = encode_payload(event)?;
    if payload.is_empty() || payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::InvalidLength(payload.len()));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(&payload)?;
    Ok(())
}

/// Reads one complete frame. A short read at any point is an error; partial
/// frame recovery is never attempted.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<RemoteEvent, ProtocolError> {
    let mut prefix = [0u8; FRAME_PREFIX_LEN];
    reader.read_exact(&mut prefix)?;
    let len = u32::from_be_bytes(prefix) as usize;
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(ProtocolError::InvalidLength(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    decode_payload(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_events() -> Vec<RemoteEvent> {
        vec![
            RemoteEvent::Touch {
                action: TouchAction::Move,
                x: 0.125,
                y: 0.7314159,
                timestamp_ms: 1_234_567,
            },
            RemoteEvent::Orientation {
                x: 0.1,
                y: 0.2,
                z: 0.3,
                w: 0.9273,
                timestamp_ms: 2,
            },
            RemoteEvent::Gyroscope {
                x: -1.0e-3,
                y: 2.5,
                z: std::f32::consts::PI,
                timestamp_ms: 3,
            },
            RemoteEvent::Accelerometer {
                x: 0.0,
                y: 9.80665,
                z: -0.017,
                timestamp_ms: 4,
            },
            RemoteEvent::Button {
                code: ButtonCode::VolumeDown,
                pressed: true,
                timestamp_ms: 5,
            },
        ]
    }

    #[test]
    fn payload_roundtrip_is_bit_identical_for_all_tags() {
        for event in sample_events() {
            let payload = encode_payload(&event).unwrap();
            let decoded = decode_payload(&payload).unwrap();
            // PartialEq on f32 fields: exact bit-for-bit equality expected.
            assert_eq!(decoded, event);
        }
    }

    #[test]
    fn frame_roundtrip_through_a_stream() {
        let mut buf = Vec::new();
        for event in sample_events() {
            write_frame(&mut buf, &event).unwrap();
        }
        let mut cursor = Cursor::new(buf);
        for event in sample_events() {
            assert_eq!(read_frame(&mut cursor).unwrap(), event);
        }
    }

    #[test]
    fn zero_and_oversized_lengths_are_rejected() {
        let mut zero = Cursor::new(vec![0, 0, 0, 0]);
        assert!(matches!(
            read_frame(&mut zero),
            Err(ProtocolError::InvalidLength(0))
        ));

        let huge = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes().to_vec();
        let mut oversized = Cursor::new(huge);
        assert!(matches!(
            read_frame(&mut oversized),
            Err(ProtocolError::InvalidLength(_))
        ));
    }

    #[test]
    fn truncated_prefix_is_an_io_error_not_a_panic() {
        // Only two of the four prefix bytes arrive before the stream ends.
        let mut cursor = Cursor::new(vec![0, 0]);
        assert!(matches!(
            read_frame(&mut cursor),
            Err(ProtocolError::Io(_))
        ));
    }

    #[test]
    fn truncated_payload_is_an_io_error() {
        let mut buf = Vec::new();
        write_frame(
            &mut buf,
            &RemoteEvent::Button {
                code: ButtonCode::Home,
                pressed: false,
                timestamp_ms: 9,
            },
        )
        .unwrap();
        buf.truncate(buf.len() - 3);
        let mut cursor = Cursor::new(buf);
        assert!(matches!(
            read_frame(&mut cursor),
            Err(ProtocolError::Io(_))
        ));
    }
}
