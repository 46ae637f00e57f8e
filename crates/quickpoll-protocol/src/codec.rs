//! Codec for encoding and decoding QuickPoll frames.
//!
//! Two encodings are supported:
//! - JSON text, one frame per WebSocket text message
//! - MessagePack with a 4-byte big-endian length prefix, for binary messages

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::frames::Frame;

/// Largest frame a peer may send us (1 MiB).
///
/// Only decoding enforces this. Outgoing frames carry whole voter lists and
/// are bounded by the 4-byte length prefix alone.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {1}")]
    FrameTooLarge(usize, usize),

    /// Not enough data to decode frame.
    #[error("Incomplete frame: need {0} more bytes")]
    Incomplete(usize),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How frames are represented on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// JSON text frames.
    #[default]
    Json,
    /// Length-prefixed MessagePack binary frames.
    MessagePack,
}

/// Encode a frame to length-prefixed MessagePack.
///
/// # Errors
///
/// Returns an error if the payload does not fit the length prefix or
/// encoding fails.
pub fn encode(frame: &Frame) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    encode_into(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a frame into an existing buffer.
///
/// # Errors
///
/// Returns an error if the payload does not fit the length prefix or
/// encoding fails.
pub fn encode_into(frame: &Frame, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    let payload = rmp_serde::to_vec_named(frame)?;
    let length = u32::try_from(payload.len())
        .map_err(|_| ProtocolError::FrameTooLarge(payload.len(), u32::MAX as usize))?;

    buf.reserve(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(length);
    buf.extend_from_slice(&payload);

    Ok(())
}

/// Decode a single length-prefixed MessagePack frame.
///
/// # Errors
///
/// Returns an error if the data is incomplete, too large, or invalid.
pub fn decode(data: &[u8]) -> Result<Frame, ProtocolError> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return Err(ProtocolError::Incomplete(LENGTH_PREFIX_SIZE - data.len()));
    }

    let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(length, MAX_FRAME_SIZE));
    }

    let total_size = LENGTH_PREFIX_SIZE + length;
    if data.len() < total_size {
        return Err(ProtocolError::Incomplete(total_size - data.len()));
    }

    let frame = rmp_serde::from_slice(&data[LENGTH_PREFIX_SIZE..total_size])?;
    Ok(frame)
}

/// Try to decode a frame from a buffer, advancing it if successful.
///
/// Returns `Ok(Some(frame))` if a complete frame was decoded,
/// `Ok(None)` if more data is needed, or `Err` on protocol error.
///
/// # Errors
///
/// Returns an error if the frame is too large or invalid.
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
    decode_from_with_limit(buf, MAX_FRAME_SIZE)
}

/// Like [`decode_from`], but accepting payloads up to `max_size` bytes.
///
/// Clients reading server frames use this, since poll updates are not
/// bounded by [`MAX_FRAME_SIZE`].
///
/// # Errors
///
/// Returns an error if the frame exceeds `max_size` or is invalid.
pub fn decode_from_with_limit(
    buf: &mut BytesMut,
    max_size: usize,
) -> Result<Option<Frame>, ProtocolError> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

    if length > max_size {
        return Err(ProtocolError::FrameTooLarge(length, max_size));
    }

    let total_size = LENGTH_PREFIX_SIZE + length;
    if buf.len() < total_size {
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_SIZE);
    let payload = buf.split_to(length);
    let frame = rmp_serde::from_slice(&payload)?;

    Ok(Some(frame))
}

/// Encode a frame as a JSON string.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_json(frame: &Frame) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decode a frame from a JSON string.
///
/// # Errors
///
/// Returns an error if the text is too large or not a valid frame.
pub fn decode_json(text: &str) -> Result<Frame, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len(), MAX_FRAME_SIZE));
    }
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ChoiceSnapshot, PollSnapshot};
    use chrono::Utc;

    fn update_frame() -> Frame {
        let now = Utc::now();
        Frame::poll_update(PollSnapshot {
            id: 1,
            question: "Color?".to_string(),
            created_at: now,
            expires_at: now + chrono::Duration::days(1),
            is_expired: false,
            choices: vec![ChoiceSnapshot {
                id: 1,
                label: "Red".to_string(),
                vote_count: 1,
                voter_labels: vec!["alice".to_string()],
            }],
        })
    }

    #[test]
    fn test_msgpack_roundtrip() {
        let frames = vec![
            Frame::join(1, 42),
            Frame::error(1, 404, "Poll not found"),
            Frame::ping(),
            Frame::connected("conn-123"),
            update_frame(),
        ];

        for frame in frames {
            let encoded = encode(&frame).unwrap();
            let decoded = decode(&encoded).unwrap();
            assert_eq!(frame, decoded);
        }
    }

    #[test]
    fn test_json_update_shape() {
        let text = encode_json(&update_frame()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "poll_update");
        assert_eq!(value["poll_id"], 1);
        assert_eq!(value["poll"]["choices"][0]["votes"], 1);

        match decode_json(&text).unwrap() {
            Frame::PollUpdate { poll_id, poll } => {
                assert_eq!(poll_id, 1);
                assert_eq!(poll.choices[0].voter_labels, vec!["alice".to_string()]);
            }
            other => panic!("Expected PollUpdate, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_json_rejects_unknown_type() {
        assert!(matches!(
            decode_json(r#"{"type":"vote","id":1}"#),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_decode_incomplete() {
        let encoded = encode(&Frame::join(1, 1)).unwrap();

        match decode(&encoded[..5]) {
            Err(ProtocolError::Incomplete(_)) => {}
            other => panic!("Expected Incomplete error, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_too_large() {
        let frame = Frame::error(1, 500, "x".repeat(MAX_FRAME_SIZE + 1));

        // Outgoing frames are not capped
        let encoded = encode(&frame).unwrap();
        let text = encode_json(&frame).unwrap();
        assert!(text.len() > MAX_FRAME_SIZE);

        match decode(&encoded) {
            Err(ProtocolError::FrameTooLarge(_, MAX_FRAME_SIZE)) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
        assert!(matches!(
            decode_json(&text),
            Err(ProtocolError::FrameTooLarge(..))
        ));

        let mut buf = BytesMut::from(&encoded[..]);
        assert!(matches!(
            decode_from(&mut buf),
            Err(ProtocolError::FrameTooLarge(..))
        ));
        assert_eq!(
            decode_from_with_limit(&mut buf, usize::MAX).unwrap(),
            Some(frame)
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_streaming_decode() {
        let frame1 = Frame::join(1, 10);
        let frame2 = Frame::leave(2, 10);

        let mut buf = BytesMut::new();
        encode_into(&frame1, &mut buf).unwrap();
        encode_into(&frame2, &mut buf).unwrap();

        // Partial third frame stays buffered
        let tail = encode(&Frame::ping()).unwrap();
        buf.extend_from_slice(&tail[..2]);

        assert_eq!(decode_from(&mut buf).unwrap(), Some(frame1));
        assert_eq!(decode_from(&mut buf).unwrap(), Some(frame2));
        assert_eq!(decode_from(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 2);
    }
}
