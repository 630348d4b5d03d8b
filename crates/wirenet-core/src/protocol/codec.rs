//! Wire codec for message headers and whole messages.
//!
//! Wire format:
//! ```text
//! [type_id:4][body_size:4][body:body_size]
//! ```
//! Total header size: 8 bytes. Both header fields are little-endian `u32`.
//! There is no framing beyond the header; readers must know the header width
//! in advance.

use thiserror::Error;

use crate::protocol::message::{Message, MessageHeader, MessageKind};

/// Width of the type tag on the wire.
pub const TYPE_ID_SIZE: usize = 4;

/// Width of the body-size field on the wire.
pub const BODY_SIZE_FIELD_SIZE: usize = 4;

/// Total size of the message header in bytes.
pub const HEADER_SIZE: usize = TYPE_ID_SIZE + BODY_SIZE_FIELD_SIZE;

/// Errors that can occur while encoding, decoding, or extracting body values.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The encoded body length does not match the data available.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// The type tag in the header is not a value the application knows.
    #[error("unknown message type: {0}")]
    UnknownMessageType(u32),

    /// A string extraction found bytes that are not UTF-8.
    #[error("message body is not valid UTF-8")]
    InvalidUtf8,

    /// A structured value could not be serialized or parsed.
    #[error("json body error: {0}")]
    Json(#[from] serde_json::Error),
}

// ── Header ────────────────────────────────────────────────────────────────────

/// Encodes a header into its fixed 8-byte wire form.
pub fn encode_header<T: MessageKind>(header: &MessageHeader<T>) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    let raw_id: u32 = header.id.into();
    buf[..TYPE_ID_SIZE].copy_from_slice(&raw_id.to_le_bytes());
    buf[TYPE_ID_SIZE..].copy_from_slice(&header.size.to_le_bytes());
    buf
}

/// Decodes a header from its fixed 8-byte wire form.
///
/// # Errors
///
/// Returns [`CodecError::UnknownMessageType`] if the tag does not convert into `T`.
pub fn decode_header<T: MessageKind>(bytes: &[u8; HEADER_SIZE]) -> Result<MessageHeader<T>, CodecError> {
    let raw_id = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let id = T::try_from(raw_id).map_err(|_| CodecError::UnknownMessageType(raw_id))?;
    Ok(MessageHeader { id, size })
}

// ── Whole messages ────────────────────────────────────────────────────────────

/// Encodes a message (header followed by body) into one buffer.
///
/// The size field is taken from the body length, not from `header.size`.
///
/// # Examples
///
/// ```rust
/// use wirenet_core::{decode_message, encode_message, Message};
///
/// let mut msg = Message::new(3u32);
/// msg.push(99u64);
/// let bytes = encode_message(&msg);
/// let (decoded, consumed) = decode_message::<u32>(&bytes).unwrap();
/// assert_eq!(decoded, msg);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message<T: MessageKind>(msg: &Message<T>) -> Vec<u8> {
    let header = MessageHeader {
        id: msg.header.id,
        size: msg.body.len() as u32,
    };
    let mut buf = Vec::with_capacity(HEADER_SIZE + msg.body.len());
    buf.extend_from_slice(&encode_header(&header));
    buf.extend_from_slice(&msg.body);
    buf
}

/// Decodes one message from the beginning of `bytes`.
///
/// Returns the decoded message and the total number of bytes consumed
/// (header + body), so the caller can advance their read cursor.
///
/// # Errors
///
/// Returns [`CodecError::InsufficientData`] if the header is incomplete,
/// [`CodecError::PayloadLengthMismatch`] if the body is incomplete, and
/// [`CodecError::UnknownMessageType`] if the tag is not recognised.
pub fn decode_message<T: MessageKind>(bytes: &[u8]) -> Result<(Message<T>, usize), CodecError> {
    if bytes.len() < HEADER_SIZE {
        return Err(CodecError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let mut header_bytes = [0u8; HEADER_SIZE];
    header_bytes.copy_from_slice(&bytes[..HEADER_SIZE]);
    let header: MessageHeader<T> = decode_header(&header_bytes)?;

    let body_len = header.size as usize;
    let total_needed = HEADER_SIZE + body_len;
    if bytes.len() < total_needed {
        return Err(CodecError::PayloadLengthMismatch {
            declared: body_len,
            available: bytes.len() - HEADER_SIZE,
        });
    }

    let body = bytes[HEADER_SIZE..total_needed].to_vec();
    Ok((Message::with_body(header.id, body), total_needed))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        Ping,
        Chat,
    }

    impl From<Kind> for u32 {
        fn from(kind: Kind) -> u32 {
            match kind {
                Kind::Ping => 1,
                Kind::Chat => 2,
            }
        }
    }

    impl TryFrom<u32> for Kind {
        type Error = ();

        fn try_from(value: u32) -> Result<Self, ()> {
            match value {
                1 => Ok(Kind::Ping),
                2 => Ok(Kind::Chat),
                _ => Err(()),
            }
        }
    }

    #[test]
    fn test_header_size_is_8_bytes() {
        let bytes = encode_message(&Message::new(Kind::Ping));
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(HEADER_SIZE, 8);
    }

    #[test]
    fn test_header_fields_are_little_endian() {
        let header = MessageHeader {
            id: Kind::Chat,
            size: 0x0102_0304,
        };
        let bytes = encode_header(&header);
        assert_eq!(bytes, [2, 0, 0, 0, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_decode_header_rejects_unknown_type() {
        let bytes = [0xFF, 0, 0, 0, 0, 0, 0, 0];
        let result = decode_header::<Kind>(&bytes);
        assert!(matches!(result, Err(CodecError::UnknownMessageType(0xFF))));
    }

    #[test]
    fn test_raw_u32_kind_accepts_any_tag() {
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0];
        let header = decode_header::<u32>(&bytes).unwrap();
        assert_eq!(header.id, u32::MAX);
    }

    #[test]
    fn test_encode_uses_body_length_not_stale_header() {
        let mut msg = Message::new(Kind::Chat);
        msg.body.extend_from_slice(&[1, 2, 3]); // bypasses the size sync
        let bytes = encode_message(&msg);
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 3);
    }

    #[test]
    fn test_decode_empty_bytes_returns_insufficient_data() {
        let result = decode_message::<Kind>(&[]);
        assert!(matches!(result, Err(CodecError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_truncated_body_returns_length_mismatch() {
        let mut msg = Message::new(Kind::Chat);
        msg.push(1u64);
        let bytes = encode_message(&msg);

        let result = decode_message::<Kind>(&bytes[..bytes.len() - 1]);

        assert!(matches!(
            result,
            Err(CodecError::PayloadLengthMismatch { declared: 8, available: 7 })
        ));
    }

    #[test]
    fn test_two_messages_in_one_buffer_decode_independently() {
        let mut first = Message::new(Kind::Ping);
        first.push(10u32);
        let mut second = Message::new(Kind::Chat);
        second.push_str("second");
        let mut buf = encode_message(&first);
        buf.extend_from_slice(&encode_message(&second));

        let (decoded1, consumed1) = decode_message::<Kind>(&buf).unwrap();
        let (decoded2, consumed2) = decode_message::<Kind>(&buf[consumed1..]).unwrap();

        assert_eq!(decoded1, first);
        assert_eq!(decoded2, second);
        assert_eq!(consumed1 + consumed2, buf.len());
    }
}
