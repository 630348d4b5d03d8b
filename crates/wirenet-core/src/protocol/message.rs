//! The in-memory message representation and its typed body operations.
//!
//! A [`Message`] is a header (type tag + body size) followed by a raw byte
//! body. Values are appended to the tail of the body and extracted again under
//! two disciplines that must not be mixed carelessly:
//!
//! - **Fixed-layout scalars** ([`Message::push`] / [`Message::pop`]) are popped
//!   from the tail, so they come back in the reverse order they were pushed.
//! - **Variable-length values** (bytes, strings, JSON, nested messages) are
//!   appended to the tail but extracted by consuming the *whole remaining
//!   body*. At most one such extraction can happen per message and it must be
//!   the last one, after every scalar has been popped.
//!
//! ```rust
//! use wirenet_core::Message;
//!
//! let mut msg = Message::new(1u32);
//! msg.push_str("hello");
//! msg.push(7u32).push(2.5f64);
//!
//! assert_eq!(msg.pop::<f64>().unwrap(), 2.5);
//! assert_eq!(msg.pop::<u32>().unwrap(), 7);
//! assert_eq!(msg.pop_string().unwrap(), "hello");
//! assert!(msg.is_empty());
//! ```
//!
//! `header.size` is recomputed after every mutation and always equals the body
//! length once a call returns.

use std::fmt;

use serde::{de::DeserializeOwned, Serialize};

use crate::protocol::codec::{decode_message, encode_message, CodecError};
use crate::protocol::scalar::Scalar;

/// Application-defined message type tag.
///
/// The core never interprets the tag; it only moves it on and off the wire as
/// a `u32`. Implement `From<Kind> for u32` and `TryFrom<u32> for Kind` for an
/// application enum and it becomes a `MessageKind` automatically. Plain `u32`
/// is a valid kind as well.
pub trait MessageKind:
    Copy + fmt::Debug + Send + Sync + 'static + Into<u32> + TryFrom<u32>
{
}

impl<T> MessageKind for T where
    T: Copy + fmt::Debug + Send + Sync + 'static + Into<u32> + TryFrom<u32>
{
}

/// Fixed-size prefix carried by every message on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader<T> {
    /// Application message type.
    pub id: T,
    /// Length of the body in bytes. Derived from `body.len()`.
    pub size: u32,
}

/// A typed message: header plus raw body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<T> {
    pub header: MessageHeader<T>,
    pub body: Vec<u8>,
}

impl<T: MessageKind> Message<T> {
    /// Creates a message with an empty body.
    pub fn new(id: T) -> Self {
        Self {
            header: MessageHeader { id, size: 0 },
            body: Vec::new(),
        }
    }

    /// Creates a message that takes ownership of an existing body.
    pub fn with_body(id: T, body: Vec<u8>) -> Self {
        let mut msg = Self {
            header: MessageHeader { id, size: 0 },
            body,
        };
        msg.sync_size();
        msg
    }

    /// Returns the message type.
    pub fn id(&self) -> T {
        self.header.id
    }

    /// Returns the body length in bytes.
    pub fn size(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    fn sync_size(&mut self) {
        self.header.size = self.body.len() as u32;
    }

    // ── Fixed-layout values ──────────────────────────────────────────────────

    /// Appends a scalar to the tail of the body.
    pub fn push<S: Scalar>(&mut self, value: S) -> &mut Self {
        value.put(&mut self.body);
        self.sync_size();
        self
    }

    /// Removes a scalar from the tail of the body.
    ///
    /// Scalars come back in reverse push order. Popping a different type than
    /// was pushed last silently reinterprets whatever bytes sit at the tail.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InsufficientData`] when the body is shorter than
    /// `S::SIZE`; the body is left untouched in that case.
    pub fn pop<S: Scalar>(&mut self) -> Result<S, CodecError> {
        let available = self.body.len();
        if available < S::SIZE {
            return Err(CodecError::InsufficientData {
                needed: S::SIZE,
                available,
            });
        }
        let start = available - S::SIZE;
        let value = S::get(&mut &self.body[start..]);
        self.body.truncate(start);
        self.sync_size();
        Ok(value)
    }

    // ── Variable-length values ───────────────────────────────────────────────

    /// Appends raw bytes to the tail of the body.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.body.extend_from_slice(bytes);
        self.sync_size();
        self
    }

    /// Appends the UTF-8 bytes of `value`, without a terminator or length prefix.
    pub fn push_str(&mut self, value: &str) -> &mut Self {
        self.push_bytes(value.as_bytes())
    }

    /// Appends `value` serialized as compact JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] when `value` cannot be serialized.
    pub fn push_json<V: Serialize + ?Sized>(&mut self, value: &V) -> Result<&mut Self, CodecError> {
        let bytes = serde_json::to_vec(value)?;
        Ok(self.push_bytes(&bytes))
    }

    /// Appends another message, header included, as an opaque blob.
    pub fn push_message<U: MessageKind>(&mut self, inner: &Message<U>) -> &mut Self {
        let bytes = encode_message(inner);
        self.push_bytes(&bytes)
    }

    /// Takes the entire remaining body and leaves it empty.
    pub fn pop_bytes(&mut self) -> Vec<u8> {
        let body = std::mem::take(&mut self.body);
        self.sync_size();
        body
    }

    /// Takes the entire remaining body as a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidUtf8`]; the body is consumed either way.
    pub fn pop_string(&mut self) -> Result<String, CodecError> {
        String::from_utf8(self.pop_bytes()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Takes the entire remaining body and parses it as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`]; the body is consumed either way.
    pub fn pop_json<V: DeserializeOwned>(&mut self) -> Result<V, CodecError> {
        let bytes = self.pop_bytes();
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Takes the entire remaining body and decodes it as a nested message.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the body is not exactly one encoded message.
    pub fn pop_message<U: MessageKind>(&mut self) -> Result<Message<U>, CodecError> {
        let bytes = self.pop_bytes();
        let (inner, consumed) = decode_message(&bytes)?;
        if consumed != bytes.len() {
            return Err(CodecError::PayloadLengthMismatch {
                declared: consumed,
                available: bytes.len(),
            });
        }
        Ok(inner)
    }

    // ── Wire form ────────────────────────────────────────────────────────────

    /// Encodes header and body into one contiguous buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        encode_message(self)
    }

    /// Decodes one message from the start of `bytes`, returning it together
    /// with the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// See [`decode_message`].
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), CodecError> {
        decode_message(bytes)
    }
}

impl<T: MessageKind> fmt::Display for Message<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID: {:?}, Size: {}", self.header.id, self.header.size)
    }
}
