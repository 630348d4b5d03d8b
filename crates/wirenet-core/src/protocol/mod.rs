//! Protocol module containing the message container, the binary codec, and
//! the connection handshake.

pub mod chat;
pub mod codec;
pub mod handshake;
pub mod message;
pub mod scalar;

pub use chat::ChatKind;
pub use codec::{
    decode_header, decode_message, encode_header, encode_message, CodecError, HEADER_SIZE,
};
pub use handshake::{generate_challenge, scramble};
pub use message::{Message, MessageHeader, MessageKind};
pub use scalar::Scalar;
