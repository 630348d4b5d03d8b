//! # wirenet-core
//!
//! Shared library for wirenet containing the message codec, the thread-safe
//! inbound queue, the connection handshake, the connection engine, and the
//! threading scaffolding used by both the server and client crates.
//!
//! # Architecture overview (for beginners)
//!
//! wirenet moves small typed messages over TCP. Each message is an 8-byte
//! header (type tag + body length) followed by a body of packed values.
//!
//! - **`protocol`** – The [`Message`] container, its wire codec, and the
//!   five-step admission/challenge handshake every connection goes through
//!   before messages may flow.
//!
//! - **`queue`** – [`TsQueue`], the blocking queue that carries inbound
//!   messages from many reactor threads to one dispatch thread.
//!
//! - **`connection`** – [`Connection`], one socket with its read loop, write
//!   loop, and error reporting. The same type serves both roles; the
//!   [`Role`] tag decides how inbound messages are packaged.
//!
//! - **`runtime`** – [`Reactor`]s (one single-threaded event loop per OS
//!   thread), the round-robin [`ReactorPool`], and the [`Dispatcher`].
//!
//! ```text
//! socket ─▶ handshake ─▶ read loop ─▶ TsQueue ─▶ dispatch thread ─▶ handler
//!                                                                   │
//! socket ◀─ write loop ◀─ outbound queue ◀─ Connection::send ◀──────┘
//! ```

pub mod connection;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod runtime;

// Re-export the most-used types at the crate root so callers can write
// `wirenet_core::Message` instead of `wirenet_core::protocol::message::Message`.
pub use connection::{
    connect_with_retry, Connection, ConnectionOwner, ConnectionState, InboundQueue, OwnedMessage,
    RetryPolicy, Role, CLIENT_CONNECTION_ID,
};
pub use error::{ErrorKind, HandshakeError, NetError};
pub use protocol::codec::{decode_message, encode_message, CodecError, HEADER_SIZE};
pub use protocol::message::{Message, MessageHeader, MessageKind};
pub use protocol::scalar::Scalar;
pub use queue::TsQueue;
pub use runtime::{Dispatcher, MessageHandler, Reactor, ReactorPool};
