//! wirenet-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the client do? (for beginners)
//!
//! A client owns exactly one connection to a server:
//!
//! 1. [`ClientInterface::connect`] resolves the host, dials it (retrying
//!    according to the configured [`RetryPolicy`](wirenet_core::RetryPolicy)),
//!    and answers the server's admission challenge.
//! 2. Once validated, messages sent with [`ClientInterface::send`] are written
//!    in order, and messages from the server land in
//!    [`ClientInterface::incoming`].
//! 3. If the connection fails at any point the application's
//!    [`DisconnectHook`] is told why. The interface itself never reconnects;
//!    a fresh `ClientInterface` is needed for a new attempt.

/// Application layer: the disconnect hook and the chat use cases.
pub mod application;

/// Infrastructure layer: the network interface and config storage.
pub mod infrastructure;

pub use application::DisconnectHook;
pub use infrastructure::network::ClientInterface;
pub use infrastructure::storage::config::{ClientConfig, ConfigError};
