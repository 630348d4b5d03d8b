//! Application layer for the client.
//!
//! # Sub-modules
//!
//! - **`chat`** – Builds the demo chat requests (`ServerPing`, `MessageAll`)
//!   and interprets what the server sends back.

pub mod chat;

use tracing::warn;
use wirenet_core::ErrorKind;

/// Application-level notification that the server connection is gone.
///
/// Called once, on the client's reactor thread, with the kind of the first
/// failure: a connect that ran out of retries (`connection_error`), a failed
/// handshake step, or a steady-state read/write error. What to do next (give
/// up, build a new client and reconnect) is up to the application.
///
/// Closures of the form `Fn(ErrorKind)` implement this trait.
#[cfg_attr(test, mockall::automock)]
pub trait DisconnectHook: Send + Sync + 'static {
    fn disconnect_server(&self, kind: ErrorKind);
}

impl<F> DisconnectHook for F
where
    F: Fn(ErrorKind) + Send + Sync + 'static,
{
    fn disconnect_server(&self, kind: ErrorKind) {
        self(kind)
    }
}

/// Hook used when the application does not install one: logs and moves on.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDisconnect;

impl DisconnectHook for LogDisconnect {
    fn disconnect_server(&self, kind: ErrorKind) {
        warn!("disconnected from server: {kind}");
    }
}
