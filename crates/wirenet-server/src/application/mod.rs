//! Application layer for the server.
//!
//! # What lives here (for beginners)
//!
//! The *application* layer holds the server's use cases and the traits that
//! describe what they need from the outside world. It contains no socket
//! code: the network infrastructure calls into a [`ServerHandler`] when
//! something happens, and hands it a [`ClientRegistry`] to act on.
//!
//! # Sub-modules
//!
//! - **`chat`** – The demo chat service: echoes pings and relays
//!   `MessageAll` to every other client.

pub mod chat;

use std::sync::Arc;

use wirenet_core::{Connection, Message, MessageKind};

/// Operations a handler may perform on the set of connected clients.
///
/// Implemented by the server's registry handle.
pub trait ClientRegistry<T: MessageKind>: Send + Sync {
    /// Number of registered connections, including ones still handshaking.
    fn client_count(&self) -> usize;

    /// IDs of every registered connection, in registry order.
    fn client_ids(&self) -> Vec<u32>;

    /// Looks up a registered connection.
    fn connection(&self, id: u32) -> Option<Arc<Connection<T>>>;

    /// Queues `message` for one client. Returns `false` if the ID is unknown
    /// or the connection refuses new sends.
    fn send_to(&self, id: u32, message: Message<T>) -> bool;

    /// Queues a copy of `message` for every registered client except
    /// `exclude`. Returns the number of clients it was queued for.
    fn broadcast(&self, message: &Message<T>, exclude: Option<u32>) -> usize;

    /// Removes a client and fires the disconnect callback. Returns `false`
    /// if it was already gone.
    fn disconnect(&self, id: u32) -> bool;
}

/// Application callbacks for a server.
///
/// `should_accept` runs on the accept thread, `on_message` on the dispatch
/// thread, and the remaining callbacks on whichever reactor thread owns the
/// connection, so implementations must be `Send + Sync`.
pub trait ServerHandler<T: MessageKind>: Send + Sync + 'static {
    /// Admission decision for a freshly accepted socket. A `false` result
    /// sends the deny flag and closes the connection.
    fn should_accept(&self, _conn: &Arc<Connection<T>>) -> bool {
        true
    }

    /// The client answered the challenge correctly; messages start flowing
    /// right after this returns.
    fn on_client_validated(&self, _registry: &dyn ClientRegistry<T>, _conn: &Arc<Connection<T>>) {}

    /// The client was removed from the registry. Called exactly once per
    /// registered connection.
    fn on_client_disconnect(&self, _registry: &dyn ClientRegistry<T>, _conn: &Arc<Connection<T>>) {}

    /// A message arrived from `sender`.
    fn on_message(&self, registry: &dyn ClientRegistry<T>, sender: &Arc<Connection<T>>, message: Message<T>);
}
