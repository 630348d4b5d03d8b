//! Client registry: the server-side table of live connections.
//!
//! Entries are added by the accept loop *before* the handshake runs, so a
//! client that fails validation is removed through the same
//! [`disconnect`](ClientRegistry::disconnect) path as one that drops later.
//!
//! # Locking
//!
//! The table sits behind a `parking_lot::Mutex` because it is touched from
//! the accept reactor, every pool reactor (error hooks), and the dispatch
//! thread (handlers calling `broadcast`). The lock is never held while a
//! handler callback runs, so callbacks may freely call back into the
//! registry.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use wirenet_core::{
    Connection, ConnectionOwner, ErrorKind, InboundQueue, Message, MessageHandler, MessageKind,
    OwnedMessage, ReactorPool, Role,
};

use crate::application::{ClientRegistry, ServerHandler};

/// State shared by the accept loop, the connections' error hooks, and the
/// dispatch thread.
pub(crate) struct ServerShared<T: MessageKind> {
    clients: Mutex<BTreeMap<u32, Arc<Connection<T>>>>,
    handler: Arc<dyn ServerHandler<T>>,
    next_id: AtomicU32,
    pool: ReactorPool,
    inbound: InboundQueue<T>,
}

impl<T: MessageKind> ServerShared<T> {
    pub(crate) fn new(
        handler: Arc<dyn ServerHandler<T>>,
        first_connection_id: u32,
        pool: ReactorPool,
        inbound: InboundQueue<T>,
    ) -> Self {
        Self {
            clients: Mutex::new(BTreeMap::new()),
            handler,
            next_id: AtomicU32::new(first_connection_id),
            pool,
            inbound,
        }
    }

    pub(crate) fn pool(&self) -> &ReactorPool {
        &self.pool
    }

    pub(crate) fn inbound(&self) -> &InboundQueue<T> {
        &self.inbound
    }

    /// Registers a freshly accepted socket and starts its handshake on the
    /// next pool reactor.
    pub(crate) fn admit(self: &Arc<Self>, socket: TcpStream, addr: SocketAddr) {
        let socket = match socket.into_std() {
            Ok(socket) => socket,
            Err(e) => {
                warn!(%addr, "could not detach accepted socket: {e}");
                return;
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let owner = Arc::downgrade(self);
        let owner: Weak<dyn ConnectionOwner<T>> = owner;
        let conn = Connection::new(
            id,
            Role::Acceptor,
            self.pool.next().clone(),
            Arc::clone(&self.inbound),
            owner,
        );

        let admitted = self.handler.should_accept(&conn);
        self.clients.lock().insert(id, Arc::clone(&conn));
        if admitted {
            info!(conn_id = id, %addr, "connection approved");
        } else {
            info!(conn_id = id, %addr, "connection denied");
        }
        conn.accept(socket, admitted);
    }

    /// Inserts an already built connection. Used by tests that exercise the
    /// bookkeeping without sockets.
    #[cfg(test)]
    pub(crate) fn insert(&self, conn: Arc<Connection<T>>) {
        self.clients.lock().insert(conn.id(), conn);
    }

    /// Disconnects every registered client, in registry order.
    pub(crate) fn disconnect_all(&self) -> usize {
        let ids: Vec<u32> = self.clients.lock().keys().copied().collect();
        ids.into_iter().filter(|&id| self.disconnect(id)).count()
    }
}

impl<T: MessageKind> ClientRegistry<T> for ServerShared<T> {
    fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    fn client_ids(&self) -> Vec<u32> {
        self.clients.lock().keys().copied().collect()
    }

    fn connection(&self, id: u32) -> Option<Arc<Connection<T>>> {
        self.clients.lock().get(&id).cloned()
    }

    fn send_to(&self, id: u32, message: Message<T>) -> bool {
        let Some(conn) = self.connection(id) else {
            return false;
        };
        if conn.send(message) {
            true
        } else {
            self.disconnect(id);
            false
        }
    }

    fn broadcast(&self, message: &Message<T>, exclude: Option<u32>) -> usize {
        // Snapshot under the lock, send outside it.
        let targets: Vec<Arc<Connection<T>>> = self
            .clients
            .lock()
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .map(|(_, conn)| Arc::clone(conn))
            .collect();

        let mut sent = 0;
        let mut stale = Vec::new();
        for conn in targets {
            if conn.send(message.clone()) {
                sent += 1;
            } else {
                stale.push(conn.id());
            }
        }
        for id in stale {
            self.disconnect(id);
        }
        sent
    }

    fn disconnect(&self, id: u32) -> bool {
        let Some(conn) = self.clients.lock().remove(&id) else {
            return false;
        };
        conn.mark_released();
        conn.close();
        debug!(conn_id = id, "removed from registry");
        self.handler.on_client_disconnect(self, &conn);
        true
    }
}

impl<T: MessageKind> ConnectionOwner<T> for ServerShared<T> {
    fn on_error(&self, conn: &Arc<Connection<T>>, kind: ErrorKind) {
        debug!(conn_id = conn.id(), "{kind}; dropping client");
        self.disconnect(conn.id());
    }

    fn on_validated(&self, conn: &Arc<Connection<T>>) {
        self.handler.on_client_validated(self, conn);
    }
}

/// Routes dispatched messages to the server's handler.
pub(crate) struct ServerDispatch<T: MessageKind> {
    shared: Arc<ServerShared<T>>,
}

impl<T: MessageKind> ServerDispatch<T> {
    pub(crate) fn new(shared: Arc<ServerShared<T>>) -> Self {
        Self { shared }
    }
}

impl<T: MessageKind> MessageHandler<T> for ServerDispatch<T> {
    fn handle(&mut self, owned: OwnedMessage<T>) {
        match owned.sender {
            Some(sender) => self
                .shared
                .handler
                .on_message(&*self.shared, &sender, owned.message),
            None => warn!("dropping message without a sender: {}", owned.message),
        }
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Cheaply cloneable handle to a running server's registry.
///
/// Usable from any thread, including inside handler callbacks.
pub struct ServerHandle<T: MessageKind> {
    shared: Arc<ServerShared<T>>,
}

impl<T: MessageKind> ServerHandle<T> {
    pub(crate) fn new(shared: Arc<ServerShared<T>>) -> Self {
        Self { shared }
    }
}

impl<T: MessageKind> Clone for ServerHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: MessageKind> std::fmt::Debug for ServerHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("clients", &self.shared.client_ids())
            .finish()
    }
}

impl<T: MessageKind> ClientRegistry<T> for ServerHandle<T> {
    fn client_count(&self) -> usize {
        self.shared.client_count()
    }

    fn client_ids(&self) -> Vec<u32> {
        self.shared.client_ids()
    }

    fn connection(&self, id: u32) -> Option<Arc<Connection<T>>> {
        self.shared.connection(id)
    }

    fn send_to(&self, id: u32, message: Message<T>) -> bool {
        self.shared.send_to(id, message)
    }

    fn broadcast(&self, message: &Message<T>, exclude: Option<u32>) -> usize {
        self.shared.broadcast(message, exclude)
    }

    fn disconnect(&self, id: u32) -> bool {
        self.shared.disconnect(id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
