//! Network infrastructure for the client.
//!
//! [`ClientInterface`] wraps exactly one [`Connection`] in the initiator role.
//! Everything socket-related runs on the interface's own reactor thread;
//! `connect` is awaited from the caller's runtime and simply waits for that
//! reactor to finish dialing and the handshake.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use wirenet_core::{
    connect_with_retry, Connection, ConnectionOwner, Dispatcher, ErrorKind, InboundQueue, Message,
    MessageHandler, MessageKind, NetError, Reactor, RetryPolicy, Role, TsQueue,
    CLIENT_CONNECTION_ID,
};

use crate::application::{DisconnectHook, LogDisconnect};

static CLIENT_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Forwards connection failures to the application's hook.
struct ClientOwner {
    hook: Box<dyn DisconnectHook>,
}

impl<T: MessageKind> ConnectionOwner<T> for ClientOwner {
    fn on_error(&self, _conn: &Arc<Connection<T>>, kind: ErrorKind) {
        self.hook.disconnect_server(kind);
    }
}

/// One client connection plus the thread that drives it.
pub struct ClientInterface<T: MessageKind> {
    reactor: Reactor,
    inbound: InboundQueue<T>,
    policy: RetryPolicy,
    connect_called: AtomicBool,
    connection: Mutex<Option<Arc<Connection<T>>>>,
    owner: Arc<ClientOwner>,
}

impl<T: MessageKind> ClientInterface<T> {
    /// Starts the client's reactor thread with a hook that only logs.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Runtime`] if the reactor cannot be started.
    pub fn new(policy: RetryPolicy) -> Result<Self, NetError> {
        Self::with_hook(policy, LogDisconnect)
    }

    /// Starts the client's reactor thread; `hook` is told about the first
    /// connection failure.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Runtime`] if the reactor cannot be started.
    pub fn with_hook(policy: RetryPolicy, hook: impl DisconnectHook) -> Result<Self, NetError> {
        let seq = CLIENT_SEQ.fetch_add(1, Ordering::Relaxed);
        let reactor = Reactor::start(format!("wirenet-client-{seq}"))?;
        Ok(Self {
            reactor,
            inbound: Arc::new(TsQueue::new()),
            policy,
            connect_called: AtomicBool::new(false),
            connection: Mutex::new(None),
            owner: Arc::new(ClientOwner {
                hook: Box::new(hook),
            }),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Resolves `host`, connects (with retries), and runs the handshake.
    ///
    /// May be called once per instance; build a new `ClientInterface` to
    /// reconnect. On failure the disconnect hook has already been called by
    /// the time this returns.
    ///
    /// # Errors
    ///
    /// - [`NetError::AlreadyConnected`] on a second call.
    /// - [`NetError::Resolve`] / [`NetError::NoAddress`] if `host` does not
    ///   resolve.
    /// - [`NetError::Connection`] with `connection_error` if every connect
    ///   attempt failed, or with the handshake step's kind if the server
    ///   denied or failed us.
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), NetError> {
        if self.connect_called.swap(true, Ordering::AcqRel) {
            return Err(NetError::AlreadyConnected);
        }

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|source| NetError::Resolve {
                host: host.to_owned(),
                port,
                source,
            })?
            .collect();
        if addrs.is_empty() {
            return Err(NetError::NoAddress {
                host: host.to_owned(),
                port,
            });
        }

        let owner = Arc::downgrade(&self.owner);
        let owner: Weak<dyn ConnectionOwner<T>> = owner;
        let conn = Connection::new(
            CLIENT_CONNECTION_ID,
            Role::Initiator,
            self.reactor.clone(),
            Arc::clone(&self.inbound),
            owner,
        );
        *self.connection.lock() = Some(Arc::clone(&conn));

        let policy = self.policy;
        let owner = Arc::clone(&self.owner);
        let task = self.reactor.spawn(async move {
            let stream = match connect_with_retry(&addrs, policy).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("could not reach {addrs:?} after {} attempt(s): {e}", policy.attempts());
                    conn.close();
                    owner.hook.disconnect_server(ErrorKind::Connection);
                    return Err(ErrorKind::Connection);
                }
            };
            conn.initiate(stream).await
        });

        match task.await {
            Ok(Ok(())) => {
                info!("connected to {host}:{port}");
                Ok(())
            }
            Ok(Err(kind)) => Err(NetError::Connection { kind }),
            Err(e) if e.is_cancelled() => Err(NetError::NotConnected),
            Err(_) => Err(NetError::ThreadPanicked("client reactor")),
        }
    }

    /// Queues `message` for the server.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::NotConnected`] before `connect` or after the
    /// connection has been released.
    pub fn send(&self, message: Message<T>) -> Result<(), NetError> {
        let conn = self.connection.lock().clone().ok_or(NetError::NotConnected)?;
        if conn.send(message) {
            Ok(())
        } else {
            Err(NetError::NotConnected)
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .as_ref()
            .is_some_and(|conn| conn.is_connected())
    }

    /// Messages received from the server, in arrival order.
    pub fn incoming(&self) -> &InboundQueue<T> {
        &self.inbound
    }

    /// Starts a dispatch thread that feeds every incoming message to
    /// `handler`. Use either this or [`incoming`](Self::incoming), not both.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Runtime`] if the thread cannot be spawned.
    pub fn start_dispatch<H: MessageHandler<T>>(&self, handler: H) -> Result<Dispatcher<T, H>, NetError> {
        Dispatcher::start(Arc::clone(&self.inbound), handler)
    }

    /// Closes the connection and stops the reactor thread.
    ///
    /// Does not call the disconnect hook. When called from the reactor thread
    /// itself (for example from inside the hook) only the connection is
    /// closed; the thread is stopped when the interface is dropped.
    pub fn disconnect(&self) {
        if let Some(conn) = self.connection.lock().as_ref() {
            conn.close();
        }
        if std::thread::current().name() == Some(self.reactor.name()) {
            debug!("disconnect called on the client reactor; deferring stop");
            return;
        }
        if let Err(e) = self.reactor.stop() {
            warn!("client reactor stop failed: {e}");
        }
    }
}

impl<T: MessageKind> Drop for ClientInterface<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<T: MessageKind> std::fmt::Debug for ClientInterface<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientInterface")
            .field("reactor", &self.reactor)
            .field("connected", &self.is_connected())
            .field("pending_inbound", &self.inbound.count())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
