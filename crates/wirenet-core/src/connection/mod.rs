//! Connection engine shared by the acceptor (server) and initiator (client)
//! roles.
//!
//! # Ownership (for beginners)
//!
//! A [`Connection`] lives behind an `Arc`. The server registry holds one
//! clone, the read and write pipeline tasks each hold one, and every
//! [`OwnedMessage`] the read loop produces on the acceptor side holds one
//! more. The socket is closed when the pipeline tasks finish, and the
//! `Connection` itself is freed when the last clone is dropped; no manual
//! reference counting is involved.
//!
//! # Lifecycle
//!
//! ```text
//! Connecting ─▶ HandshakePending ─▶ Active ─▶ Closing ─▶ Closed
//! ```
//!
//! States only move forward. `Closing` is entered on the first unrecoverable
//! error or an explicit [`Connection::close`]; `Closed` once every task that
//! touched the socket has finished.

pub mod pipeline;
pub mod retry;

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::ErrorKind;
use crate::protocol::handshake;
use crate::protocol::message::{Message, MessageKind};
use crate::queue::TsQueue;
use crate::runtime::reactor::Reactor;

pub use retry::{connect_with_retry, retry_connect, RetryPolicy};

/// ID carried by the single connection of an initiator.
pub const CLIENT_CONNECTION_ID: u32 = 0;

/// Shared inbound queue type: every connection of one interface pushes into it.
pub type InboundQueue<T> = Arc<TsQueue<OwnedMessage<T>>>;

/// Which side of the handshake a connection plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Dials out and answers the challenge (client side).
    Initiator,
    /// Was accepted by a listener and issues the challenge (server side).
    Acceptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    HandshakePending = 1,
    Active = 2,
    Closing = 3,
    Closed = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::HandshakePending,
            2 => ConnectionState::Active,
            3 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// A decoded inbound message together with the connection that produced it.
///
/// `sender` is set for messages read by an acceptor, so the handler can reply
/// without a registry lookup, and is `None` on the initiator side.
pub struct OwnedMessage<T: MessageKind> {
    pub sender: Option<Arc<Connection<T>>>,
    pub message: Message<T>,
}

impl<T: MessageKind> fmt::Debug for OwnedMessage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedMessage")
            .field("sender", &self.sender.as_ref().map(|c| c.id()))
            .field("message", &self.message)
            .finish()
    }
}

/// Role-specific reaction to connection events.
///
/// The server implements this to keep its registry in sync; the client
/// implements it to forward failures to its disconnect hook. Both hooks run
/// on the connection's reactor thread.
pub trait ConnectionOwner<T: MessageKind>: Send + Sync {
    /// Called exactly once, for the first unrecoverable error.
    fn on_error(&self, conn: &Arc<Connection<T>>, kind: ErrorKind);

    /// Called on the acceptor side after the peer passed the challenge and
    /// before the pipelines start.
    fn on_validated(&self, _conn: &Arc<Connection<T>>) {}
}

/// One framed, handshaked TCP connection.
pub struct Connection<T: MessageKind> {
    id: u32,
    role: Role,
    peer_addr: OnceLock<SocketAddr>,
    state: AtomicU8,
    released: AtomicBool,
    live_tasks: AtomicUsize,
    outbound_tx: mpsc::UnboundedSender<Message<T>>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Message<T>>>>,
    shutdown: CancellationToken,
    reactor: Reactor,
    inbound: InboundQueue<T>,
    owner: Weak<dyn ConnectionOwner<T>>,
}

impl<T: MessageKind> Connection<T> {
    /// Creates a connection bound to `reactor`. No I/O happens until
    /// [`accept`](Self::accept) or [`initiate`](Self::initiate).
    pub fn new(
        id: u32,
        role: Role,
        reactor: Reactor,
        inbound: InboundQueue<T>,
        owner: Weak<dyn ConnectionOwner<T>>,
    ) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            id,
            role,
            peer_addr: OnceLock::new(),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            released: AtomicBool::new(false),
            live_tasks: AtomicUsize::new(0),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            shutdown: CancellationToken::new(),
            reactor,
            inbound,
            owner,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr.get().copied()
    }

    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    /// `true` while the socket is open and the connection is not marked for
    /// release.
    pub fn is_connected(&self) -> bool {
        !self.is_released()
            && matches!(
                self.state(),
                ConnectionState::HandshakePending | ConnectionState::Active
            )
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Marks the connection so further [`send`](Self::send) calls are refused.
    ///
    /// Returns `true` for the call that actually flipped the flag.
    pub fn mark_released(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }

    /// Queues `message` for the write pipeline. Callable from any thread.
    ///
    /// Returns `false` if the connection is marked for release. Never blocks.
    pub fn send(&self, message: Message<T>) -> bool {
        if self.is_released() {
            trace!(conn_id = self.id, "send refused: connection released");
            return false;
        }
        self.outbound_tx.send(message).is_ok()
    }

    /// Requests an orderly close: refuses new sends and stops both pipelines.
    ///
    /// Does not invoke the owner's error hook.
    pub fn close(&self) {
        self.released.store(true, Ordering::Release);
        if self.advance(ConnectionState::Closing) {
            debug!(conn_id = self.id, "closing connection");
        }
        self.shutdown.cancel();
    }

    // ── Handshake entry points ───────────────────────────────────────────────

    /// Runs the acceptor handshake on the connection's reactor, then the
    /// steady-state pipelines.
    ///
    /// `socket` must be in non-blocking mode (as returned by
    /// `tokio::net::TcpStream::into_std`).
    pub fn accept(self: &Arc<Self>, socket: std::net::TcpStream, admitted: bool) {
        let conn = Arc::clone(self);
        self.reactor.spawn(async move {
            let mut stream = match TcpStream::from_std(socket) {
                Ok(stream) => stream,
                Err(e) => {
                    conn.fail(ErrorKind::WriteAccepted, Some(e));
                    conn.advance(ConnectionState::Closed);
                    return;
                }
            };
            if let Ok(addr) = stream.peer_addr() {
                let _ = conn.peer_addr.set(addr);
            }
            conn.advance(ConnectionState::HandshakePending);

            let challenge = handshake::generate_challenge();
            let result = tokio::select! {
                _ = conn.shutdown.cancelled() => {
                    conn.advance(ConnectionState::Closed);
                    return;
                }
                result = handshake::accept(&mut stream, admitted, challenge) => result,
            };

            match result {
                Ok(()) => {
                    info!(conn_id = conn.id, "client validated");
                    if let Some(owner) = conn.owner.upgrade() {
                        owner.on_validated(&conn);
                    }
                    conn.start_pipelines(stream);
                }
                // The owner already logged the denial.
                Err(e) if e.kind == ErrorKind::BadAccepted => {
                    conn.fail(e.kind, e.source);
                    conn.advance(ConnectionState::Closed);
                }
                Err(e) => {
                    warn!(conn_id = conn.id, "client failed validation: {}", e.kind);
                    conn.fail(e.kind, e.source);
                    conn.advance(ConnectionState::Closed);
                }
            }
        });
    }

    /// Runs the initiator handshake on an already connected stream and, on
    /// success, starts the pipelines. Must be awaited on this connection's
    /// reactor.
    ///
    /// # Errors
    ///
    /// Returns the failing step's [`ErrorKind`]; the owner's error hook has
    /// already been called by then.
    pub async fn initiate(self: &Arc<Self>, mut stream: TcpStream) -> Result<(), ErrorKind> {
        if let Ok(addr) = stream.peer_addr() {
            let _ = self.peer_addr.set(addr);
        }
        self.advance(ConnectionState::HandshakePending);

        let result = tokio::select! {
            _ = self.shutdown.cancelled() => {
                self.advance(ConnectionState::Closed);
                return Err(ErrorKind::Connection);
            }
            result = handshake::initiate(&mut stream) => result,
        };

        match result {
            Ok(()) => {
                info!(conn_id = self.id, "handshake passed");
                self.start_pipelines(stream);
                Ok(())
            }
            Err(e) => {
                let kind = e.kind;
                warn!(conn_id = self.id, "handshake failed: {kind}");
                self.fail(kind, e.source);
                self.advance(ConnectionState::Closed);
                Err(kind)
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn start_pipelines(self: &Arc<Self>, stream: TcpStream) {
        let Some(outbound_rx) = self.outbound_rx.lock().take() else {
            warn!(conn_id = self.id, "pipelines already started");
            return;
        };
        if !self.advance(ConnectionState::Active) {
            // Closed while the handshake was finishing.
            self.advance(ConnectionState::Closed);
            return;
        }
        let (reader, writer) = stream.into_split();
        self.live_tasks.store(2, Ordering::Release);
        self.reactor
            .spawn(pipeline::read_loop(Arc::clone(self), reader));
        self.reactor
            .spawn(pipeline::write_loop(Arc::clone(self), writer, outbound_rx));
    }

    /// Wraps a decoded message for the inbound queue.
    pub(crate) fn package(self: &Arc<Self>, message: Message<T>) -> OwnedMessage<T> {
        let sender = match self.role {
            Role::Acceptor => Some(Arc::clone(self)),
            Role::Initiator => None,
        };
        OwnedMessage { sender, message }
    }

    pub(crate) fn inbound(&self) -> &InboundQueue<T> {
        &self.inbound
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// First-failure handling: release, stop the pipelines, notify the owner.
    ///
    /// Errors that surface after an explicit [`close`](Self::close) or an
    /// earlier failure are ignored.
    pub(crate) fn fail(self: &Arc<Self>, kind: ErrorKind, source: Option<io::Error>) {
        if !self.advance(ConnectionState::Closing) {
            return;
        }
        match &source {
            Some(e) => warn!(conn_id = self.id, "{kind}: {e}"),
            None => debug!(conn_id = self.id, "{kind}"),
        }
        self.released.store(true, Ordering::Release);
        self.shutdown.cancel();
        if let Some(owner) = self.owner.upgrade() {
            owner.on_error(self, kind);
        }
    }

    /// Called by each pipeline task as it exits.
    pub(crate) fn finish_task(&self) {
        if self.live_tasks.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.advance(ConnectionState::Closed);
            debug!(conn_id = self.id, "connection closed");
        }
    }

    /// Moves the state forward to `to`. Returns `false` if it was already
    /// there or beyond.
    fn advance(&self, to: ConnectionState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < to as u8).then_some(to as u8)
            })
            .is_ok()
    }
}

impl<T: MessageKind> fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("state", &self.state())
            .field("released", &self.is_released())
            .finish()
    }
}

impl<T: MessageKind> Drop for Connection<T> {
    fn drop(&mut self) {
        trace!(conn_id = self.id, "connection destroyed");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
