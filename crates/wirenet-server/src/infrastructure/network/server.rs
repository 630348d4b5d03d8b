//! Listener, accept loop, and server lifecycle.
//!
//! # Threads (for beginners)
//!
//! A running server owns:
//!
//! ```text
//! wirenet-accept     one reactor: accept loop only
//! wirenet-io-0..N    pool reactors: handshakes + read/write pipelines
//! wirenet-dispatch   plain thread: ServerHandler::on_message, one at a time
//! ```
//!
//! The pool is started before the listener starts accepting, and
//! [`RunningServer::shutdown`] stops things in the reverse order: accept
//! loop, client connections, pool, dispatch thread (after it drained every
//! queued message).
//!
//! The accept loop backs off exponentially while `accept` keeps failing (for
//! example when the process is out of file descriptors). Once the backoff
//! passes its limit the loop stops and the error is reported by
//! [`RunningServer::wait_for_signal`].

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wirenet_core::{Dispatcher, MessageKind, NetError, Reactor, ReactorPool, TsQueue};

use super::registry::{ServerDispatch, ServerHandle, ServerShared};
use crate::application::ServerHandler;
use crate::infrastructure::storage::config::ServerConfig;

/// A configured, not yet listening server.
pub struct Server<T: MessageKind> {
    config: ServerConfig,
    handler: Arc<dyn ServerHandler<T>>,
}

impl<T: MessageKind> Server<T> {
    pub fn new(config: ServerConfig, handler: Arc<dyn ServerHandler<T>>) -> Self {
        Self { config, handler }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the listener and starts every server thread.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Bind`] if the address cannot be bound, or
    /// [`NetError::Runtime`] if a reactor or the dispatch thread cannot be
    /// started. Threads started before the failure are stopped again.
    pub fn start(self) -> Result<RunningServer<T>, NetError> {
        let addr = self.config.socket_addr();
        let listener = std::net::TcpListener::bind(addr).map_err(|source| NetError::Bind { addr, source })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let pool = ReactorPool::new("wirenet-io", self.config.pool_size())?;
        let shared = Arc::new(ServerShared::new(
            self.handler,
            self.config.first_connection_id,
            pool,
            Arc::new(TsQueue::new()),
        ));

        let dispatcher = match Dispatcher::start(
            Arc::clone(shared.inbound()),
            ServerDispatch::new(Arc::clone(&shared)),
        ) {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                let _ = shared.pool().stop();
                return Err(e);
            }
        };

        let accept_reactor = match Reactor::start("wirenet-accept") {
            Ok(reactor) => reactor,
            Err(e) => {
                let _ = shared.pool().stop();
                return Err(e);
            }
        };

        let listener = {
            let _guard = accept_reactor.handle().enter();
            TcpListener::from_std(listener)
        };
        let listener = match listener {
            Ok(listener) => listener,
            Err(e) => {
                let _ = accept_reactor.stop();
                let _ = shared.pool().stop();
                return Err(NetError::Io(e));
            }
        };

        let stop_accepting = CancellationToken::new();
        let (failed_tx, failed_rx) = oneshot::channel();
        accept_reactor.spawn(accept_loop(
            listener,
            Arc::clone(&shared),
            stop_accepting.clone(),
            AcceptBackoff::default(),
            failed_tx,
        ));
        info!(%local_addr, reactors = shared.pool().len(), "server started");

        Ok(RunningServer {
            local_addr,
            shared,
            accept_reactor,
            stop_accepting,
            accept_failed: Some(failed_rx),
            dispatcher: Some(dispatcher),
        })
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Pause schedule for a failing listener: starts at `initial`, doubles after
/// every failure, and gives up once it would exceed `limit`.
#[derive(Debug, Clone, Copy)]
struct AcceptBackoff {
    initial: Duration,
    limit: Duration,
}

impl Default for AcceptBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(10),
            limit: Duration::from_millis(2560),
        }
    }
}

/// Calls `accept` until it succeeds, sleeping between failures.
///
/// # Errors
///
/// Returns the last error once the backoff passes its limit.
async fn accept_with_backoff<S, F, Fut>(mut accept: F, backoff: AcceptBackoff) -> io::Result<S>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<S>>,
{
    let mut pause = backoff.initial;
    loop {
        match accept().await {
            Ok(accepted) => return Ok(accepted),
            Err(e) if pause > backoff.limit => return Err(e),
            Err(e) => {
                warn!(retry_in = ?pause, "accept failed: {e}");
                tokio::time::sleep(pause).await;
                pause *= 2;
            }
        }
    }
}

async fn accept_loop<T: MessageKind>(
    listener: TcpListener,
    shared: Arc<ServerShared<T>>,
    stop: CancellationToken,
    backoff: AcceptBackoff,
    failed: oneshot::Sender<io::Error>,
) {
    let listener = &listener;
    loop {
        let accepted = tokio::select! {
            _ = stop.cancelled() => break,
            accepted = accept_with_backoff(move || listener.accept(), backoff) => accepted,
        };
        match accepted {
            Ok((socket, addr)) => {
                info!(%addr, "new connection");
                shared.admit(socket, addr);
            }
            Err(e) => {
                error!("accept loop giving up: {e}");
                let _ = failed.send(e);
                return;
            }
        }
    }
    debug!("accept loop stopped");
}

/// Resolves with the accept loop's terminal error. Never resolves if the
/// loop stopped normally.
async fn accept_failure(failed: Option<oneshot::Receiver<io::Error>>) -> io::Error {
    match failed {
        Some(rx) => match rx.await {
            Ok(e) => e,
            Err(_) => std::future::pending().await,
        },
        None => std::future::pending().await,
    }
}

// ── Running server ────────────────────────────────────────────────────────────

/// A listening server. Dropping it shuts it down.
pub struct RunningServer<T: MessageKind> {
    local_addr: SocketAddr,
    shared: Arc<ServerShared<T>>,
    accept_reactor: Reactor,
    stop_accepting: CancellationToken,
    accept_failed: Option<oneshot::Receiver<io::Error>>,
    dispatcher: Option<Dispatcher<T, ServerDispatch<T>>>,
}

impl<T: MessageKind> RunningServer<T> {
    /// Address the listener is actually bound to; useful with port `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle<T> {
        ServerHandle::new(Arc::clone(&self.shared))
    }

    /// Stops accepting, disconnects every client, stops the pool, and drains
    /// the dispatch thread.
    ///
    /// Blocking; do not call from a reactor thread.
    ///
    /// # Errors
    ///
    /// Returns the first [`NetError::ThreadPanicked`] seen while joining.
    pub fn shutdown(mut self) -> Result<(), NetError> {
        self.stop()
    }

    /// Waits for Ctrl-C or for the accept loop to give up, then shuts down.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Accept`] if the listener kept failing,
    /// [`NetError::Io`] if the signal handler cannot be installed, or
    /// whatever [`shutdown`](Self::shutdown) returns.
    pub async fn wait_for_signal(mut self) -> Result<(), NetError> {
        let accept_failed = self.accept_failed.take();
        let reason = tokio::select! {
            signal = tokio::signal::ctrl_c() => signal.map_err(NetError::Io),
            e = accept_failure(accept_failed) => Err(NetError::Accept(e)),
        };
        match &reason {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => error!("shutting down: {e}"),
        }
        let stopped = tokio::task::spawn_blocking(move || self.shutdown())
            .await
            .map_err(|_| NetError::ThreadPanicked("shutdown"))?;
        reason.and(stopped)
    }

    fn stop(&mut self) -> Result<(), NetError> {
        let Some(dispatcher) = self.dispatcher.take() else {
            return Ok(());
        };
        info!("server stopping");

        self.stop_accepting.cancel();
        let mut first_error = self.accept_reactor.stop().err();

        let dropped = self.shared.disconnect_all();
        debug!(dropped, "clients disconnected");

        if let Err(e) = self.shared.pool().stop() {
            first_error.get_or_insert(e);
        }
        if let Err(e) = dispatcher.shutdown() {
            first_error.get_or_insert(e);
        }
        match first_error {
            Some(e) => {
                error!("server stopped with error: {e}");
                Err(e)
            }
            None => {
                info!("server stopped");
                Ok(())
            }
        }
    }
}

impl<T: MessageKind> Drop for RunningServer<T> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl<T: MessageKind> std::fmt::Debug for RunningServer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningServer")
            .field("local_addr", &self.local_addr)
            .field("clients", &self.handle())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
