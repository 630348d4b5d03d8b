//! Single-threaded event loops and the round-robin pool that owns them.
//!
//! Each [`Reactor`] is a tokio `current_thread` runtime driven by its own OS
//! thread, so futures spawned on one reactor never run concurrently with each
//! other. Work is spawned through a [`TaskTracker`]; [`Reactor::stop`] drops
//! the keep-alive token and the thread exits once every tracked task is done.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::NetError;

/// Threads kept out of the default pool size: one for the accept loop and
/// one for the dispatch thread.
pub const RESERVED_THREADS: usize = 2;

/// Default pool size for this machine: hardware parallelism minus
/// [`RESERVED_THREADS`], never less than one.
pub fn default_pool_size() -> usize {
    num_cpus::get().saturating_sub(RESERVED_THREADS).max(1)
}

struct ReactorInner {
    name: String,
    handle: Handle,
    tracker: TaskTracker,
    keep_alive: CancellationToken,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to one single-threaded event loop. Cheap to clone.
#[derive(Clone)]
pub struct Reactor {
    inner: Arc<ReactorInner>,
}

impl Reactor {
    /// Builds the runtime and starts its driver thread.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Runtime`] if the runtime or the thread cannot be
    /// created.
    pub fn start(name: impl Into<String>) -> Result<Self, NetError> {
        let name = name.into();
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(NetError::Runtime)?;
        let handle = runtime.handle().clone();
        let tracker = TaskTracker::new();
        let keep_alive = CancellationToken::new();

        let thread = {
            let tracker = tracker.clone();
            let keep_alive = keep_alive.clone();
            let thread_name = name.clone();
            std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    debug!(reactor = %thread_name, "reactor started");
                    runtime.block_on(async move {
                        keep_alive.cancelled().await;
                        tracker.close();
                        tracker.wait().await;
                    });
                    debug!(reactor = %thread_name, "reactor stopped");
                })
                .map_err(NetError::Runtime)?
        };

        Ok(Self {
            inner: Arc::new(ReactorInner {
                name,
                handle,
                tracker,
                keep_alive,
                thread: Mutex::new(Some(thread)),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Runtime handle, for registering sockets with this reactor's driver.
    pub fn handle(&self) -> &Handle {
        &self.inner.handle
    }

    /// Spawns `future` on this reactor and tracks it.
    ///
    /// Tracked tasks keep the reactor thread alive after [`stop`](Self::stop)
    /// until they finish.
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.tracker.spawn_on(future, &self.inner.handle)
    }

    /// Number of tracked tasks still running.
    pub fn pending(&self) -> usize {
        self.inner.tracker.len()
    }

    pub fn is_running(&self) -> bool {
        !self.inner.keep_alive.is_cancelled()
    }

    /// Releases the keep-alive token and joins the driver thread.
    ///
    /// Blocks until every tracked task has completed, so callers close their
    /// connections first. Calling it more than once is a no-op. Must not be
    /// called from this reactor's own thread.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::ThreadPanicked`] if the driver thread panicked.
    pub fn stop(&self) -> Result<(), NetError> {
        self.inner.keep_alive.cancel();
        let thread = self.inner.thread.lock().take();
        if let Some(thread) = thread {
            thread.join().map_err(|_| {
                warn!(reactor = %self.inner.name, "reactor thread panicked");
                NetError::ThreadPanicked("reactor")
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("name", &self.inner.name)
            .field("running", &self.is_running())
            .finish()
    }
}

// ── Pool ──────────────────────────────────────────────────────────────────────

/// Fixed-size set of reactors handed out round-robin.
#[derive(Debug)]
pub struct ReactorPool {
    reactors: Vec<Reactor>,
    next: AtomicUsize,
}

impl ReactorPool {
    /// Starts `size` reactors (at least one), named `{prefix}-{index}`.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Runtime`] if any reactor fails to start; reactors
    /// already started are stopped again.
    pub fn new(prefix: &str, size: usize) -> Result<Self, NetError> {
        let size = size.max(1);
        let mut reactors = Vec::with_capacity(size);
        for index in 0..size {
            match Reactor::start(format!("{prefix}-{index}")) {
                Ok(reactor) => reactors.push(reactor),
                Err(e) => {
                    for reactor in &reactors {
                        let _ = reactor.stop();
                    }
                    return Err(e);
                }
            }
        }
        debug!(size, "reactor pool started");
        Ok(Self {
            reactors,
            next: AtomicUsize::new(0),
        })
    }

    /// Starts a pool sized by [`default_pool_size`].
    pub fn with_default_size(prefix: &str) -> Result<Self, NetError> {
        Self::new(prefix, default_pool_size())
    }

    /// Returns the next reactor in round-robin order.
    pub fn next(&self) -> &Reactor {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.reactors.len();
        &self.reactors[index]
    }

    pub fn len(&self) -> usize {
        self.reactors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactors.is_empty()
    }

    /// Stops every reactor, returning the first error after trying them all.
    pub fn stop(&self) -> Result<(), NetError> {
        let mut first_error = None;
        for reactor in &self.reactors {
            if let Err(e) = reactor.stop() {
                first_error.get_or_insert(e);
            }
        }
        debug!("reactor pool stopped");
        first_error.map_or(Ok(()), Err)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
