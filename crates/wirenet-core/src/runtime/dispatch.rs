//! The dispatch thread: drains the shared inbound queue into a handler.
//!
//! All message handling for an interface runs on this one thread, in the
//! order messages entered the queue. A slow handler therefore delays every
//! connection, not just its own. The inbound queue is unbounded, so a handler
//! that cannot keep up lets it grow without limit.

use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::connection::{InboundQueue, OwnedMessage};
use crate::error::NetError;
use crate::protocol::message::MessageKind;

/// Receives every inbound message, one at a time, on the dispatch thread.
///
/// Closures of the form `FnMut(OwnedMessage<T>)` implement this trait.
#[cfg_attr(test, mockall::automock)]
pub trait MessageHandler<T: MessageKind>: Send + 'static {
    fn handle(&mut self, message: OwnedMessage<T>);
}

impl<T, F> MessageHandler<T> for F
where
    T: MessageKind,
    F: FnMut(OwnedMessage<T>) + Send + 'static,
{
    fn handle(&mut self, message: OwnedMessage<T>) {
        self(message)
    }
}

/// Owns the dispatch thread for one inbound queue.
///
/// [`shutdown`](Self::shutdown) signals the queue, lets the thread drain every
/// message already queued, and hands the handler back.
pub struct Dispatcher<T: MessageKind, H: MessageHandler<T>> {
    queue: InboundQueue<T>,
    thread: Option<JoinHandle<H>>,
}

impl<T: MessageKind, H: MessageHandler<T>> Dispatcher<T, H> {
    /// Spawns the dispatch thread.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Runtime`] if the thread cannot be spawned.
    pub fn start(queue: InboundQueue<T>, handler: H) -> Result<Self, NetError> {
        let worker_queue = Arc::clone(&queue);
        let thread = std::thread::Builder::new()
            .name("wirenet-dispatch".to_owned())
            .spawn(move || run(worker_queue, handler))
            .map_err(NetError::Runtime)?;
        Ok(Self {
            queue,
            thread: Some(thread),
        })
    }

    pub fn queue(&self) -> &InboundQueue<T> {
        &self.queue
    }

    /// Stops the thread after it has drained the queue.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::ThreadPanicked`] if the handler panicked.
    pub fn shutdown(mut self) -> Result<H, NetError> {
        self.queue.try_exit();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| NetError::ThreadPanicked("dispatch")),
            // Only reachable through Drop, which never calls this.
            None => Err(NetError::ThreadPanicked("dispatch")),
        }
    }
}

impl<T: MessageKind, H: MessageHandler<T>> Drop for Dispatcher<T, H> {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.queue.try_exit();
            if thread.join().is_err() {
                warn!("dispatch thread panicked");
            }
        }
    }
}

fn run<T: MessageKind, H: MessageHandler<T>>(queue: InboundQueue<T>, mut handler: H) -> H {
    debug!("dispatch thread started");
    loop {
        queue.wait();
        while let Some(message) = queue.pop_front() {
            handler.handle(message);
        }
        if queue.is_exiting() && queue.is_empty() {
            break;
        }
    }
    debug!("dispatch thread drained and stopped");
    handler
}

// ── Tests ─────────────────────────────────────────────────────────────────────
