//! Blocking, thread-safe double-ended queue with cooperative shutdown.
//!
//! # How the dispatch loop uses it (for beginners)
//!
//! Many reactor threads push decoded messages into one [`TsQueue`]; a single
//! consumer thread sleeps in [`TsQueue::wait`] until there is something to do.
//! `wait()` wakes for two different reasons, data or shutdown, so the consumer
//! always re-checks emptiness after waking:
//!
//! ```rust
//! use std::sync::Arc;
//! use wirenet_core::TsQueue;
//!
//! let queue = Arc::new(TsQueue::new());
//! queue.push_back(1);
//! queue.push_back(2);
//! queue.try_exit();
//!
//! let mut seen = Vec::new();
//! loop {
//!     queue.wait();
//!     match queue.pop_front() {
//!         Some(item) => seen.push(item),
//!         None if queue.is_exiting() => break,
//!         None => continue,
//!     }
//! }
//! assert_eq!(seen, vec![1, 2]);
//! ```
//!
//! Items still queued when [`TsQueue::try_exit`] is called remain retrievable,
//! so the consumer drains them before observing "empty and exiting".

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

struct State<T> {
    items: VecDeque<T>,
    exiting: bool,
}

/// A mutex-guarded deque paired with a condition variable.
///
/// All operations take `&self` and are safe to call from any number of
/// threads. Share it with `Arc<TsQueue<T>>`.
pub struct TsQueue<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

impl<T> TsQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                exiting: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Appends `item` at the back and wakes one waiter.
    pub fn push_back(&self, item: T) {
        self.state.lock().items.push_back(item);
        self.ready.notify_one();
    }

    /// Inserts `item` at the front and wakes one waiter.
    pub fn push_front(&self, item: T) {
        self.state.lock().items.push_front(item);
        self.ready.notify_one();
    }

    pub fn pop_front(&self) -> Option<T> {
        self.state.lock().items.pop_front()
    }

    pub fn pop_back(&self) -> Option<T> {
        self.state.lock().items.pop_back()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn count(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Drops every queued item. Does not affect the exiting flag.
    pub fn clear(&self) {
        self.state.lock().items.clear();
    }

    /// Blocks until the queue is non-empty or [`try_exit`](Self::try_exit)
    /// has been called.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while state.items.is_empty() && !state.exiting {
            self.ready.wait(&mut state);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// Returns `true` if the queue is non-empty or exiting when it returns.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if state.items.is_empty() && !state.exiting {
            // Spurious wakeups are fine here: callers re-check anyway.
            let _ = self.ready.wait_for(&mut state, timeout);
        }
        !state.items.is_empty() || state.exiting
    }

    /// Flips the shutdown flag and wakes every waiter. Idempotent.
    ///
    /// Queued items are left in place.
    pub fn try_exit(&self) {
        self.state.lock().exiting = true;
        self.ready.notify_all();
    }

    pub fn is_exiting(&self) -> bool {
        self.state.lock().exiting
    }
}

impl<T: Clone> TsQueue<T> {
    /// Returns a clone of the front item without removing it.
    pub fn front(&self) -> Option<T> {
        self.state.lock().items.front().cloned()
    }

    /// Returns a clone of the back item without removing it.
    pub fn back(&self) -> Option<T> {
        self.state.lock().items.back().cloned()
    }
}

impl<T> Default for TsQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TsQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TsQueue")
            .field("count", &state.items.len())
            .field("exiting", &state.exiting)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
