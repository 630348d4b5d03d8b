//! Network infrastructure for the server.
//!
//! # Sub-modules
//!
//! - **`registry`** – The ID → connection table shared by the accept loop,
//!   the reactor threads, and the dispatch thread. Implements broadcast and
//!   the exactly-once disconnect bookkeeping.
//!
//! - **`server`** – Binds the listener, runs the accept loop on its own
//!   reactor, hands accepted sockets to the pool round-robin, and owns the
//!   dispatch thread. [`RunningServer::shutdown`] tears all of it down in
//!   order.

pub mod registry;
pub mod server;

pub use registry::ServerHandle;
pub use server::{RunningServer, Server};
