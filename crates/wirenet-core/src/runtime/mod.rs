//! Concurrency scaffolding: reactor threads and the dispatch thread.

pub mod dispatch;
pub mod reactor;

pub use dispatch::{Dispatcher, MessageHandler};
pub use reactor::{default_pool_size, Reactor, ReactorPool, RESERVED_THREADS};
