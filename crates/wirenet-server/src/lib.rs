//! wirenet-server library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.

pub mod application;
pub mod infrastructure;

pub use application::{ClientRegistry, ServerHandler};
pub use infrastructure::network::{RunningServer, Server, ServerHandle};
pub use infrastructure::storage::config::{ConfigError, ServerConfig};
