//! Infrastructure layer for the client.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `wirenet_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`network`** – [`ClientInterface`](network::ClientInterface): the
//!   client's reactor thread, its single connection, and the inbound queue.
//!
//! - **`storage`** – TOML configuration (`ClientConfig`).

pub mod network;
pub mod storage;
