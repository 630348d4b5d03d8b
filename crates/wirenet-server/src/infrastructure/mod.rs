//! Infrastructure layer for the server.
//!
//! Contains the OS-facing adapters: the TCP listener and connection registry,
//! and file-system storage for the server configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `wirenet_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
