//! Persistent storage for the client: configuration only.

pub mod config;
