//! Persistent storage for server settings.

pub mod config;
