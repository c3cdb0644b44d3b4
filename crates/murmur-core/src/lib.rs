//! # murmur-core
//!
//! Core types for the Murmur autonomous posting agent.
//!
//! Murmur periodically generates a note and publishes it to a pub/sub network of
//! relays, while listening for private messages that either reconfigure it
//! (`!`-prefixed commands) or steer its next note (free-form guidance).
//!
//! This crate holds what every other crate needs:
//! - The unified [`MurmurError`] taxonomy
//! - [`MurmurConfig`], loaded from `murmur.toml`
//! - Artifact and inbound message types
//! - Input sanitization and fail-open helpers

pub mod config;
mod error;
pub mod fail_open;
pub mod sanitize;
mod types;

pub use config::MurmurConfig;
pub use error::{MurmurError, Result};
pub use types::*;
