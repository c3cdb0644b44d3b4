//! # murmur-agent
//!
//! Resilience primitives and the publish path for Murmur.
//!
//! - [`CircuitBreaker`]: tri-state guard around unreliable upstream calls
//! - [`RateLimiter`]: per-identity sliding-window admission
//! - [`ContentDeduplicator`]: bounded exact-match fingerprint cache
//! - [`RetryingPublisher`]: bounded retries with exponential backoff
//!
//! Upstream services are reached through the [`ContentGenerator`] and
//! [`Transport`] traits so they can be swapped for the scripted mocks in
//! [`mock`] during tests.

mod auth;
mod circuit_breaker;
mod dedup;
mod generator;
pub mod mock;
mod publisher;
mod rate_limiter;
mod transport;
mod types;

pub use auth::get_api_key;
pub use circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitState};
pub use dedup::{fingerprint, normalize_content, ContentDeduplicator, MatchPolicy};
pub use generator::{ChatCompletionsGenerator, ContentGenerator};
pub use publisher::{
    next_step, validate_artifact, AttemptOutcome, NextStep, PublishLimits, PublishReceipt,
    RetryPolicy, RetryingPublisher,
};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use transport::Transport;
