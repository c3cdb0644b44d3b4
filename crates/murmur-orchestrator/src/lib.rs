//! # murmur-orchestrator
//!
//! Runtime composition for the Murmur posting agent.
//!
//! This crate provides:
//! - Shared runtime state (interval, running flag, prompt, last post)
//! - The generate, deduplicate, publish pipeline
//! - The timer-driven posting loop
//! - Command and guidance dispatch for inbound private messages
//! - The agent supervisor running both loops

mod agent;
mod dispatcher;
mod inbox;
mod pipeline;
mod posting_loop;
mod runtime;
pub mod testing;

pub use agent::Agent;
pub use dispatcher::{AccessPolicy, Command, GuidanceDispatcher};
pub use inbox::{Inbox, Responder};
pub use pipeline::PostPipeline;
pub use posting_loop::PostingLoop;
pub use runtime::{AgentRuntime, RuntimeSnapshot};
