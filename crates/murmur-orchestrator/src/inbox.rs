//! Inbound message collaborators

use async_trait::async_trait;
use murmur_core::{InboundMessage, Result};

/// Source of decrypted private messages
#[async_trait]
pub trait Inbox: Send + Sync {
    /// Wait for the next message. `None` means the inbox is closed.
    async fn next_message(&self) -> Result<Option<InboundMessage>>;
}

/// Sends a private reply to an identity
#[async_trait]
pub trait Responder: Send + Sync {
    async fn reply(&self, identity: &str, text: &str) -> Result<()>;
}
