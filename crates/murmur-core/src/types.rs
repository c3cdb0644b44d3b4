//! Shared types for artifacts and inbound messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Result;

/// Message kind tag carried by every artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Public short-form text note (kind 1)
    TextNote,
    /// Private direct message (kind 4)
    DirectMessage,
    /// Profile metadata (kind 0)
    Metadata,
}

impl ArtifactKind {
    /// Numeric kind used on the wire
    pub fn code(&self) -> u16 {
        match self {
            ArtifactKind::Metadata => 0,
            ArtifactKind::TextNote => 1,
            ArtifactKind::DirectMessage => 4,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::TextNote => write!(f, "text_note"),
            ArtifactKind::DirectMessage => write!(f, "direct_message"),
            ArtifactKind::Metadata => write!(f, "metadata"),
        }
    }
}

/// An unsigned artifact handed to the transport for signing and delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftArtifact {
    pub content: String,
    pub kind: ArtifactKind,
    pub created_at: DateTime<Utc>,
}

impl DraftArtifact {
    /// Build a fresh text note stamped with the current time
    pub fn text_note(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: ArtifactKind::TextNote,
            created_at: Utc::now(),
        }
    }

    /// Build a profile metadata draft; the content is the profile as JSON
    pub fn metadata(profile: &ProfileMetadata) -> Result<Self> {
        Ok(Self {
            content: serde_json::to_string(profile)?,
            kind: ArtifactKind::Metadata,
            created_at: Utc::now(),
        })
    }
}

/// Public profile announced by the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub name: String,
    pub about: String,
}

impl ProfileMetadata {
    pub fn new(name: impl Into<String>, about: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            about: about.into(),
        }
    }
}

/// An artifact accepted by the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Network-assigned identifier (hex digest)
    pub id: String,
    pub content: String,
    pub kind: ArtifactKind,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Identifier shortened for log lines
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// A decrypted private message received from another identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Public identifier of the sender
    pub sender: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            received_at: Utc::now(),
        }
    }
}

/// First 10 characters of an identifier, for logs
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(10) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
