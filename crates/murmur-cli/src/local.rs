//! Local collaborators for running without a relay connection

use async_trait::async_trait;
use chrono::Utc;
use murmur_agent::{ContentGenerator, Transport};
use murmur_core::{Artifact, DraftArtifact, InboundMessage, MurmurError, Result};
use murmur_orchestrator::{Inbox, Responder};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Transport that accepts every draft and only logs it
#[derive(Debug, Default)]
pub struct DryRunTransport;

/// SHA-256 over kind, timestamp, and content
pub fn artifact_id(draft: &DraftArtifact) -> String {
    let mut hasher = Sha256::new();
    hasher.update(draft.kind.code().to_string().as_bytes());
    hasher.update(draft.created_at.timestamp().to_string().as_bytes());
    hasher.update(draft.content.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl Transport for DryRunTransport {
    async fn send(&self, draft: DraftArtifact) -> Result<Artifact> {
        let artifact = Artifact {
            id: artifact_id(&draft),
            content: draft.content,
            kind: draft.kind,
            created_at: draft.created_at,
        };
        info!(id = %artifact.short_id(), kind = %artifact.kind, "[dry-run] {}", artifact.content);
        Ok(artifact)
    }
}

/// Generator that echoes guidance back instead of calling a model
#[derive(Debug, Default)]
pub struct EchoGenerator {
    count: AtomicU64,
}

#[async_trait]
impl ContentGenerator for EchoGenerator {
    async fn generate(&self, _prompt: &str, guidance: Option<&str>) -> Result<String> {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        let body = guidance.unwrap_or("scheduled note");
        Ok(format!(
            "[dry-run #{} {}] {}",
            n,
            Utc::now().format("%H:%M:%S"),
            body
        ))
    }
}

/// Split `<identity> <message>`; `None` for lines without both parts
pub fn parse_line(line: &str) -> Option<InboundMessage> {
    let (identity, message) = line.trim().split_once(char::is_whitespace)?;
    let message = message.trim();
    if message.is_empty() {
        return None;
    }
    Some(InboundMessage::new(identity, message))
}

/// Inbox reading `<identity> <message>` lines from stdin
pub struct StdinInbox {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl Default for StdinInbox {
    fn default() -> Self {
        Self::new()
    }
}

impl StdinInbox {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

#[async_trait]
impl Inbox for StdinInbox {
    async fn next_message(&self) -> Result<Option<InboundMessage>> {
        let mut lines = self.lines.lock().await;
        loop {
            let Some(line) = lines.next_line().await? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line) {
                Some(message) => return Ok(Some(message)),
                None => warn!("Ignoring line, expected `<identity> <message>`"),
            }
        }
    }
}

/// Responder printing replies to stdout
#[derive(Debug, Default)]
pub struct StdoutResponder;

#[async_trait]
impl Responder for StdoutResponder {
    async fn reply(&self, identity: &str, text: &str) -> Result<()> {
        if identity.is_empty() {
            return Err(MurmurError::Validation("Reply has no recipient".to_string()));
        }
        println!("-> {}\n{}\n", identity, text);
        Ok(())
    }
}
