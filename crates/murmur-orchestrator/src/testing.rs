//! In-memory inbox and responder for tests and local runs

use crate::inbox::{Inbox, Responder};
use async_trait::async_trait;
use murmur_core::{InboundMessage, MurmurError, Result};
use std::sync::{Mutex, PoisonError};
use tokio::sync::{mpsc, Notify};

/// Inbox fed through an mpsc channel; closes when every sender is dropped
#[derive(Debug)]
pub struct ChannelInbox {
    rx: tokio::sync::Mutex<mpsc::Receiver<InboundMessage>>,
}

impl ChannelInbox {
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<InboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                rx: tokio::sync::Mutex::new(rx),
            },
            tx,
        )
    }
}

#[async_trait]
impl Inbox for ChannelInbox {
    async fn next_message(&self) -> Result<Option<InboundMessage>> {
        Ok(self.rx.lock().await.recv().await)
    }
}

/// Responder that keeps every reply in memory
#[derive(Debug, Default)]
pub struct RecordingResponder {
    replies: Mutex<Vec<(String, String)>>,
    notify: Notify,
    failing: bool,
}

impl RecordingResponder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Responder whose deliveries always fail (nothing is recorded)
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// `(identity, text)` pairs in delivery order
    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until at least `count` replies have been recorded
    pub async fn wait_for_replies(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.replies.lock().unwrap_or_else(PoisonError::into_inner).len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Responder for RecordingResponder {
    async fn reply(&self, identity: &str, text: &str) -> Result<()> {
        if self.failing {
            return Err(MurmurError::Transport("reply delivery failed".to_string()));
        }
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((identity.to_string(), text.to_string()));
        self.notify.notify_waiters();
        Ok(())
    }
}
