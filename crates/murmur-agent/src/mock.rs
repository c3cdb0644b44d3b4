//! Scripted collaborators for tests and dry runs

use crate::generator::ContentGenerator;
use crate::transport::Transport;
use async_trait::async_trait;
use murmur_core::{Artifact, ArtifactKind, DraftArtifact, MurmurError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// A generator call as seen by [`ScriptedGenerator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateCall {
    pub prompt: String,
    pub guidance: Option<String>,
}

/// Generator that replays queued responses
///
/// Once the queue is empty it produces `Scripted note #n` (unique per call), or
/// fails every call if built with [`ScriptedGenerator::always_failing`].
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<GenerateCall>>,
    always_fail: bool,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn always_failing() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    pub fn with_output(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.push(Err(MurmurError::Generation(message.into())));
        self
    }

    fn push(&self, item: Result<String>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(item);
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<GenerateCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, guidance: Option<&str>) -> Result<String> {
        let n = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            calls.push(GenerateCall {
                prompt: prompt.to_string(),
                guidance: guidance.map(str::to_string),
            });
            calls.len()
        };

        if self.always_fail {
            return Err(MurmurError::Generation("scripted failure".to_string()));
        }

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        next.unwrap_or_else(|| Ok(format!("Scripted note #{}", n)))
    }
}

/// Transport that fails a configured number of sends, then accepts everything
#[derive(Debug)]
pub struct ScriptedTransport {
    failures_left: Mutex<Option<usize>>,
    sends: AtomicUsize,
    published: Mutex<Vec<Artifact>>,
    delay: Option<Duration>,
    failure: fn(String) -> MurmurError,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            // None fails forever
            failures_left: Mutex::new(Some(0)),
            sends: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
            delay: None,
            failure: MurmurError::Transport,
        }
    }

    /// Fail the first `n` sends
    pub fn failing_times(self, n: usize) -> Self {
        *self.failures_left.lock().unwrap_or_else(PoisonError::into_inner) = Some(n);
        self
    }

    /// Fail every send
    pub fn always_failing(self) -> Self {
        *self.failures_left.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self
    }

    /// Build scripted failures with `failure` instead of a transport error
    pub fn failing_with(mut self, failure: fn(String) -> MurmurError) -> Self {
        self.failure = failure;
        self
    }

    /// Artifacts of one kind accepted so far
    pub fn published_of(&self, kind: ArtifactKind) -> Vec<Artifact> {
        self.published()
            .into_iter()
            .filter(|artifact| artifact.kind == kind)
            .collect()
    }

    /// Hold every send for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of drafts handed to the transport, including failed sends
    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    /// Artifacts accepted so far
    pub fn published(&self) -> Vec<Artifact> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, draft: DraftArtifact) -> Result<Artifact> {
        let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let fail = {
            let mut left = self.failures_left.lock().unwrap_or_else(PoisonError::into_inner);
            match left.as_mut() {
                None => true,
                Some(0) => false,
                Some(remaining) => {
                    *remaining -= 1;
                    true
                }
            }
        };
        if fail {
            return Err((self.failure)(format!("scripted send failure #{}", n)));
        }

        let artifact = Artifact {
            id: format!("{:064x}", n),
            content: draft.content,
            kind: draft.kind,
            created_at: draft.created_at,
        };
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(artifact.clone());
        Ok(artifact)
    }
}
