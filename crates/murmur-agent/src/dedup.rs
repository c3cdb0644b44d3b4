//! Content deduplication to avoid reposting the same note

use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// How candidate content is compared against history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum MatchPolicy {
    /// Identical after normalization
    #[default]
    Exact,
}

/// Lowercase, trim, and collapse whitespace runs to a single space
pub fn normalize_content(content: &str) -> String {
    content
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 hex digest of normalized content
pub fn fingerprint(content: &str) -> String {
    let digest = Sha256::digest(normalize_content(content).as_bytes());
    hex::encode(digest)
}

/// Remembers fingerprints of the last `max_history` notes
pub struct ContentDeduplicator {
    max_history: usize,
    policy: MatchPolicy,
    history: Mutex<VecDeque<String>>,
}

impl ContentDeduplicator {
    pub fn new(max_history: usize) -> Self {
        Self::with_policy(max_history, MatchPolicy::Exact)
    }

    pub fn with_policy(max_history: usize, policy: MatchPolicy) -> Self {
        let max_history = max_history.max(1);
        info!(
            "Content deduplicator initialized with {} item history",
            max_history
        );
        Self {
            max_history,
            policy,
            history: Mutex::new(VecDeque::with_capacity(max_history)),
        }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Check `content` against history, remembering it when it is new.
    ///
    /// Blank content is never a duplicate and is never recorded.
    pub fn is_duplicate(&self, content: &str) -> bool {
        if content.trim().is_empty() {
            return false;
        }

        let digest = fingerprint(content);
        let mut history = self.lock();

        let seen = match self.policy {
            MatchPolicy::Exact => history.iter().any(|stored| *stored == digest),
        };
        if seen {
            warn!(
                "Exact duplicate content detected (hash: {}...)",
                &digest[..16]
            );
            return true;
        }

        if history.len() == self.max_history {
            history.pop_front();
        }
        history.push_back(digest);
        false
    }

    /// Forget all remembered content
    pub fn clear(&self) {
        self.lock().clear();
        info!("Content deduplication history cleared");
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ContentDeduplicator {
    fn default() -> Self {
        Self::new(100)
    }
}
