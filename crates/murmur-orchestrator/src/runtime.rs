//! Shared runtime state
//!
//! Mutated by commands, re-read by the posting loop on every cycle. Each field has
//! its own guard so a status read never waits on an in-flight publish.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;

/// State shared between the posting loop and the message dispatcher
#[derive(Debug)]
pub struct AgentRuntime {
    name: String,
    started_at: DateTime<Utc>,
    interval_secs: AtomicU64,
    running: watch::Sender<bool>,
    last_post: RwLock<Option<DateTime<Utc>>>,
    active_prompt: RwLock<String>,
}

/// Point-in-time copy of the runtime state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSnapshot {
    pub name: String,
    pub running: bool,
    pub interval: Duration,
    pub last_post: Option<DateTime<Utc>>,
    pub uptime: Duration,
}

impl AgentRuntime {
    /// Create runtime state; the agent starts in the running state
    pub fn new(name: impl Into<String>, prompt: impl Into<String>, interval: Duration) -> Self {
        let (running, _) = watch::channel(true);
        Self {
            name: name.into(),
            started_at: Utc::now(),
            interval_secs: AtomicU64::new(interval.as_secs()),
            running,
            last_post: RwLock::new(None),
            active_prompt: RwLock::new(prompt.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.load(Ordering::SeqCst))
    }

    /// Store a new interval without validation; see [`crate::PostingLoop::set_interval`]
    pub(crate) fn store_interval(&self, interval: Duration) {
        self.interval_secs.store(interval.as_secs(), Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.send_replace(running);
    }

    /// Receiver that observes the running flag
    pub fn subscribe_running(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }

    pub fn last_post(&self) -> Option<DateTime<Utc>> {
        *self.last_post.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn record_post(&self, at: DateTime<Utc>) {
        *self.last_post.write().unwrap_or_else(PoisonError::into_inner) = Some(at);
    }

    pub fn active_prompt(&self) -> String {
        self.active_prompt
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_active_prompt(&self, prompt: impl Into<String>) {
        *self
            .active_prompt
            .write()
            .unwrap_or_else(PoisonError::into_inner) = prompt.into();
    }

    pub fn uptime(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            name: self.name.clone(),
            running: self.is_running(),
            interval: self.interval(),
            last_post: self.last_post(),
            uptime: self.uptime(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_runtime_is_running_with_no_posts() {
        let runtime = AgentRuntime::new("murmur", "be kind", Duration::from_secs(3600));
        let snapshot = runtime.snapshot();

        assert!(snapshot.running);
        assert_eq!(snapshot.name, "murmur");
        assert_eq!(snapshot.interval, Duration::from_secs(3600));
        assert!(snapshot.last_post.is_none());
    }

    #[tokio::test]
    async fn test_running_flag_is_observable() {
        let runtime = AgentRuntime::new("murmur", "p", Duration::from_secs(60));
        let mut rx = runtime.subscribe_running();

        runtime.set_running(false);
        rx.wait_for(|running| !*running).await.unwrap();
        assert!(!runtime.is_running());
    }

    #[test]
    fn test_prompt_replacement() {
        let runtime = AgentRuntime::new("murmur", "old", Duration::from_secs(60));
        runtime.set_active_prompt("new");
        assert_eq!(runtime.active_prompt(), "new");
    }
}
