//! Publishing with bounded retries and exponential backoff
//!
//! Every attempt yields an [`AttemptOutcome`]; what happens next is decided by the
//! pure [`next_step`] function so the retry schedule can be tested without a transport.

use crate::circuit_breaker::CircuitBreaker;
use crate::transport::Transport;
use murmur_core::config::PublishSection;
use murmur_core::sanitize::truncate_with_marker;
use murmur_core::{Artifact, ArtifactKind, DraftArtifact, MurmurError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Protocol rules a note must satisfy before and after publishing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishLimits {
    /// Character ceiling; longer content is truncated with a `...` marker
    pub max_chars: usize,
    /// UTF-8 byte ceiling for the draft payload
    pub max_bytes: usize,
    /// Kind tag every published note must carry
    pub kind: ArtifactKind,
}

impl Default for PublishLimits {
    fn default() -> Self {
        Self {
            max_chars: 2000,
            max_bytes: 32 * 1024,
            kind: ArtifactKind::TextNote,
        }
    }
}

/// Exponential backoff schedule between failed attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff_base: u32,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_base: 2,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based): `unit * base^(attempt-1)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.backoff_base.saturating_pow(exponent);
        self.backoff_unit.saturating_mul(factor)
    }
}

/// Result of a single publish attempt
#[derive(Debug)]
pub enum AttemptOutcome {
    Published(Artifact),
    /// Failed, another attempt may succeed
    Retryable(MurmurError),
    /// Failed, retrying now cannot help
    Terminal(MurmurError),
}

impl AttemptOutcome {
    /// Classify a transport result. An open circuit and any non-transient
    /// error (auth, validation, config) are terminal.
    pub fn classify(result: Result<Artifact>) -> Self {
        match result {
            Ok(artifact) => AttemptOutcome::Published(artifact),
            Err(e) if e.is_circuit_open() => AttemptOutcome::Terminal(e),
            Err(e) if !e.is_transient() => AttemptOutcome::Terminal(e),
            Err(e) => AttemptOutcome::Retryable(e),
        }
    }
}

/// What the publisher does after an attempt
#[derive(Debug)]
pub enum NextStep {
    Return(Artifact),
    Retry { delay: Duration, error: MurmurError },
    Fail(MurmurError),
}

/// Decide the next step after `attempt` of `max_attempts`
pub fn next_step(
    outcome: AttemptOutcome,
    attempt: u32,
    max_attempts: u32,
    policy: &RetryPolicy,
) -> NextStep {
    match outcome {
        AttemptOutcome::Published(artifact) => NextStep::Return(artifact),
        AttemptOutcome::Terminal(error) => NextStep::Fail(error),
        AttemptOutcome::Retryable(error) if attempt >= max_attempts => {
            NextStep::Fail(MurmurError::PublishExhausted {
                attempts: attempt,
                last_error: Box::new(error),
            })
        }
        AttemptOutcome::Retryable(error) => NextStep::Retry {
            delay: policy.delay_for(attempt),
            error,
        },
    }
}

fn validate_draft(draft: &DraftArtifact, limits: &PublishLimits) -> Result<()> {
    if draft.content.trim().is_empty() {
        return Err(MurmurError::Validation("Draft has empty content".to_string()));
    }
    let bytes = draft.content.len();
    if bytes > limits.max_bytes {
        return Err(MurmurError::Validation(format!(
            "Draft content is {} bytes, limit is {}",
            bytes, limits.max_bytes
        )));
    }
    if draft.kind != limits.kind {
        return Err(MurmurError::Validation(format!(
            "Draft has kind {}, expected {}",
            draft.kind, limits.kind
        )));
    }
    Ok(())
}

/// Check a published artifact against the protocol rules
pub fn validate_artifact(artifact: &Artifact, limits: &PublishLimits) -> Result<()> {
    if artifact.id.is_empty() {
        return Err(MurmurError::Validation("Artifact has no id".to_string()));
    }
    if artifact.content.trim().is_empty() {
        return Err(MurmurError::Validation("Artifact has empty content".to_string()));
    }
    if artifact.content.len() > limits.max_bytes {
        return Err(MurmurError::Validation(format!(
            "Artifact content is {} bytes, limit is {}",
            artifact.content.len(),
            limits.max_bytes
        )));
    }
    if artifact.kind != limits.kind {
        return Err(MurmurError::Validation(format!(
            "Artifact has kind {}, expected {}",
            artifact.kind, limits.kind
        )));
    }
    Ok(())
}

/// A successfully published note
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    pub artifact: Artifact,
    /// Attempts used, including the successful one
    pub attempts: u32,
    /// Whether the content was cut to the character ceiling
    pub truncated: bool,
}

/// Publishes notes through a transport guarded by a circuit breaker
pub struct RetryingPublisher {
    transport: Arc<dyn Transport>,
    breaker: Arc<CircuitBreaker>,
    limits: PublishLimits,
    policy: RetryPolicy,
}

impl RetryingPublisher {
    pub fn new(transport: Arc<dyn Transport>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            transport,
            breaker,
            limits: PublishLimits::default(),
            policy: RetryPolicy::default(),
        }
    }

    /// Build with limits and backoff from the `[publish]` config section
    pub fn from_config(
        transport: Arc<dyn Transport>,
        breaker: Arc<CircuitBreaker>,
        section: &PublishSection,
    ) -> Self {
        Self::new(transport, breaker)
            .with_limits(PublishLimits {
                max_chars: section.max_note_chars,
                max_bytes: section.max_note_bytes,
                kind: ArtifactKind::TextNote,
            })
            .with_retry_policy(RetryPolicy {
                backoff_base: section.backoff_base,
                backoff_unit: Duration::from_secs(1),
            })
    }

    pub fn with_limits(mut self, limits: PublishLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn limits(&self) -> &PublishLimits {
        &self.limits
    }

    /// Publish `content`, trying at most `max_retries` times
    ///
    /// # Errors
    ///
    /// - [`MurmurError::EmptyContent`] for blank content; nothing is sent
    /// - [`MurmurError::CircuitOpen`] when the transport breaker rejects an attempt
    /// - the transport's own error, unretried, when it is not transient
    /// - [`MurmurError::PublishExhausted`] once every attempt has failed
    pub async fn publish(&self, content: &str, max_retries: u32) -> Result<PublishReceipt> {
        if content.trim().is_empty() {
            return Err(MurmurError::EmptyContent);
        }

        let (content, truncated) = truncate_with_marker(content.trim(), self.limits.max_chars);
        if truncated {
            warn!(
                "Content exceeds {} chars, truncated before publishing",
                self.limits.max_chars
            );
        }

        let max_attempts = max_retries.max(1);
        let mut attempt = 1;

        loop {
            let outcome = self.attempt(&content).await;

            match next_step(outcome, attempt, max_attempts, &self.policy) {
                NextStep::Return(artifact) => {
                    if let Err(e) = validate_artifact(&artifact, &self.limits) {
                        warn!(id = %artifact.short_id(), "Published artifact failed validation: {}", e);
                    }
                    info!(
                        id = %artifact.short_id(),
                        attempt,
                        "Published note ({} chars)",
                        artifact.content.chars().count()
                    );
                    return Ok(PublishReceipt {
                        artifact,
                        attempts: attempt,
                        truncated,
                    });
                }
                NextStep::Retry { delay, error } => {
                    warn!(
                        attempt,
                        max_attempts,
                        "Publish attempt failed: {}, retrying in {:?}",
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                NextStep::Fail(error) => {
                    warn!(attempt, "Giving up on publish: {}", error);
                    return Err(error);
                }
            }
        }
    }

    async fn attempt(&self, content: &str) -> AttemptOutcome {
        let draft = DraftArtifact::text_note(content);

        if let Err(e) = validate_draft(&draft, &self.limits) {
            debug!("Draft rejected before sending: {}", e);
            return AttemptOutcome::Retryable(e);
        }

        let transport = &self.transport;
        AttemptOutcome::classify(self.breaker.execute(|| transport.send(draft)).await)
    }
}

impl std::fmt::Debug for RetryingPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingPublisher")
            .field("breaker", &self.breaker.name())
            .field("limits", &self.limits)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitConfig;
    use crate::mock::ScriptedTransport;
    use tokio::time::Instant;

    fn publisher(transport: Arc<ScriptedTransport>) -> RetryingPublisher {
        RetryingPublisher::new(
            transport,
            Arc::new(CircuitBreaker::with_defaults("transport")),
        )
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    }

    #[test]
    fn test_next_step_exhausts_on_last_attempt() {
        let policy = RetryPolicy::default();
        let outcome = AttemptOutcome::Retryable(MurmurError::Transport("down".into()));
        match next_step(outcome, 3, 3, &policy) {
            NextStep::Fail(MurmurError::PublishExhausted { attempts, .. }) => {
                assert_eq!(attempts, 3)
            }
            other => panic!("unexpected step: {:?}", other),
        }
    }

    #[test]
    fn test_next_step_circuit_open_is_terminal() {
        let outcome = AttemptOutcome::classify(Err(MurmurError::CircuitOpen {
            breaker: "transport".into(),
            retry_after: Duration::from_secs(30),
        }));
        assert!(matches!(outcome, AttemptOutcome::Terminal(_)));
        let step = next_step(outcome, 1, 3, &RetryPolicy::default());
        assert!(matches!(step, NextStep::Fail(MurmurError::CircuitOpen { .. })));
    }

    #[test]
    fn test_classify_non_transient_is_terminal() {
        let outcome = AttemptOutcome::classify(Err(MurmurError::Auth("bad key".into())));
        assert!(matches!(outcome, AttemptOutcome::Terminal(MurmurError::Auth(_))));

        let outcome = AttemptOutcome::classify(Err(MurmurError::Transport("reset".into())));
        assert!(matches!(outcome, AttemptOutcome::Retryable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_is_not_retried() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .always_failing()
                .failing_with(MurmurError::Auth),
        );
        let publisher = publisher(transport.clone());

        let start = Instant::now();
        let err = publisher.publish("hello", 3).await.unwrap_err();

        assert!(matches!(err, MurmurError::Auth(_)));
        assert_eq!(transport.send_count(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_breaker_opens_before_retries_run_out() {
        let transport = Arc::new(ScriptedTransport::new().always_failing());
        let publisher = publisher(transport.clone());

        let err = publisher.publish("hello", 6).await.unwrap_err();

        // threshold 5 trips on the fifth failure; the sixth attempt is rejected
        assert!(err.is_circuit_open());
        assert_eq!(transport.send_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_two_failures_with_backoff() {
        let transport = Arc::new(ScriptedTransport::new().failing_times(2));
        let publisher = publisher(transport.clone());

        let start = Instant::now();
        let receipt = publisher.publish("hello relays", 3).await.unwrap();

        assert_eq!(receipt.attempts, 3);
        assert!(!receipt.truncated);
        assert_eq!(receipt.artifact.content, "hello relays");
        assert_eq!(transport.send_count(), 3);
        // 1s after the first failure, 2s after the second
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_retries() {
        let transport = Arc::new(ScriptedTransport::new().always_failing());
        let publisher = publisher(transport.clone());

        let err = publisher.publish("hello", 3).await.unwrap_err();
        match err {
            MurmurError::PublishExhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last_error, MurmurError::Transport(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(transport.send_count(), 3);
    }

    #[tokio::test]
    async fn test_blank_content_never_reaches_transport() {
        let transport = Arc::new(ScriptedTransport::new());
        let publisher = publisher(transport.clone());

        let err = publisher.publish("  \n\t ", 3).await.unwrap_err();
        assert!(matches!(err, MurmurError::EmptyContent));
        assert_eq!(transport.send_count(), 0);
    }

    #[tokio::test]
    async fn test_long_content_is_truncated() {
        let transport = Arc::new(ScriptedTransport::new());
        let publisher = publisher(transport.clone());

        let long = "a".repeat(2500);
        let receipt = publisher.publish(&long, 3).await.unwrap();

        assert!(receipt.truncated);
        assert_eq!(receipt.artifact.content.chars().count(), 2000);
        assert!(receipt.artifact.content.ends_with("..."));
    }

    #[tokio::test]
    async fn test_zero_retries_still_attempts_once() {
        let transport = Arc::new(ScriptedTransport::new());
        let publisher = publisher(transport.clone());

        let receipt = publisher.publish("once", 0).await.unwrap();
        assert_eq!(receipt.attempts, 1);
        assert_eq!(transport.send_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_draft_counts_as_failed_attempt() {
        let transport = Arc::new(ScriptedTransport::new());
        let publisher = publisher(transport.clone()).with_limits(PublishLimits {
            max_chars: 100,
            max_bytes: 50,
            kind: ArtifactKind::TextNote,
        });

        // 40 chars, 80 bytes
        let content = "é".repeat(40);
        let err = publisher.publish(&content, 2).await.unwrap_err();

        assert!(matches!(
            err,
            MurmurError::PublishExhausted { attempts: 2, .. }
        ));
        assert_eq!(transport.send_count(), 0);
    }

    #[tokio::test]
    async fn test_open_circuit_is_returned_without_retry() {
        let transport = Arc::new(ScriptedTransport::new().always_failing());
        let breaker = Arc::new(CircuitBreaker::new(
            "transport",
            CircuitConfig {
                failure_threshold: 1,
                timeout: Duration::from_secs(60),
                half_open_max_calls: 1,
            },
        ));
        let publisher = RetryingPublisher::new(transport.clone(), breaker);

        let first = publisher.publish("first", 1).await.unwrap_err();
        assert!(matches!(first, MurmurError::PublishExhausted { .. }));

        let second = publisher.publish("second", 3).await.unwrap_err();
        assert!(second.is_circuit_open());
        assert_eq!(transport.send_count(), 1);
    }

    #[test]
    fn test_validate_artifact_rejects_wrong_kind() {
        let artifact = Artifact {
            id: "abc".into(),
            content: "hi".into(),
            kind: ArtifactKind::DirectMessage,
            created_at: chrono::Utc::now(),
        };
        assert!(validate_artifact(&artifact, &PublishLimits::default()).is_err());
    }
}
