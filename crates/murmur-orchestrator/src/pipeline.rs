//! Generate, deduplicate, publish
//!
//! Both the posting loop and the dispatcher go through [`PostPipeline`], so the
//! circuit breakers and the fingerprint history are shared between them.

use crate::runtime::AgentRuntime;
use chrono::Utc;
use murmur_agent::{CircuitBreaker, ContentDeduplicator, ContentGenerator, PublishReceipt, RetryingPublisher};
use murmur_core::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub struct PostPipeline {
    generator: Arc<dyn ContentGenerator>,
    generation_breaker: Arc<CircuitBreaker>,
    dedup: ContentDeduplicator,
    publisher: RetryingPublisher,
    runtime: Arc<AgentRuntime>,
    max_retries: u32,
}

impl PostPipeline {
    pub fn new(
        generator: Arc<dyn ContentGenerator>,
        generation_breaker: Arc<CircuitBreaker>,
        dedup: ContentDeduplicator,
        publisher: RetryingPublisher,
        runtime: Arc<AgentRuntime>,
        max_retries: u32,
    ) -> Self {
        Self {
            generator,
            generation_breaker,
            dedup,
            publisher,
            runtime,
            max_retries,
        }
    }

    pub fn runtime(&self) -> &Arc<AgentRuntime> {
        &self.runtime
    }

    pub fn generation_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.generation_breaker
    }

    pub fn transport_breaker(&self) -> &Arc<CircuitBreaker> {
        self.publisher.breaker()
    }

    pub fn dedup(&self) -> &ContentDeduplicator {
        &self.dedup
    }

    /// Generate one note with the active prompt and publish it
    ///
    /// Scheduled posts (no guidance) regenerate once when the first draft repeats a
    /// recent note and publish the second draft either way. Guided posts only log
    /// a duplicate.
    pub async fn generate_and_post(&self, guidance: Option<&str>) -> Result<PublishReceipt> {
        let mut content = self.generate(guidance).await?;

        if self.dedup.is_duplicate(&content) {
            match guidance {
                Some(_) => warn!("Guided content duplicates a recent note, publishing anyway"),
                None => {
                    warn!("Generated content duplicates a recent note, regenerating");
                    content = self.generate(None).await?;
                    if self.dedup.is_duplicate(&content) {
                        warn!("Regenerated content is still a duplicate, publishing anyway");
                    }
                }
            }
        }

        let receipt = self.publisher.publish(&content, self.max_retries).await?;
        self.runtime.record_post(Utc::now());
        info!(
            id = %receipt.artifact.short_id(),
            guided = guidance.is_some(),
            "Note posted"
        );
        Ok(receipt)
    }

    async fn generate(&self, guidance: Option<&str>) -> Result<String> {
        let prompt = self.runtime.active_prompt();
        let generator = &self.generator;
        self.generation_breaker
            .execute(|| generator.generate(&prompt, guidance))
            .await
    }
}

impl std::fmt::Debug for PostPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostPipeline")
            .field("generation_breaker", &self.generation_breaker)
            .field("publisher", &self.publisher)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}
