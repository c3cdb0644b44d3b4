//! Agent supervisor
//!
//! Wires every component from [`MurmurConfig`] and runs two tasks for the life of
//! the process: the posting loop and the inbound listener. Both share one running
//! flag, so [`Agent::shutdown`] stops them together. The profile is announced
//! once before either task starts.

use crate::dispatcher::{AccessPolicy, GuidanceDispatcher};
use crate::inbox::{Inbox, Responder};
use crate::pipeline::PostPipeline;
use crate::posting_loop::PostingLoop;
use crate::runtime::AgentRuntime;
use murmur_agent::{
    CircuitBreaker, CircuitConfig, ContentDeduplicator, ContentGenerator, PublishReceipt,
    RateLimitConfig, RateLimiter, RetryingPublisher, Transport,
};
use murmur_core::fail_open::fail_open;
use murmur_core::{short_id, Artifact, DraftArtifact, MurmurConfig, ProfileMetadata, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// The autonomous posting agent
pub struct Agent {
    config: MurmurConfig,
    runtime: Arc<AgentRuntime>,
    pipeline: Arc<PostPipeline>,
    posting_loop: Arc<PostingLoop>,
    dispatcher: Arc<GuidanceDispatcher>,
    transport: Arc<dyn Transport>,
    inbox: Option<(Arc<dyn Inbox>, Arc<dyn Responder>)>,
}

impl Agent {
    /// Build an agent from validated configuration
    pub fn new(
        config: MurmurConfig,
        generator: Arc<dyn ContentGenerator>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;

        let circuit = CircuitConfig::from(&config.circuit);
        let generation_breaker = Arc::new(CircuitBreaker::new("generator", circuit));
        let transport_breaker = Arc::new(CircuitBreaker::new("transport", circuit));

        let runtime = Arc::new(AgentRuntime::new(
            &config.agent.name,
            &config.agent.personality,
            config.posting_interval(),
        ));

        let publisher =
            RetryingPublisher::from_config(transport.clone(), transport_breaker, &config.publish);
        let pipeline = Arc::new(PostPipeline::new(
            generator,
            generation_breaker,
            ContentDeduplicator::new(config.dedup.max_history),
            publisher,
            runtime.clone(),
            config.publish.max_retries,
        ));

        let posting_loop = Arc::new(PostingLoop::from_config(pipeline.clone(), &config.posting));

        let limiter = |max_requests| {
            RateLimiter::new(
                RateLimitConfig::new(max_requests, config.rate_window())
                    .with_cleanup_interval(config.limits.cleanup_interval),
            )
        };
        let dispatcher = Arc::new(
            GuidanceDispatcher::new(
                pipeline.clone(),
                posting_loop.clone(),
                AccessPolicy::from_identities(config.guidance.authorized_identities.iter().cloned()),
                limiter(config.limits.command_rate_limit),
                limiter(config.limits.guidance_rate_limit),
            )
            .with_commands_enabled(config.guidance.commands_enabled),
        );

        Ok(Self {
            config,
            runtime,
            pipeline,
            posting_loop,
            dispatcher,
            transport,
            inbox: None,
        })
    }

    /// Attach the private message inbox and the channel replies go out on
    pub fn with_inbox(mut self, inbox: Arc<dyn Inbox>, responder: Arc<dyn Responder>) -> Self {
        self.inbox = Some((inbox, responder));
        self
    }

    pub fn config(&self) -> &MurmurConfig {
        &self.config
    }

    pub fn runtime(&self) -> &Arc<AgentRuntime> {
        &self.runtime
    }

    pub fn dispatcher(&self) -> &Arc<GuidanceDispatcher> {
        &self.dispatcher
    }

    pub fn posting_loop(&self) -> &Arc<PostingLoop> {
        &self.posting_loop
    }

    /// Generate and publish one note now, outside the timer
    pub async fn generate_and_post(&self, guidance: Option<&str>) -> Result<PublishReceipt> {
        self.pipeline.generate_and_post(guidance).await
    }

    /// Run the posting loop and the inbound listener until shutdown
    pub async fn run(&self) -> Result<()> {
        info!(
            name = %self.runtime.name(),
            interval_minutes = self.runtime.interval().as_secs() / 60,
            "Agent starting"
        );

        self.publish_profile().await;

        let posting = {
            let posting_loop = self.posting_loop.clone();
            tokio::spawn(async move { posting_loop.run().await })
        };

        let listener = match (&self.inbox, self.config.guidance.enabled) {
            (Some((inbox, responder)), true) => Some(tokio::spawn(listen(
                self.dispatcher.clone(),
                inbox.clone(),
                responder.clone(),
                self.runtime.subscribe_running(),
            ))),
            (None, true) => {
                info!("No inbox attached, guidance listener not started");
                None
            }
            (_, false) => {
                info!("Guidance disabled in config, listener not started");
                None
            }
        };

        let listener = async {
            if let Some(handle) = listener {
                supervise("guidance listener", handle).await;
            }
        };
        tokio::join!(supervise("posting loop", posting), listener);

        info!("Agent stopped");
        Ok(())
    }

    /// Announce the agent's name and description once; a failure is logged
    /// and never stops the agent
    pub async fn publish_profile(&self) -> Option<Artifact> {
        let profile = ProfileMetadata::new(&self.config.agent.name, &self.config.agent.about);
        let transport = &self.transport;
        let artifact = fail_open("profile update", || async move {
            let draft = DraftArtifact::metadata(&profile)?;
            transport.send(draft).await
        })
        .await?;

        info!(id = %artifact.short_id(), "Profile metadata published");
        Some(artifact)
    }

    /// Stop both tasks; a message already being handled is finished first
    pub fn shutdown(&self) {
        info!("Agent shutdown requested");
        self.posting_loop.stop();
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("runtime", &self.runtime)
            .field("dispatcher", &self.dispatcher)
            .field("has_inbox", &self.inbox.is_some())
            .finish_non_exhaustive()
    }
}

async fn supervise(task: &str, handle: JoinHandle<()>) {
    match handle.await {
        Ok(()) => debug!("{} exited", task),
        Err(e) if e.is_cancelled() => warn!("{} was cancelled", task),
        Err(e) => error!("{} panicked: {}", task, e),
    }
}

async fn listen(
    dispatcher: Arc<GuidanceDispatcher>,
    inbox: Arc<dyn Inbox>,
    responder: Arc<dyn Responder>,
    mut running: watch::Receiver<bool>,
) {
    info!("Guidance listener started");

    loop {
        let stopped = !*running.borrow();
        if stopped {
            break;
        }

        // Only the receive races shutdown; a received message is always answered
        let next = tokio::select! {
            next = inbox.next_message() => next,
            _ = running.wait_for(|r| !*r) => break,
        };

        match next {
            Ok(Some(message)) => {
                info!(identity = %short_id(&message.sender), "Received private message");
                let reply = dispatcher.handle(&message).await;
                fail_open("reply delivery", || responder.reply(&message.sender, &reply)).await;
            }
            Ok(None) => {
                info!("Inbox closed");
                break;
            }
            Err(e) => {
                warn!("Failed to receive message: {}", e);
                tokio::time::sleep(RECEIVE_RETRY_DELAY).await;
            }
        }
    }

    info!("Guidance listener stopped");
}
