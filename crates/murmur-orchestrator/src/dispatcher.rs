//! Inbound message dispatch
//!
//! A message starting with `!` is a command (when commands are enabled); anything
//! else is guidance for the next note. Every path ends in a reply string, including
//! rejections.

use crate::pipeline::PostPipeline;
use crate::posting_loop::PostingLoop;
use crate::runtime::AgentRuntime;
use murmur_agent::RateLimiter;
use murmur_core::config::{MAX_POSTING_INTERVAL_MINUTES, MIN_POSTING_INTERVAL_MINUTES};
use murmur_core::sanitize::{
    sanitize_command_args, sanitize_input, truncate_with_marker, MAX_GUIDANCE_LENGTH,
    MAX_INPUT_LENGTH,
};
use murmur_core::{short_id, InboundMessage, MurmurError};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Characters of a published note echoed back in a confirmation
pub const REPLY_PREVIEW_CHARS: usize = 200;

const HELP_TEXT: &str = "Commands:
!status - show agent status
!set-prompt <text> - replace the system prompt
!post-now - publish a note immediately
!set-interval <minutes> - change the posting interval (1-1440)
!help - show this message

Any other message is used as guidance for a new note.";

/// Commands understood by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Status,
    SetPrompt,
    PostNow,
    SetInterval,
    Help,
}

impl Command {
    /// Read-only commands are open to everyone and skip the command rate limit
    pub fn requires_authorization(&self) -> bool {
        !matches!(self, Command::Status | Command::Help)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Status => "status",
            Command::SetPrompt => "set-prompt",
            Command::PostNow => "post-now",
            Command::SetInterval => "set-interval",
            Command::Help => "help",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!{}", self.name())
    }
}

impl FromStr for Command {
    type Err = MurmurError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "status" => Ok(Command::Status),
            "set-prompt" => Ok(Command::SetPrompt),
            "post-now" => Ok(Command::PostNow),
            "set-interval" => Ok(Command::SetInterval),
            "help" => Ok(Command::Help),
            _ => Err(MurmurError::UnknownCommand(s.to_string())),
        }
    }
}

/// Who may run privileged commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessPolicy {
    /// No identities configured: every sender is authorized
    OpenToAll,
    Restricted(HashSet<String>),
}

impl AccessPolicy {
    /// Build from a configured identity list; an empty list opens access to everyone
    pub fn from_identities<I, S>(identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: HashSet<String> = identities
            .into_iter()
            .map(Into::into)
            .filter(|id| !id.trim().is_empty())
            .collect();

        if set.is_empty() {
            warn!("No authorized identities configured: ANY sender can run privileged commands");
            AccessPolicy::OpenToAll
        } else {
            info!("{} authorized identities configured", set.len());
            AccessPolicy::Restricted(set)
        }
    }

    pub fn is_authorized(&self, identity: &str) -> bool {
        match self {
            AccessPolicy::OpenToAll => true,
            AccessPolicy::Restricted(set) => set.contains(identity),
        }
    }
}

/// Routes inbound private messages to commands or guided posts
pub struct GuidanceDispatcher {
    pipeline: Arc<PostPipeline>,
    posting_loop: Arc<PostingLoop>,
    runtime: Arc<AgentRuntime>,
    access: AccessPolicy,
    command_limiter: RateLimiter,
    guidance_limiter: RateLimiter,
    commands_enabled: bool,
}

impl GuidanceDispatcher {
    pub fn new(
        pipeline: Arc<PostPipeline>,
        posting_loop: Arc<PostingLoop>,
        access: AccessPolicy,
        command_limiter: RateLimiter,
        guidance_limiter: RateLimiter,
    ) -> Self {
        let runtime = pipeline.runtime().clone();
        Self {
            pipeline,
            posting_loop,
            runtime,
            access,
            command_limiter,
            guidance_limiter,
            commands_enabled: true,
        }
    }

    /// When disabled, `!`-prefixed messages are treated as guidance
    pub fn with_commands_enabled(mut self, enabled: bool) -> Self {
        self.commands_enabled = enabled;
        self
    }

    pub fn access(&self) -> &AccessPolicy {
        &self.access
    }

    /// Handle one message and produce the reply for its sender
    pub async fn handle(&self, message: &InboundMessage) -> String {
        let sender = message.sender.as_str();
        let text = sanitize_input(&message.content, MAX_INPUT_LENGTH);

        match text.strip_prefix('!') {
            Some(body) if self.commands_enabled => self.handle_command(sender, body).await,
            _ => self.handle_guidance(sender, &text).await,
        }
    }

    async fn handle_command(&self, sender: &str, body: &str) -> String {
        let body = body.trim();
        let (name, args) = match body.split_once(char::is_whitespace) {
            Some((name, args)) => (name, sanitize_command_args(args)),
            None => (body, String::new()),
        };
        let parsed = name.parse::<Command>();

        let privileged = parsed
            .as_ref()
            .map(Command::requires_authorization)
            .unwrap_or(true);

        if privileged {
            if !self.access.is_authorized(sender) {
                warn!(identity = %short_id(sender), command = name, "Unauthorized command attempt");
                return MurmurError::Unauthorized(format!("!{} is restricted", name)).to_string();
            }
            if !self.command_limiter.allow(sender) {
                return format!(
                    "{}. Try again later.",
                    MurmurError::RateLimited("commands".to_string())
                );
            }
        }

        let command = match parsed {
            Ok(command) => command,
            Err(e) => {
                info!(identity = %short_id(sender), command = name, "Unknown command");
                return format!("{}. Send !help for the command list.", e);
            }
        };

        info!(identity = %short_id(sender), %command, "Executing command");
        match command {
            Command::Status => self.status_report(),
            Command::Help => HELP_TEXT.to_string(),
            Command::SetPrompt => self.set_prompt(&args),
            Command::PostNow => self.post_now().await,
            Command::SetInterval => self.set_interval(&args),
        }
    }

    async fn handle_guidance(&self, sender: &str, text: &str) -> String {
        let guidance = sanitize_input(text, MAX_GUIDANCE_LENGTH);
        if guidance.is_empty() {
            return "Empty message ignored. Send !help for the command list.".to_string();
        }

        if !self.guidance_limiter.allow(sender) {
            return format!(
                "{}. Try again later.",
                MurmurError::RateLimited("guidance".to_string())
            );
        }

        info!(identity = %short_id(sender), "Posting with guidance ({} chars)", guidance.chars().count());
        match self.pipeline.generate_and_post(Some(&guidance)).await {
            Ok(receipt) => format!(
                "Posted with your guidance (id {}):\n\n{}",
                receipt.artifact.short_id(),
                preview(&receipt.artifact.content)
            ),
            Err(e) => {
                warn!(identity = %short_id(sender), "Guided post failed: {}", e);
                format!("Failed to post: {}", e)
            }
        }
    }

    fn set_prompt(&self, args: &str) -> String {
        if args.is_empty() {
            return "Usage: !set-prompt <text>".to_string();
        }
        self.runtime.set_active_prompt(args);
        info!("Active prompt replaced ({} chars)", args.chars().count());
        "Prompt updated.".to_string()
    }

    async fn post_now(&self) -> String {
        match self.pipeline.generate_and_post(None).await {
            Ok(receipt) => format!(
                "Posted (id {}):\n\n{}",
                receipt.artifact.short_id(),
                preview(&receipt.artifact.content)
            ),
            Err(e) => format!("Failed to post: {}", e),
        }
    }

    fn set_interval(&self, args: &str) -> String {
        let minutes: u64 = match args.parse() {
            Ok(minutes) => minutes,
            Err(_) => {
                return format!(
                    "Usage: !set-interval <minutes> ({}-{})",
                    MIN_POSTING_INTERVAL_MINUTES, MAX_POSTING_INTERVAL_MINUTES
                )
            }
        };

        if !(MIN_POSTING_INTERVAL_MINUTES..=MAX_POSTING_INTERVAL_MINUTES).contains(&minutes) {
            return MurmurError::InvalidInterval(format!(
                "{} minutes is outside {}-{}",
                minutes, MIN_POSTING_INTERVAL_MINUTES, MAX_POSTING_INTERVAL_MINUTES
            ))
            .to_string();
        }

        match self.posting_loop.set_interval(minutes) {
            Ok(()) => format!("Posting interval set to {} minutes.", minutes),
            Err(e) => e.to_string(),
        }
    }

    /// Read-only status summary
    pub fn status_report(&self) -> String {
        let snapshot = self.runtime.snapshot();
        let last_post = snapshot
            .last_post
            .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());

        format!(
            "{}\nRunning: {}\nInterval: {} minutes\nLast post: {}\nUptime: {}\nGenerator circuit: {}\nTransport circuit: {}",
            snapshot.name,
            if snapshot.running { "yes" } else { "no" },
            snapshot.interval.as_secs() / 60,
            last_post,
            format_uptime(snapshot.uptime),
            self.pipeline.generation_breaker().state(),
            self.pipeline.transport_breaker().state(),
        )
    }
}

impl fmt::Debug for GuidanceDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuidanceDispatcher")
            .field("access", &self.access)
            .field("commands_enabled", &self.commands_enabled)
            .finish_non_exhaustive()
    }
}

fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
}

fn preview(content: &str) -> String {
    truncate_with_marker(content, REPLY_PREVIEW_CHARS).0
}
