//! Configuration management for Murmur
//!
//! Settings live in a TOML file (`murmur.toml` by default). Every section has
//! defaults, so a missing file or a partial file is valid. A handful of values can
//! be overridden from the environment for deployments that keep secrets and
//! identity lists out of the file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{MurmurError, Result};

/// Smallest posting interval accepted by `!set-interval`, in minutes
pub const MIN_POSTING_INTERVAL_MINUTES: u64 = 1;

/// Largest posting interval accepted by `!set-interval`, in minutes (24 hours)
pub const MAX_POSTING_INTERVAL_MINUTES: u64 = 1440;

/// Comma-separated list of identities allowed to run privileged commands
pub const AUTHORIZED_IDENTITIES_ENV: &str = "MURMUR_AUTHORIZED_IDENTITIES";

/// Top-level Murmur configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MurmurConfig {
    #[serde(default)]
    pub agent: AgentSection,

    #[serde(default)]
    pub posting: PostingSection,

    #[serde(default)]
    pub guidance: GuidanceSection,

    #[serde(default)]
    pub limits: LimitsSection,

    #[serde(default)]
    pub circuit: CircuitSection,

    #[serde(default)]
    pub publish: PublishSection,

    #[serde(default)]
    pub dedup: DedupSection,

    #[serde(default)]
    pub model: ModelSection,
}

/// Agent identity and personality
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Initial system prompt; replaceable at runtime with `!set-prompt`
    #[serde(default = "default_personality")]
    pub personality: String,

    /// Profile description published on start
    #[serde(default = "default_about")]
    pub about: String,
}

/// Posting schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingSection {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Spam floor: intervals below this many seconds are rejected
    #[serde(default = "default_min_interval_seconds")]
    pub min_interval_seconds: u64,

    /// Pause after a failed cycle before resuming the normal schedule
    #[serde(default = "default_recovery_delay_secs")]
    pub recovery_delay_secs: u64,
}

/// Inbound private message handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidanceSection {
    /// Start the inbound listener at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Treat `!`-prefixed messages as commands (otherwise they are guidance)
    #[serde(default = "default_true")]
    pub commands_enabled: bool,

    /// Identities allowed to run privileged commands. Empty means everyone.
    #[serde(default)]
    pub authorized_identities: Vec<String>,
}

/// Per-identity rate limits for inbound messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSection {
    #[serde(default = "default_command_rate_limit")]
    pub command_rate_limit: usize,

    #[serde(default = "default_guidance_rate_limit")]
    pub guidance_rate_limit: usize,

    #[serde(default = "default_window_minutes")]
    pub window_minutes: u64,

    /// Sweep idle identities every N admission checks
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

/// Circuit breaker thresholds, shared by the generator and transport breakers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitSection {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_circuit_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
}

/// Publish retry policy and protocol ceilings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishSection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before retry `n` is `backoff_base^(n-1)` seconds
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u32,

    #[serde(default = "default_max_note_chars")]
    pub max_note_chars: usize,

    #[serde(default = "default_max_note_bytes")]
    pub max_note_bytes: usize,
}

/// Duplicate detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupSection {
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

/// Generative model endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSection {
    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

// Default value providers
fn default_agent_name() -> String {
    "Murmur".to_string()
}

fn default_personality() -> String {
    "You are a witty, concise poster on a decentralized social network.".to_string()
}

fn default_about() -> String {
    "Autonomous posting agent powered by AI".to_string()
}

fn default_interval_minutes() -> u64 {
    60
}

fn default_min_interval_seconds() -> u64 {
    30
}

fn default_recovery_delay_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_command_rate_limit() -> usize {
    10
}

fn default_guidance_rate_limit() -> usize {
    5
}

fn default_window_minutes() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    100
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_circuit_timeout_secs() -> u64 {
    60
}

fn default_half_open_max_calls() -> u32 {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base() -> u32 {
    2
}

fn default_max_note_chars() -> usize {
    2000
}

fn default_max_note_bytes() -> usize {
    32 * 1024
}

fn default_max_history() -> usize {
    100
}

fn default_model_name() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

impl MurmurConfig {
    /// Load configuration from `path` or fall back to defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Write the default configuration to `path`, creating parent directories
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| MurmurError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment overrides on top of file values
    pub fn apply_env(&mut self) {
        if let Ok(raw) = std::env::var(AUTHORIZED_IDENTITIES_ENV) {
            let identities = parse_identity_list(&raw);
            if !identities.is_empty() {
                self.guidance.authorized_identities = identities;
            }
        }

        if let Ok(raw) = std::env::var("MURMUR_POSTING_INTERVAL_MINUTES") {
            match raw.trim().parse::<u64>() {
                Ok(minutes) => self.posting.interval_minutes = minutes,
                Err(_) => tracing::warn!(
                    "Ignoring MURMUR_POSTING_INTERVAL_MINUTES={:?}: not a number",
                    raw
                ),
            }
        }

        if let Ok(name) = std::env::var("LLM_MODEL_NAME") {
            self.model.name = name;
        }

        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            self.model.base_url = url;
        }
    }

    /// Check ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        let interval = self.posting.interval_minutes;
        if !(MIN_POSTING_INTERVAL_MINUTES..=MAX_POSTING_INTERVAL_MINUTES).contains(&interval) {
            return Err(MurmurError::Config(format!(
                "posting.interval_minutes must be between {} and {}, got {}",
                MIN_POSTING_INTERVAL_MINUTES, MAX_POSTING_INTERVAL_MINUTES, interval
            )));
        }

        if interval * 60 < self.posting.min_interval_seconds {
            return Err(MurmurError::Config(format!(
                "posting.interval_minutes ({}) is below the spam floor of {} seconds",
                interval, self.posting.min_interval_seconds
            )));
        }

        let positive = [
            ("limits.command_rate_limit", self.limits.command_rate_limit as u64),
            ("limits.guidance_rate_limit", self.limits.guidance_rate_limit as u64),
            ("limits.window_minutes", self.limits.window_minutes),
            ("limits.cleanup_interval", self.limits.cleanup_interval),
            ("circuit.failure_threshold", self.circuit.failure_threshold as u64),
            ("circuit.half_open_max_calls", self.circuit.half_open_max_calls as u64),
            ("publish.max_retries", self.publish.max_retries as u64),
            ("publish.backoff_base", self.publish.backoff_base as u64),
            ("publish.max_note_chars", self.publish.max_note_chars as u64),
            ("publish.max_note_bytes", self.publish.max_note_bytes as u64),
            ("dedup.max_history", self.dedup.max_history as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(MurmurError::Config(format!("{} must be at least 1", field)));
            }
        }

        if self.agent.personality.trim().is_empty() {
            return Err(MurmurError::Config(
                "agent.personality must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Posting interval as a duration
    pub fn posting_interval(&self) -> Duration {
        Duration::from_secs(self.posting.interval_minutes * 60)
    }

    /// Rate limit window as a duration
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.limits.window_minutes * 60)
    }
}

/// Split a comma-separated identity list, dropping blanks
pub fn parse_identity_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            personality: default_personality(),
            about: default_about(),
        }
    }
}

impl Default for PostingSection {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            min_interval_seconds: default_min_interval_seconds(),
            recovery_delay_secs: default_recovery_delay_secs(),
        }
    }
}

impl Default for GuidanceSection {
    fn default() -> Self {
        Self {
            enabled: true,
            commands_enabled: true,
            authorized_identities: Vec::new(),
        }
    }
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            command_rate_limit: default_command_rate_limit(),
            guidance_rate_limit: default_guidance_rate_limit(),
            window_minutes: default_window_minutes(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

impl Default for CircuitSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            timeout_secs: default_circuit_timeout_secs(),
            half_open_max_calls: default_half_open_max_calls(),
        }
    }
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            max_note_chars: default_max_note_chars(),
            max_note_bytes: default_max_note_bytes(),
        }
    }
}

impl Default for DedupSection {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
        }
    }
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = MurmurConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.posting.interval_minutes, 60);
        assert_eq!(config.circuit.failure_threshold, 5);
        assert_eq!(config.publish.max_note_bytes, 32 * 1024);
        assert_eq!(config.posting_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = MurmurConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.agent.name, "Murmur");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("murmur.toml");
        std::fs::write(
            &path,
            r#"
[agent]
name = "Night Owl"

[posting]
interval_minutes = 15

[guidance]
authorized_identities = ["npub1admin"]
"#,
        )
        .unwrap();

        let config = MurmurConfig::load_or_default(&path).unwrap();
        assert_eq!(config.agent.name, "Night Owl");
        assert_eq!(config.posting.interval_minutes, 15);
        assert_eq!(config.posting.min_interval_seconds, 30);
        assert_eq!(config.guidance.authorized_identities, vec!["npub1admin"]);
        assert!(config.guidance.commands_enabled);
        assert_eq!(config.limits.guidance_rate_limit, 5);
    }

    #[test]
    fn test_write_default_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/murmur.toml");
        MurmurConfig::write_default(&path).unwrap();

        let config = MurmurConfig::load_or_default(&path).unwrap();
        assert_eq!(config.model.api_key_env, "OPENROUTER_API_KEY");
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("murmur.toml");
        std::fs::write(&path, "[posting\ninterval_minutes = ").unwrap();
        assert!(matches!(
            MurmurConfig::load_or_default(&path),
            Err(MurmurError::Toml(_))
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_interval() {
        let mut config = MurmurConfig::default();
        config.posting.interval_minutes = 2000;
        assert!(config.validate().is_err());

        config.posting.interval_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = MurmurConfig::default();
        config.limits.command_rate_limit = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("limits.command_rate_limit"));
    }

    #[test]
    fn test_parse_identity_list() {
        assert_eq!(
            parse_identity_list(" npub1a, ,npub1b ,"),
            vec!["npub1a".to_string(), "npub1b".to_string()]
        );
        assert!(parse_identity_list("").is_empty());
    }
}
