//! Murmur CLI - autonomous posting agent
//!
//! Usage:
//!   murmur init                 Write a default murmur.toml
//!   murmur run                  Start the posting loop and the guidance listener
//!   murmur post                 Generate and publish a single note
//!   murmur check-config         Validate configuration and print a summary

mod local;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use local::{DryRunTransport, EchoGenerator, StdinInbox, StdoutResponder};
use murmur_agent::{ChatCompletionsGenerator, ContentGenerator};
use murmur_core::MurmurConfig;
use murmur_orchestrator::Agent;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_CONFIG_PATH: &str = "murmur.toml";

#[derive(Parser)]
#[command(name = "murmur")]
#[command(author, version, about = "Autonomous posting agent with private-message guidance")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run the agent until Ctrl-C
    Run {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Echo guidance instead of calling the model (no API key needed)
        #[arg(long)]
        dry_run: bool,

        /// Do not read private messages from stdin
        #[arg(long)]
        no_listen: bool,
    },

    /// Generate and publish one note, then exit
    Post {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Guidance for the note
        #[arg(short, long)]
        guidance: Option<String>,

        /// Echo guidance instead of calling the model
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate the configuration
    CheckConfig {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Run {
            config,
            dry_run,
            no_listen,
        } => cmd_run(&config, dry_run, no_listen).await,
        Commands::Post {
            config,
            guidance,
            dry_run,
        } => cmd_post(&config, guidance.as_deref(), dry_run).await,
        Commands::CheckConfig { config } => cmd_check_config(&config),
    }
}

fn load_config(path: &Path) -> Result<MurmurConfig> {
    let mut config = MurmurConfig::load_or_default(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config.apply_env();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn build_generator(config: &MurmurConfig, dry_run: bool) -> Result<Arc<dyn ContentGenerator>> {
    if dry_run {
        info!("Dry run: using echo generator");
        return Ok(Arc::new(EchoGenerator::default()));
    }
    let generator = ChatCompletionsGenerator::from_config(&config.model)
        .with_context(|| format!("Set {} or pass --dry-run", config.model.api_key_env))?
        .with_max_chars(config.publish.max_note_chars);
    Ok(Arc::new(generator))
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    MurmurConfig::write_default(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Wrote default configuration to {}", path.display());
    println!("\nNext steps:");
    println!("  1. Edit the [agent] personality and [guidance] authorized_identities");
    println!("  2. Export the API key named in [model] api_key_env");
    println!("  3. Run 'murmur run' (or 'murmur run --dry-run' to try it offline)");
    Ok(())
}

async fn cmd_run(path: &Path, dry_run: bool, no_listen: bool) -> Result<()> {
    let config = load_config(path)?;
    let generator = build_generator(&config, dry_run)?;

    let mut agent = Agent::new(config, generator, Arc::new(DryRunTransport))?;
    if !no_listen {
        println!("Reading private messages from stdin as `<identity> <message>`");
        agent = agent.with_inbox(Arc::new(StdinInbox::new()), Arc::new(StdoutResponder));
    }
    let agent = Arc::new(agent);

    let mut runner = {
        let agent = agent.clone();
        tokio::spawn(async move { agent.run().await })
    };

    tokio::select! {
        result = &mut runner => {
            result.context("Agent task failed")??;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Ctrl-C received, shutting down");
            agent.shutdown();
        }
    }

    runner.await.context("Agent task failed")??;
    Ok(())
}

async fn cmd_post(path: &Path, guidance: Option<&str>, dry_run: bool) -> Result<()> {
    let config = load_config(path)?;
    let generator = build_generator(&config, dry_run)?;
    let agent = Agent::new(config, generator, Arc::new(DryRunTransport))?;

    let receipt = agent
        .generate_and_post(guidance)
        .await
        .context("Failed to publish note")?;

    println!("Published {} after {} attempt(s)", receipt.artifact.id, receipt.attempts);
    if receipt.truncated {
        println!("(content was truncated)");
    }
    println!("\n{}", receipt.artifact.content);
    Ok(())
}

fn cmd_check_config(path: &Path) -> Result<()> {
    let config = load_config(path)?;

    println!("Configuration OK ({})", path.display());
    println!("==========");
    println!("Agent:        {}", config.agent.name);
    println!("Interval:     {} min", config.posting.interval_minutes);
    println!("Model:        {} @ {}", config.model.name, config.model.base_url);
    println!(
        "Guidance:     {} (commands {})",
        if config.guidance.enabled { "on" } else { "off" },
        if config.guidance.commands_enabled { "on" } else { "off" }
    );
    if config.guidance.authorized_identities.is_empty() {
        println!("Authorized:   EVERYONE (no identities configured)");
    } else {
        println!(
            "Authorized:   {} identities",
            config.guidance.authorized_identities.len()
        );
    }
    println!(
        "Rate limits:  {} commands / {} guidance per {} min",
        config.limits.command_rate_limit,
        config.limits.guidance_rate_limit,
        config.limits.window_minutes
    );
    println!(
        "Circuit:      open after {} failures for {}s",
        config.circuit.failure_threshold, config.circuit.timeout_secs
    );
    Ok(())
}
