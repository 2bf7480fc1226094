//! Cluster Support Bot CLI

mod logging;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use csbot_config::Config;
use csbot_core::{help_text, parse_command, Command, HelpScope, ParseOutcome, SupportRuntime};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

const OFFLINE_MENTION: &str = "<@csbot> ";
const REDACTED: &str = "***REDACTED***";

#[derive(Parser)]
#[command(name = "csbot")]
#[command(about = "Slack bot for per-cluster support summaries", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (overrides core.log_level)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot in the foreground
    Start,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Parse a command offline and print the reply it would produce
    Parse {
        /// Command text without the bot mention, e.g. "summary <ID>"
        text: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Load and validate the configuration, then print it redacted
    Check,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            let config = load_config(cli.config.as_deref())?;
            let log_level = cli
                .log_level
                .clone()
                .or_else(|| config.core.log_level.clone())
                .unwrap_or_else(|| "info".to_string());
            let log_dir = config.core.log_dir.as_ref().map(PathBuf::from);
            let _logging_guard = logging::init_logging(log_dir.as_deref(), &log_level)?;

            let runtime = SupportRuntime::new(config)?;
            info!("Starting cluster support bot in foreground...");
            runtime.run().await?;
        }

        Commands::Config { action } => match action {
            ConfigCommands::Check => match load_config(cli.config.as_deref()) {
                Ok(config) => {
                    println!("Configuration is valid.");
                    println!("{}", redacted_config(&config)?);
                }
                Err(e) => eprintln!("Configuration is invalid: {:#}", e),
            },
            ConfigCommands::Init { force } => {
                let path = config_path(cli.config.as_deref())?;
                write_default_config(&path, force)?;
                println!("Configuration created at: {}", path.display());
                println!("\nFill in the Slack, Hydra and telemetry credentials, or export");
                println!("BOT_ID, SLACK_BOT_TOKEN, SLACK_APP_TOKEN, HYDRA_USER, HYDRA_PASSWORD,");
                println!("TELEMETRY_URL and TELEMETRY_TOKEN.");
            }
        },

        Commands::Parse { text } => {
            println!("{}", offline_reply(&text));
        }
    }

    Ok(())
}

/// Explicit path, then the default path when it exists, else environment only.
fn load_config(config_path: Option<&str>) -> Result<Config> {
    if let Some(path) = config_path {
        return Config::load(path);
    }
    match Config::default_path() {
        Some(path) if path.exists() => Config::load(&path),
        _ => Config::from_env(),
    }
}

fn config_path(config_path: Option<&str>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(PathBuf::from(path)),
        None => {
            Config::default_path().ok_or_else(|| anyhow!("Cannot determine config directory"))
        }
    }
}

fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, content)?;
    Ok(())
}

fn redacted_config(config: &Config) -> Result<String> {
    let mut value = serde_json::to_value(config)?;

    for (section, key) in [
        ("slack", "bot_token"),
        ("slack", "app_token"),
        ("hydra", "password"),
        ("telemetry", "token"),
    ] {
        if let Some(secret) = value.get_mut(section).and_then(|s| s.get_mut(key)) {
            if !secret.is_null() && secret.as_str() != Some("") {
                *secret = json!(REDACTED);
            }
        }
    }

    Ok(serde_json::to_string_pretty(&value)?)
}

fn offline_reply(text: &str) -> String {
    match parse_command(&format!("{}{}", OFFLINE_MENTION, text)) {
        ParseOutcome::Parsed(Command::Help) => help_text(HelpScope::Global),
        ParseOutcome::Parsed(command) => format!("{:?}", command),
        ParseOutcome::Help(scope) => help_text(scope),
        ParseOutcome::Error(err) => err.message().to_string(),
    }
}
