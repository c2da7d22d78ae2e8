//! Command-line interface for the PR review bot.
//!
//! - `serve` (default) - Run the webhook server
//! - `check` - Validate configuration and the GitHub App private key

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use pr_review_bot::config::Config;
use pr_review_bot::github::KeySigner;

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "pr-review-bot")]
#[command(author, version, about = "GitHub App webhook receiver for automated pull request reviews", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "PR_REVIEW_BOT_CONFIG", default_value = "pr-review-bot.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the webhook server
    Serve,

    /// Validate configuration, parse the private key and sign a test JWT
    Check,
}

/// Build the app JWT signer from configuration.
pub fn build_signer(config: &Config) -> Result<KeySigner> {
    let app_id = config.github.app_id()?;
    let pem = config.github.private_key_pem()?;
    let ttl = chrono::Duration::minutes(i64::from(config.github.jwt_ttl_minutes));
    Ok(KeySigner::new(app_id, pem, ttl))
}

/// Run the `check` command. The signed JWT itself is never printed.
pub fn run_check(config: &Config) -> Result<()> {
    let signer = build_signer(config)?;
    let assertion = signer
        .sign()
        .context("GitHub App private key check failed")?;
    let installation_id = config.github.installation_id()?;

    println!("Configuration OK");
    println!("  App ID:          {}", signer.app_id());
    println!("  Installation ID: {}", installation_id);
    println!("  Bot login:       {}", config.github.bot_login());
    println!("  API base URL:    {}", config.github.api_base_url);
    println!("  JWT TTL:         {} min", signer.ttl().num_minutes());
    println!("  JWT expires at:  {}", assertion.expires_at.to_rfc3339());
    Ok(())
}
