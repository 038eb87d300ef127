//! Casket - CAS-locked session storage over a shared key/value cache
//!
//! Main entry point for the Casket CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;

mod commands;

use commands::{cache, config, contend, hit, release, remove, reset_timeout, show};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Casket - CAS-locked session storage over a shared key/value cache
#[derive(Parser)]
#[command(name = "casket")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Session key namespace, overriding the configured one
    #[arg(long, global = true, env = "CASKET_NAMESPACE")]
    pub namespace: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve one demo page request: bump the session's hit counter
    Hit(hit::HitArgs),

    /// Show a session without locking it
    Show(show::ShowArgs),

    /// Refresh a session's expiry
    ResetTimeout(reset_timeout::ResetTimeoutArgs),

    /// Lock and delete a session
    Remove(remove::RemoveArgs),

    /// Release a lock held under a known lock id
    Release(release::ReleaseArgs),

    /// Hammer one session from concurrent workers and check the counter
    Contend(contend::ContendArgs),

    /// Output cache operations
    Cache(cache::CacheArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = casket_config::load_config(cli.config.as_deref())
        .context("Failed to load configuration")?;
    let mut config = loaded.config;
    if let Some(namespace) = cli.namespace {
        config.session.namespace = namespace;
    }

    // Console on stderr keeps --json output on stdout clean.
    let filter = if cli.verbose {
        "casket=debug,casket_session=debug,casket_kv=debug,casket_config=debug,info"
    } else {
        "casket=info,casket_session=info,casket_kv=warn,warn"
    };

    let (file_layer, _guard) = match &config.logging.dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "casket.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "casket=trace,casket_session=trace,casket_kv=trace,casket_config=trace,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(file_layer)
        .init();

    match &loaded.source {
        Some(path) => tracing::debug!(path = %path.display(), "Loaded configuration"),
        None => tracing::debug!("No configuration file found, using defaults"),
    }

    // Create context for commands
    let ctx = commands::Context {
        config,
        config_source: loaded.source,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Hit(args) => hit::run(args, &ctx).await,
        Commands::Show(args) => show::run(args, &ctx).await,
        Commands::ResetTimeout(args) => reset_timeout::run(args, &ctx).await,
        Commands::Remove(args) => remove::run(args, &ctx).await,
        Commands::Release(args) => release::run(args, &ctx).await,
        Commands::Contend(args) => contend::run(args, &ctx).await,
        Commands::Cache(args) => cache::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
