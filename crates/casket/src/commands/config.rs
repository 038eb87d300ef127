//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Subcommand};

use casket_config::{BackendKind, CasketConfig};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration and where it came from
    Show,

    /// Check the resolved configuration for unusable values
    Validate,

    /// Write a config file
    Init {
        /// Where to write (defaults to ./casket.toml)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Use the SQLite backend with this database file
        #[arg(long)]
        sqlite: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the user configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Validate => cmd_validate(ctx),
        ConfigCommand::Init {
            path,
            sqlite,
            force,
        } => cmd_init(ctx, path, sqlite, force),
        ConfigCommand::Path => cmd_path(),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&ctx.config)?);
        return Ok(());
    }

    println!("# Casket Configuration\n");
    match &ctx.config_source {
        Some(path) => println!("# Loaded from {}\n", path.display()),
        None => println!("# No config file loaded (using defaults)\n"),
    }
    print!("{}", ctx.config.to_toml()?);
    Ok(())
}

fn cmd_validate(ctx: &Context) -> Result<()> {
    ctx.config.validate()?;
    println!("✓ Configuration is valid");
    Ok(())
}

fn cmd_init(
    ctx: &Context,
    path: Option<PathBuf>,
    sqlite: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from("casket.toml"));
    if path.exists() && !force {
        bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    let mut config = CasketConfig::new();
    config.session.namespace = if ctx.config.session.namespace.is_empty() {
        "default".to_string()
    } else {
        ctx.config.session.namespace.clone()
    };
    if let Some(db) = sqlite {
        config.client.backend = BackendKind::Sqlite;
        config.client.path = Some(db);
    }
    config.validate()?;

    casket_config::save_config(&config, &path)?;
    println!("✓ Created config file: {}", path.display());
    if ctx.verbose {
        println!();
        print!("{}", config.to_toml()?);
    }
    Ok(())
}

fn cmd_path() -> Result<()> {
    if let Some(path) = casket_config::xdg_config_path() {
        println!("{}", path.display());
    } else {
        eprintln!("Could not determine config directory");
    }
    Ok(())
}
