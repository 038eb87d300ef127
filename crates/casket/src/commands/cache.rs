//! Cache command - output cache operations.

use anyhow::Result;
use chrono::{TimeDelta, Utc};
use clap::{Args, Subcommand};
use console::Style;
use serde::Serialize;

use super::Context;

/// Arguments for the cache command.
#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Store an entry unless one is already cached; prints the cached entry
    Add {
        /// Cache key
        key: String,
        /// Entry content
        value: String,
        /// Seconds until the entry expires
        #[arg(long, default_value = "60")]
        ttl: i64,
    },

    /// Read an entry
    Get {
        /// Cache key
        key: String,
    },

    /// Store an entry unconditionally
    Set {
        /// Cache key
        key: String,
        /// Entry content
        value: String,
        /// Seconds until the entry expires
        #[arg(long, default_value = "60")]
        ttl: i64,
    },

    /// Remove an entry
    Remove {
        /// Cache key
        key: String,
    },
}

#[derive(Debug, Serialize)]
struct CacheOutput {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stored: Option<bool>,
}

/// Run the cache command.
pub async fn run(args: CacheArgs, ctx: &Context) -> Result<()> {
    let cache = ctx.output_cache()?;

    let output = match args.command {
        CacheCommand::Add { key, value, ttl } => {
            let expiry = Utc::now() + TimeDelta::seconds(ttl);
            let existing = cache.add(&key, value.as_bytes(), expiry).await?;
            let stored = existing.is_none();
            CacheOutput {
                key,
                value: Some(existing.map_or(value, lossy)),
                stored: Some(stored),
            }
        }
        CacheCommand::Get { key } => {
            let value = cache.get(&key).await?.map(lossy);
            CacheOutput {
                key,
                value,
                stored: None,
            }
        }
        CacheCommand::Set { key, value, ttl } => {
            let expiry = Utc::now() + TimeDelta::seconds(ttl);
            cache.set(&key, value.as_bytes(), expiry).await?;
            CacheOutput {
                key,
                value: Some(value),
                stored: Some(ttl > 0),
            }
        }
        CacheCommand::Remove { key } => {
            cache.remove(&key).await?;
            CacheOutput {
                key,
                value: None,
                stored: Some(false),
            }
        }
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    match (&output.value, output.stored) {
        (Some(value), Some(true)) => {
            let green = Style::new().green();
            println!("{} {} = {}", green.apply_to("✓"), output.key, value);
        }
        (Some(value), _) => println!("{} = {}", output.key, value),
        (None, Some(false)) => println!("{}", dim.apply_to(format!("Removed {}", output.key))),
        (None, _) => println!("{}", dim.apply_to(format!("{} not cached", output.key))),
    }

    Ok(())
}

fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}
