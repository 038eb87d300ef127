//! Remove command - lock a session, then delete it.

use anyhow::{Result, bail};
use clap::Args;
use console::Style;
use serde::Serialize;

use casket_session::SessionStateProvider;

use super::Context;

/// Arguments for the remove command.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Session id
    pub id: String,
}

#[derive(Debug, Serialize)]
struct RemoveOutput {
    session_id: String,
    removed: bool,
    locked: bool,
}

/// Run the remove command.
pub async fn run(args: RemoveArgs, ctx: &Context) -> Result<()> {
    let store = ctx.session_store()?;
    let item = store.get_item_exclusive(&args.id).await?;

    let removed = match item.lock_id {
        Some(lock_id) if !item.locked => store.remove_item(&args.id, lock_id).await?,
        _ => false,
    };

    if ctx.json_output {
        let output = RemoveOutput {
            session_id: args.id.clone(),
            removed,
            locked: item.locked,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if removed {
        let green = Style::new().green();
        println!("{} Session {} removed", green.apply_to("✓"), args.id);
    } else if !item.locked {
        let yellow = Style::new().yellow();
        println!("{} Session {} not found", yellow.apply_to("!"), args.id);
    }

    if item.locked {
        bail!("Session '{}' is locked by another holder", args.id);
    }
    Ok(())
}
