//! Release command - operator release of a stuck lock.

use anyhow::Result;
use clap::Args;
use console::Style;
use serde::Serialize;

use casket_session::{LockId, SessionStateProvider};

use super::Context;

/// Arguments for the release command.
#[derive(Args, Debug)]
pub struct ReleaseArgs {
    /// Session id
    pub id: String,

    /// Lock id currently holding the session (see `casket show`)
    pub lock_id: LockId,
}

#[derive(Debug, Serialize)]
struct ReleaseOutput {
    session_id: String,
    lock_id: u64,
    released: bool,
}

/// Run the release command.
pub async fn run(args: ReleaseArgs, ctx: &Context) -> Result<()> {
    let store = ctx.session_store()?;
    let released = store.release_item_exclusive(&args.id, args.lock_id).await?;

    if ctx.json_output {
        let output = ReleaseOutput {
            session_id: args.id,
            lock_id: args.lock_id.get(),
            released,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if released {
        let green = Style::new().green();
        println!(
            "{} Released lock {} on {}",
            green.apply_to("✓"),
            args.lock_id,
            args.id
        );
    } else {
        let dim = Style::new().dim();
        println!(
            "{}",
            dim.apply_to(format!(
                "Lock {} is not held on {}; nothing to release",
                args.lock_id, args.id
            ))
        );
    }

    Ok(())
}
