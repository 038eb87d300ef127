//! Reset-timeout command - refresh a session's expiry.

use anyhow::Result;
use clap::Args;
use console::Style;
use serde::Serialize;

use casket_session::SessionStateProvider;

use super::Context;

/// Arguments for the reset-timeout command.
#[derive(Args, Debug)]
pub struct ResetTimeoutArgs {
    /// Session id
    pub id: String,
}

#[derive(Debug, Serialize)]
struct ResetOutput {
    session_id: String,
    refreshed: bool,
}

/// Run the reset-timeout command.
pub async fn run(args: ResetTimeoutArgs, ctx: &Context) -> Result<()> {
    let store = ctx.session_store()?;
    let refreshed = store.reset_item_timeout(&args.id).await?;

    if ctx.json_output {
        let output = ResetOutput {
            session_id: args.id,
            refreshed,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if refreshed {
        let green = Style::new().green();
        println!("{} Expiry refreshed for {}", green.apply_to("✓"), args.id);
    } else {
        let yellow = Style::new().yellow();
        println!(
            "{} Session {} not found or changed concurrently",
            yellow.apply_to("!"),
            args.id
        );
    }

    Ok(())
}
