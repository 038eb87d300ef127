//! Show command - non-exclusive session inspection.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use casket_session::{SessionAction, SessionItem, SessionStateProvider, TypeTag};

use super::Context;

/// Arguments for the show command.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Session id
    pub id: String,
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    session_id: String,
    found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<SessionOutput>,
}

#[derive(Debug, Serialize)]
struct SessionOutput {
    timeout_minutes: u32,
    flag: String,
    locked: bool,
    lock_id: Option<u64>,
    lock_age_ms: Option<u64>,
    items: Vec<ItemOutput>,
}

#[derive(Debug, Serialize)]
struct ItemOutput {
    name: String,
    tag: u8,
    value: String,
}

/// Run the show command.
pub async fn run(args: ShowArgs, ctx: &Context) -> Result<()> {
    let store = ctx.session_store()?;
    let record = store.get_item(&args.id).await?;

    let session = record.map(|record| {
        let header = &record.header;
        SessionOutput {
            timeout_minutes: header.timeout_minutes,
            flag: flag_name(header.flag),
            locked: header.is_locked(),
            lock_id: header.lock_owner.map(|id| id.get()),
            lock_age_ms: header
                .is_locked()
                .then(|| record.lock_age().as_millis() as u64),
            items: record
                .items
                .iter()
                .map(|item| ItemOutput {
                    name: item.name.clone(),
                    tag: item.tag.0,
                    value: preview(item),
                })
                .collect(),
        }
    });

    if ctx.json_output {
        let output = ShowOutput {
            session_id: args.id,
            found: session.is_some(),
            session,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let Some(session) = session else {
        let yellow = Style::new().yellow();
        println!(
            "{} Session {} not found",
            yellow.apply_to("!"),
            dim.apply_to(&args.id)
        );
        return Ok(());
    };

    println!();
    println!("{} {}", style("Session").bold(), args.id);
    println!("{}", dim.apply_to("─".repeat(40)));
    println!(
        "  {} {} min",
        dim.apply_to("Timeout:"),
        session.timeout_minutes
    );
    println!("  {} {}", dim.apply_to("Flag:"), session.flag);
    match (session.lock_id, session.lock_age_ms) {
        (Some(id), Some(age_ms)) => {
            let red = Style::new().red();
            println!(
                "  {} {} (held {:.1}s)",
                dim.apply_to("Lock:"),
                red.apply_to(format!("● locked by {id}")),
                age_ms as f64 / 1000.0
            );
        }
        _ => {
            let green = Style::new().green();
            println!("  {} {}", dim.apply_to("Lock:"), green.apply_to("○ unlocked"));
        }
    }

    println!();
    if session.items.is_empty() {
        println!("  {}", dim.apply_to("No items"));
    } else {
        for item in &session.items {
            println!("  {} = {}", style(&item.name).cyan(), item.value);
        }
    }
    println!();

    Ok(())
}

fn flag_name(flag: SessionAction) -> String {
    match flag {
        SessionAction::None => "none".to_string(),
        SessionAction::InitializeItem => "initialize-item".to_string(),
        SessionAction::Other(b) => format!("other({b})"),
    }
}

/// Human-readable rendering of an item payload.
fn preview(item: &SessionItem) -> String {
    let raw = || format!("<{} bytes, tag {}>", item.value.len(), item.tag.0);
    match item.tag {
        TypeTag::STRING | TypeTag::JSON => String::from_utf8(item.value.clone()).unwrap_or_else(|_| raw()),
        TypeTag::INT => <[u8; 8]>::try_from(item.value.as_slice())
            .map(|b| i64::from_be_bytes(b).to_string())
            .unwrap_or_else(|_| raw()),
        TypeTag::BOOL => match item.value.as_slice() {
            [0] => "false".to_string(),
            [1] => "true".to_string(),
            _ => raw(),
        },
        _ => raw(),
    }
}
