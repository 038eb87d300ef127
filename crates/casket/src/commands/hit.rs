//! Hit command - one request of the demo page.
//!
//! The page keeps an integer item `A` in the session and bumps it on every
//! request: lock the session, read `A`, write `A + 1`, release.

use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use casket_session::{CommitOutcome, LockId, SessionItems, SessionStateProvider, SessionStore};

use super::Context;

/// Name of the counter item.
pub const COUNTER_ITEM: &str = "A";

/// Arguments for the hit command.
#[derive(Args, Debug)]
pub struct HitArgs {
    /// Session id (a new one is generated when omitted)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Session timeout in minutes (defaults to the configured value)
    #[arg(short, long)]
    pub timeout: Option<u32>,
}

/// What one page request observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    /// The counter was written.
    Stored {
        /// Counter value after this request.
        value: i64,
        /// Whether the session didn't exist before.
        new_session: bool,
    },
    /// Another request holds the session.
    Locked {
        /// The holder, when known.
        owner: Option<LockId>,
        /// How long the holder has had it.
        age: Duration,
    },
}

/// Hit output for JSON.
#[derive(Debug, Serialize)]
struct HitOutput {
    session_id: String,
    stored: bool,
    value: Option<i64>,
    new_session: bool,
    lock_id: Option<u64>,
    lock_age_ms: Option<u64>,
}

/// Serve one demo page request against `session_id`.
///
/// A commit that loses its lock is retried from the top, so a `Stored`
/// outcome always reflects a counter write that landed.
pub async fn hit_once(
    store: &SessionStore,
    session_id: &str,
    timeout_minutes: u32,
) -> Result<HitOutcome> {
    loop {
        let item = store.get_item_exclusive(session_id).await?;

        if item.locked {
            return Ok(HitOutcome::Locked {
                owner: item.lock_id,
                age: item.lock_age,
            });
        }

        let Some(record) = item.record else {
            // Fresh session: the page writes it as a new item.
            let mut items = SessionItems::new();
            items.set_i64(COUNTER_ITEM, 1);
            store
                .set_and_release_item_exclusive(session_id, None, &items, timeout_minutes, true)
                .await?;
            return Ok(HitOutcome::Stored {
                value: 1,
                new_session: true,
            });
        };

        let mut items = record.items;
        let value = items.get_i64(COUNTER_ITEM).unwrap_or(0) + 1;
        items.set_i64(COUNTER_ITEM, value);

        match store
            .set_and_release_item_exclusive(
                session_id,
                item.lock_id,
                &items,
                timeout_minutes,
                false,
            )
            .await?
        {
            CommitOutcome::Committed => {
                return Ok(HitOutcome::Stored {
                    value,
                    new_session: false,
                });
            }
            CommitOutcome::Conflict => {
                // Still ours; let go before starting over.
                if let Some(lock_id) = item.lock_id {
                    store.release_item_exclusive(session_id, lock_id).await?;
                }
                tracing::debug!(session_id = %session_id, "Session data changed under lock, retrying");
            }
            CommitOutcome::LockLost => {
                tracing::debug!(session_id = %session_id, "Lock lost before commit, retrying");
            }
        }
    }
}

/// Run the hit command.
pub async fn run(args: HitArgs, ctx: &Context) -> Result<()> {
    let store = ctx.session_store()?;
    let session_id = args
        .session
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    let timeout = args.timeout.unwrap_or_else(|| ctx.default_timeout());

    let outcome = hit_once(&store, &session_id, timeout).await?;

    if ctx.json_output {
        let output = match outcome {
            HitOutcome::Stored { value, new_session } => HitOutput {
                session_id: session_id.clone(),
                stored: true,
                value: Some(value),
                new_session,
                lock_id: None,
                lock_age_ms: None,
            },
            HitOutcome::Locked { owner, age } => HitOutput {
                session_id: session_id.clone(),
                stored: false,
                value: None,
                new_session: false,
                lock_id: owner.map(LockId::get),
                lock_age_ms: Some(age.as_millis() as u64),
            },
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if let HitOutcome::Stored { value, new_session } = outcome {
        let green = Style::new().green();
        let dim = Style::new().dim();
        println!(
            "{} {} {} = {}",
            green.apply_to("✓"),
            dim.apply_to(format!("[{session_id}]")),
            COUNTER_ITEM,
            style(value).bold()
        );
        if new_session && ctx.verbose {
            println!("{}", dim.apply_to("  (new session)"));
        }
    }

    if let HitOutcome::Locked { owner, age } = outcome {
        let holder = owner.map_or_else(|| "unknown".to_string(), |id| id.to_string());
        bail!(
            "Session '{session_id}' is locked by {holder} (held for {:.1}s)",
            age.as_secs_f64()
        );
    }

    Ok(())
}
