//! Contend command - concurrent demo page requests against one session.
//!
//! Every worker repeats the hit cycle until its quota of counter writes has
//! landed, backing off while the session is locked. With exclusive locking
//! intact the final counter equals `workers * hits`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use casket_session::SessionStateProvider;

use super::Context;
use super::hit::{COUNTER_ITEM, HitOutcome, hit_once};

/// Arguments for the contend command.
#[derive(Args, Debug)]
pub struct ContendArgs {
    /// Number of concurrent workers
    #[arg(short, long, default_value = "4")]
    pub workers: usize,

    /// Counter writes per worker
    #[arg(long, default_value = "25")]
    pub hits: u64,

    /// Session id (a new one is generated when omitted)
    #[arg(short, long)]
    pub session: Option<String>,
}

#[derive(Debug, Serialize)]
struct ContendOutput {
    session_id: String,
    workers: usize,
    hits: u64,
    expected: i64,
    counter: i64,
    contended: u64,
    elapsed_ms: u64,
}

/// Run the contend command.
pub async fn run(args: ContendArgs, ctx: &Context) -> Result<()> {
    let store = ctx.session_store()?;
    let timeout = ctx.default_timeout();
    let session_id = args
        .session
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    store
        .create_uninitialized_item(&session_id, timeout)
        .await?;

    let contended = Arc::new(AtomicU64::new(0));
    let started = Instant::now();

    let mut handles = Vec::with_capacity(args.workers);
    for worker in 0..args.workers {
        let store = store.clone();
        let contended = contended.clone();
        let session_id = session_id.clone();
        let hits = args.hits;

        handles.push(tokio::spawn(async move {
            let mut landed = 0;
            while landed < hits {
                match hit_once(&store, &session_id, timeout).await? {
                    HitOutcome::Stored { .. } => landed += 1,
                    HitOutcome::Locked { .. } => {
                        contended.fetch_add(1, Ordering::Relaxed);
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                }
            }
            tracing::debug!(worker, landed, "Worker finished");
            anyhow::Ok(())
        }));
    }

    for handle in handles {
        handle.await??;
    }

    let counter = store
        .get_item(&session_id)
        .await?
        .and_then(|record| record.items.get_i64(COUNTER_ITEM))
        .unwrap_or(0);
    let expected = args.workers as i64 * args.hits as i64;
    let contended = contended.load(Ordering::Relaxed);
    let elapsed = started.elapsed();

    if ctx.json_output {
        let output = ContendOutput {
            session_id: session_id.clone(),
            workers: args.workers,
            hits: args.hits,
            expected,
            counter,
            contended,
            elapsed_ms: elapsed.as_millis() as u64,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let dim = Style::new().dim();
        let verdict = if counter == expected {
            Style::new().green().apply_to("✓ consistent")
        } else {
            Style::new().red().apply_to("✗ lost updates")
        };

        println!();
        println!("{}", style("Contention Run").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {} {}", dim.apply_to("Session:"), session_id);
        println!(
            "  {} {} x {}",
            dim.apply_to("Workers:"),
            args.workers,
            args.hits
        );
        println!(
            "  {} {} / {} {}",
            dim.apply_to("Counter:"),
            counter,
            expected,
            verdict
        );
        println!("  {} {}", dim.apply_to("Contended:"), contended);
        println!(
            "  {} {:.2}s",
            dim.apply_to("Elapsed:"),
            elapsed.as_secs_f64()
        );
        println!();
    }

    if counter != expected {
        bail!("Counter is {counter}, expected {expected}");
    }
    Ok(())
}
