//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim. Each function runs
//! one subcommand against an open [`Database`] and prints JSON to stdout.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

use waitlist_blast::blast::NewRecipient;
use waitlist_blast::config::Config;
use waitlist_blast::db::Database;
use waitlist_blast::dispatch;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ── Dispatch ────────────────────────────────────────────────────

pub async fn run_tick(db: &Database, config: &Config) -> Result<()> {
    let report = dispatch::dispatch_tick(db, &config.dispatch, chrono::Utc::now()).await?;
    print_json(&report)
}

/// Tick on the configured interval until Ctrl-C. A failed tick is logged and
/// retried on the next interval.
pub async fn run_loop(db: &Database, config: &Config) -> Result<()> {
    let mut interval = tokio::time::interval(config.dispatch.poll_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(
        poll_interval_secs = config.dispatch.poll_interval_secs,
        "dispatcher running"
    );
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = dispatch::dispatch_tick(db, &config.dispatch, chrono::Utc::now()).await {
                    warn!(error = %format!("{:#}", e), "dispatch tick failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down dispatcher");
                return Ok(());
            }
        }
    }
}

// ── Ledger ──────────────────────────────────────────────────────

#[derive(Serialize)]
struct AttachSummary {
    blast_id: Uuid,
    requested: usize,
    inserted: u64,
    total_recipients: i64,
    max_batch_number: Option<i32>,
}

/// Attach recipients from a JSON file, then record the new recipient total.
/// Without an explicit batch size the blast's own `batch_size` applies.
pub async fn run_attach(
    db: &Database,
    blast_id: Uuid,
    file: &Path,
    batch_size: Option<u32>,
) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("reading recipients {}", file.display()))?;
    let recipients: Vec<NewRecipient> = serde_json::from_str(&source)
        .with_context(|| format!("parsing recipients {}", file.display()))?;
    let batch_size = match batch_size {
        Some(size) => size,
        None => {
            let blast = db.require_blast(blast_id).await?;
            u32::try_from(blast.batch_size)
                .with_context(|| format!("blast {} has batch_size {}", blast_id, blast.batch_size))?
        }
    };

    let inserted = db
        .bulk_insert_recipients(blast_id, &recipients, batch_size)
        .await?;
    let stats = db.get_recipient_stats(blast_id).await?;
    db.update_blast_total_recipients(blast_id, stats.total)
        .await?;
    let max_batch_number = db.get_max_batch_number(blast_id).await?;

    print_json(&AttachSummary {
        blast_id,
        requested: recipients.len(),
        inserted,
        total_recipients: stats.total,
        max_batch_number,
    })
}

pub async fn run_claim(
    db: &Database,
    config: &Config,
    blast_id: Uuid,
    batch: i32,
    limit: Option<i64>,
) -> Result<()> {
    let limit = limit.unwrap_or(config.dispatch.claim_limit);
    let claimed = db.claim_pending_recipients(blast_id, batch, limit).await?;
    print_json(&claimed)
}

pub async fn run_stats(db: &Database, blast_id: Uuid) -> Result<()> {
    let blast = db.require_blast(blast_id).await?;
    let stats = db.get_recipient_stats(blast_id).await?;
    print_json(&serde_json::json!({
        "blast_id": blast.id,
        "status": blast.status,
        "current_batch": blast.current_batch,
        "completion_percentage": blast.completion_percentage(),
        "recipients": stats,
    }))
}

pub async fn run_reconcile(db: &Database, blast_id: Uuid) -> Result<()> {
    let blast = db.reconcile_blast_counters(blast_id).await?;
    print_json(&blast.counters())
}

// ── Tiers ───────────────────────────────────────────────────────

pub async fn run_tier(
    db: &Database,
    user_id: Option<Uuid>,
    price_id: Option<Uuid>,
    free: bool,
) -> Result<()> {
    let tier = match (user_id, price_id) {
        (Some(user_id), _) => db.get_tier_info_by_user_id(user_id).await?,
        (None, Some(price_id)) => db.get_tier_info_by_price_id(price_id).await?,
        (None, None) if free => db.get_free_tier_info().await?,
        (None, None) => anyhow::bail!("one of --user-id, --price-id or --free is required"),
    };
    print_json(&tier)
}

pub async fn run_health(db: &Database) -> Result<()> {
    db.health_check().await?;
    println!("ok");
    Ok(())
}
