//! Dispatch tick: promote due blasts and settle active ones.
//!
//! The tick runs every `dispatch.poll_interval_secs` from `waitlist-blast run`
//! (or once via `waitlist-blast tick`) and:
//! 1. Moves every due `scheduled` blast to `processing`
//! 2. Reconciles counters of every `processing`/`sending` blast with its ledger
//! 3. Completes blasts whose recipients are all settled
//!
//! Several dispatchers may run at once. A blast another dispatcher already
//! moved surfaces as a `StateConflict` and is skipped.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::blast::{BlastEvent, BlastStatus, EmailBlast};
use crate::config::DispatchConfig;
use crate::db::Database;
use crate::error::StoreError;

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub promoted: usize,
    pub reconciled: usize,
    pub completed: usize,
    pub errors: usize,
}

/// Run one dispatch tick at `now`.
pub async fn dispatch_tick(
    db: &Database,
    config: &DispatchConfig,
    now: DateTime<Utc>,
) -> Result<TickReport> {
    let mut report = TickReport::default();

    let promoted = promote_due_blasts(db, now).await?;
    report.promoted = promoted.len();

    for blast in db.get_active_blasts().await? {
        match settle_blast(db, &blast, config.reconcile).await {
            Ok(outcome) => {
                if outcome.reconciled {
                    report.reconciled += 1;
                }
                if outcome.completed {
                    report.completed += 1;
                }
            }
            Err(e) if e.is_state_conflict() || e.is_not_found() => {
                info!(blast_id = %blast.id, reason = %e, "blast changed underneath dispatcher");
            }
            Err(e) => {
                warn!(blast_id = %blast.id, error = %e, "settling blast failed");
                report.errors += 1;
            }
        }
    }

    if report != TickReport::default() {
        info!(
            promoted = report.promoted,
            reconciled = report.reconciled,
            completed = report.completed,
            errors = report.errors,
            "dispatch tick"
        );
    }
    Ok(report)
}

/// Start every scheduled blast due at or before `now`. Returns the blasts
/// this call moved.
pub async fn promote_due_blasts(db: &Database, now: DateTime<Utc>) -> Result<Vec<EmailBlast>> {
    let due = db.get_scheduled_blasts(now).await?;
    let mut promoted = Vec::with_capacity(due.len());
    for blast in due {
        match db.apply_blast_event(blast.id, BlastEvent::Start, None).await {
            Ok(started) => promoted.push(started),
            Err(e) if e.is_state_conflict() || e.is_not_found() => {
                info!(blast_id = %blast.id, reason = %e, "blast already picked up");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(promoted)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettleOutcome {
    pub reconciled: bool,
    pub completed: bool,
}

/// Reconcile an active blast and complete it when nothing is left to send.
/// A blast without any recipients is left alone: it may still be filling.
pub async fn settle_blast(
    db: &Database,
    blast: &EmailBlast,
    reconcile: bool,
) -> Result<SettleOutcome, StoreError> {
    let mut outcome = SettleOutcome::default();
    if !blast.status()?.is_in_flight() {
        return Ok(outcome);
    }
    if reconcile {
        db.reconcile_blast_counters(blast.id).await?;
        outcome.reconciled = true;
    }

    let stats = db.get_recipient_stats(blast.id).await?;
    if stats.total > 0 && stats.outstanding() == 0 {
        db.update_blast_status(blast.id, BlastStatus::Completed, None)
            .await?;
        info!(
            blast_id = %blast.id,
            total = stats.total,
            failed = stats.failed,
            bounced = stats.bounced,
            "blast completed"
        );
        outcome.completed = true;
    }
    Ok(outcome)
}
