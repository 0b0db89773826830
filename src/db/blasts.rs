//! Email blast lifecycle operations.
//!
//! ## Lifecycle
//!
//! 1. `create_blast`: inserts a `draft` (or `scheduled`, when a send time is
//!    given) blast
//! 2. `update_blast_draft` / `schedule_blast`: only while drafting
//! 3. A dispatcher polls `get_scheduled_blasts` and applies `Start`
//! 4. Senders advance `current_batch` and bump counters as mail goes out
//! 5. `update_blast_status` closes the blast; `reconcile_blast_counters`
//!    rewrites counters from the recipient ledger
//!
//! Every status change goes through [`BlastStatus::transition`] first.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Database;
use crate::blast::{
    BlastCounters, BlastDraftUpdate, BlastEvent, BlastStatus, EmailBlast, NewBlast,
};
use crate::error::{require_id, StoreError, StoreResult};

const ENTITY: &str = "email blast";

impl Database {
    /// Create a blast. Starts `scheduled` when `scheduled_at` is set,
    /// otherwise `draft`.
    pub async fn create_blast(&self, blast: &NewBlast) -> StoreResult<EmailBlast> {
        blast.validate()?;
        let status = blast.initial_status();
        let row = sqlx::query_as::<_, EmailBlast>(concat!(
            "INSERT INTO email_blasts (campaign_id, segment_id, template_id, name, subject,
                                       scheduled_at, status, batch_size,
                                       send_throttle_per_second, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING ",
            blast_columns!()
        ))
        .bind(blast.campaign_id)
        .bind(blast.segment_id)
        .bind(blast.template_id)
        .bind(&blast.name)
        .bind(&blast.subject)
        .bind(blast.scheduled_at)
        .bind(status.as_str())
        .bind(blast.batch_size)
        .bind(blast.send_throttle_per_second)
        .bind(blast.created_by)
        .fetch_one(&self.pool)
        .await?;
        info!(blast_id = %row.id, campaign_id = %row.campaign_id, status = %status, "blast created");
        Ok(row)
    }

    /// Get a blast by ID. Soft-deleted blasts are not returned.
    pub async fn get_blast(&self, id: Uuid) -> StoreResult<Option<EmailBlast>> {
        let row = sqlx::query_as::<_, EmailBlast>(concat!(
            "SELECT ",
            blast_columns!(),
            " FROM email_blasts WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Like [`get_blast`](Self::get_blast) but a missing blast is an error.
    pub async fn require_blast(&self, id: Uuid) -> StoreResult<EmailBlast> {
        self.get_blast(id)
            .await?
            .ok_or_else(|| StoreError::not_found(ENTITY, id))
    }

    /// List a campaign's blasts, most recent first.
    pub async fn get_blasts_by_campaign(&self, campaign_id: Uuid) -> StoreResult<Vec<EmailBlast>> {
        let rows = sqlx::query_as::<_, EmailBlast>(concat!(
            "SELECT ",
            blast_columns!(),
            " FROM email_blasts
             WHERE campaign_id = $1 AND deleted_at IS NULL
             ORDER BY created_at DESC"
        ))
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Edit a draft's content, targeting or batching.
    pub async fn update_blast_draft(
        &self,
        id: Uuid,
        update: &BlastDraftUpdate,
    ) -> StoreResult<EmailBlast> {
        update.validate()?;
        let current = self.require_blast(id).await?;
        if update.is_empty() {
            return Ok(current);
        }
        let status = current.status()?;
        if !status.is_editable() {
            return Err(conflict(id, status.as_str(), "edited"));
        }
        let row = sqlx::query_as::<_, EmailBlast>(concat!(
            "UPDATE email_blasts SET
                name = COALESCE($2, name),
                subject = COALESCE($3, subject),
                segment_id = COALESCE($4, segment_id),
                template_id = COALESCE($5, template_id),
                batch_size = COALESCE($6, batch_size),
                send_throttle_per_second = COALESCE($7, send_throttle_per_second),
                updated_at = NOW()
             WHERE id = $1 AND status = 'draft' AND deleted_at IS NULL
             RETURNING ",
            blast_columns!()
        ))
        .bind(id)
        .bind(update.name.as_deref())
        .bind(update.subject.as_deref())
        .bind(update.segment_id)
        .bind(update.template_id)
        .bind(update.batch_size)
        .bind(update.send_throttle_per_second)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(row),
            None => Err(self.explain_missed_write(id, "edited").await),
        }
    }

    /// Schedule a draft for `scheduled_at`.
    pub async fn schedule_blast(
        &self,
        id: Uuid,
        scheduled_at: DateTime<Utc>,
    ) -> StoreResult<EmailBlast> {
        let current = self.require_blast(id).await?;
        self.transition_blast(&current, BlastEvent::Schedule, Some(scheduled_at), None)
            .await
    }

    /// Move a blast to `new_status`, recording `error_message` when given.
    ///
    /// Entering `processing`/`sending` stamps `started_at` once; entering a
    /// terminal status stamps `completed_at`. `scheduled` needs a send time
    /// and is only reachable through [`schedule_blast`](Self::schedule_blast).
    pub async fn update_blast_status(
        &self,
        id: Uuid,
        new_status: BlastStatus,
        error_message: Option<&str>,
    ) -> StoreResult<EmailBlast> {
        let current = self.require_blast(id).await?;
        let event = BlastStatus::event_for(new_status)
            .ok_or_else(|| conflict(id, &current.status, new_status.as_str()))?;
        self.transition_blast(&current, event, None, error_message)
            .await
    }

    /// Apply a lifecycle event to a blast.
    pub async fn apply_blast_event(
        &self,
        id: Uuid,
        event: BlastEvent,
        error_message: Option<&str>,
    ) -> StoreResult<EmailBlast> {
        let current = self.require_blast(id).await?;
        self.transition_blast(&current, event, None, error_message)
            .await
    }

    pub async fn cancel_blast(&self, id: Uuid) -> StoreResult<EmailBlast> {
        self.apply_blast_event(id, BlastEvent::Cancel, None).await
    }

    async fn transition_blast(
        &self,
        current: &EmailBlast,
        event: BlastEvent,
        scheduled_at: Option<DateTime<Utc>>,
        error_message: Option<&str>,
    ) -> StoreResult<EmailBlast> {
        if event == BlastEvent::Schedule && scheduled_at.is_none() {
            return Err(StoreError::validation(
                "scheduling a blast requires scheduled_at; use schedule_blast",
            ));
        }
        let from = current.status()?;
        let to = from
            .transition(event)
            .map_err(|e| conflict(current.id, from.as_str(), e.event.target().as_str()))?;

        let row = sqlx::query_as::<_, EmailBlast>(concat!(
            "UPDATE email_blasts SET
                status = $3,
                scheduled_at = COALESCE($4, scheduled_at),
                error_message = COALESCE($5, error_message),
                started_at = CASE WHEN $6 THEN COALESCE(started_at, NOW()) ELSE started_at END,
                completed_at = CASE WHEN $7 THEN NOW() ELSE completed_at END,
                updated_at = NOW()
             WHERE id = $1 AND status = $2 AND deleted_at IS NULL
             RETURNING ",
            blast_columns!()
        ))
        .bind(current.id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(scheduled_at)
        .bind(error_message)
        .bind(to.is_in_flight())
        .bind(to.is_terminal())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                info!(blast_id = %row.id, from = %from, to = %to, "blast status changed");
                Ok(row)
            }
            None => Err(self.explain_missed_write(current.id, to.as_str()).await),
        }
    }

    /// Overwrite the batch pointer. Last write wins.
    pub async fn update_blast_progress(&self, id: Uuid, current_batch: i32) -> StoreResult<()> {
        if current_batch < 0 {
            return Err(StoreError::validation("current_batch must not be negative"));
        }
        let result = sqlx::query(
            "UPDATE email_blasts SET current_batch = $2, last_batch_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(current_batch)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(ENTITY, id));
        }
        debug!(blast_id = %id, current_batch, "blast progress");
        Ok(())
    }

    /// Overwrite the batch pointer and the authoritative sent count. The
    /// caller supplies the full count, not a delta.
    pub async fn update_blast_progress_with_sent(
        &self,
        id: Uuid,
        sent_count: i64,
        current_batch: i32,
    ) -> StoreResult<()> {
        if current_batch < 0 || sent_count < 0 {
            return Err(StoreError::validation(
                "sent_count and current_batch must not be negative",
            ));
        }
        let result = sqlx::query(
            "UPDATE email_blasts SET sent_count = $2, current_batch = $3,
                    last_batch_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(sent_count)
        .bind(current_batch)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(ENTITY, id));
        }
        debug!(blast_id = %id, sent_count, current_batch, "blast progress");
        Ok(())
    }

    /// Atomically add one to `sent_count`. Returns the new value.
    pub async fn increment_blast_sent_count(&self, id: Uuid) -> StoreResult<i64> {
        self.increment_counter(id, Counter::Sent).await
    }

    /// Atomically add one to `failed_count`. Returns the new value.
    pub async fn increment_blast_failed_count(&self, id: Uuid) -> StoreResult<i64> {
        self.increment_counter(id, Counter::Failed).await
    }

    async fn increment_counter(&self, id: Uuid, counter: Counter) -> StoreResult<i64> {
        let sql = match counter {
            Counter::Sent => {
                "UPDATE email_blasts SET sent_count = sent_count + 1, updated_at = NOW()
                 WHERE id = $1 AND deleted_at IS NULL RETURNING sent_count"
            }
            Counter::Failed => {
                "UPDATE email_blasts SET failed_count = failed_count + 1, updated_at = NOW()
                 WHERE id = $1 AND deleted_at IS NULL RETURNING failed_count"
            }
        };
        sqlx::query_scalar::<_, i64>(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(ENTITY, id))
    }

    /// Set the recipient total used as the completion denominator.
    pub async fn update_blast_total_recipients(&self, id: Uuid, total: i64) -> StoreResult<()> {
        if total < 0 {
            return Err(StoreError::validation("total_recipients must not be negative"));
        }
        let result = sqlx::query(
            "UPDATE email_blasts SET total_recipients = $2, updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(total)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(ENTITY, id));
        }
        Ok(())
    }

    /// Soft-delete a blast. Refused while mail may be going out.
    pub async fn delete_blast(&self, id: Uuid) -> StoreResult<()> {
        let current = self.require_blast(id).await?;
        let status = current.status()?;
        if !status.is_deletable() {
            return Err(conflict(id, status.as_str(), "deleted"));
        }
        let result = sqlx::query(
            "UPDATE email_blasts SET deleted_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND status = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(self.explain_missed_write(id, "deleted").await);
        }
        info!(blast_id = %id, status = %status, "blast deleted");
        Ok(())
    }

    /// Scheduled blasts due at or before `before`, earliest first.
    ///
    /// Polling contract: a dispatcher may see the same blast again until it
    /// moves it out of `scheduled`, so it must apply `Start` promptly.
    pub async fn get_scheduled_blasts(
        &self,
        before: DateTime<Utc>,
    ) -> StoreResult<Vec<EmailBlast>> {
        let rows = sqlx::query_as::<_, EmailBlast>(concat!(
            "SELECT ",
            blast_columns!(),
            " FROM email_blasts
             WHERE status = 'scheduled' AND scheduled_at <= $1 AND deleted_at IS NULL
             ORDER BY scheduled_at ASC"
        ))
        .bind(before)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Blasts currently processing or sending, oldest start first.
    pub async fn get_active_blasts(&self) -> StoreResult<Vec<EmailBlast>> {
        let rows = sqlx::query_as::<_, EmailBlast>(concat!(
            "SELECT ",
            blast_columns!(),
            " FROM email_blasts
             WHERE status IN ('processing', 'sending') AND deleted_at IS NULL
             ORDER BY started_at ASC NULLS LAST"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Rewrite a blast's counters from the recipient ledger, which is the
    /// source of truth when the incremental counters have drifted.
    pub async fn reconcile_blast_counters(&self, id: Uuid) -> StoreResult<EmailBlast> {
        require_id("blast_id", id)?;
        let before = self.require_blast(id).await?;
        let stats = self.get_recipient_stats(id).await?;
        let counters = BlastCounters::from(&stats);
        if before.counters() != counters {
            warn!(
                blast_id = %id,
                sent_before = before.sent_count,
                sent_after = counters.sent_count,
                failed_before = before.failed_count,
                failed_after = counters.failed_count,
                "blast counters drifted from ledger"
            );
        }

        let row = sqlx::query_as::<_, EmailBlast>(concat!(
            "UPDATE email_blasts SET
                total_recipients = $2, sent_count = $3, delivered_count = $4,
                opened_count = $5, clicked_count = $6, bounced_count = $7,
                failed_count = $8, updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING ",
            blast_columns!()
        ))
        .bind(id)
        .bind(counters.total_recipients)
        .bind(counters.sent_count)
        .bind(counters.delivered_count)
        .bind(counters.opened_count)
        .bind(counters.clicked_count)
        .bind(counters.bounced_count)
        .bind(counters.failed_count)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| StoreError::not_found(ENTITY, id))
    }

    /// A guarded write matched nothing: work out whether the blast is gone
    /// or just in a different status than expected.
    async fn explain_missed_write(&self, id: Uuid, attempted: &str) -> StoreError {
        match self.get_blast(id).await {
            Ok(Some(row)) => conflict(id, &row.status, attempted),
            Ok(None) => StoreError::not_found(ENTITY, id),
            Err(e) => e,
        }
    }
}

#[derive(Clone, Copy)]
enum Counter {
    Sent,
    Failed,
}

fn conflict(id: Uuid, current: &str, attempted: &str) -> StoreError {
    StoreError::StateConflict {
        entity: ENTITY,
        id,
        current: current.to_string(),
        attempted: attempted.to_string(),
    }
}
