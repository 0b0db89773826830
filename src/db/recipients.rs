//! Recipient ledger operations.
//!
//! Recipients are attached in bulk and partitioned into fixed-size batches.
//! Sender workers claim pending recipients of one batch atomically with
//! `FOR UPDATE SKIP LOCKED`, so two workers on the same batch never receive
//! the same row.
//!
//! ## Lifecycle
//!
//! 1. `bulk_insert_recipients`: one statement, duplicates skipped
//! 2. `claim_pending_recipients`: `pending → queued` for up to `limit` rows
//! 3. `update_recipient_status`: sender reports each outcome
//! 4. `get_recipient_stats`: per-status aggregation for reconciliation

use tracing::{debug, info};
use uuid::Uuid;

use super::Database;
use crate::blast::{
    assign_batch_numbers, BlastRecipient, NewRecipient, RecipientStats, RecipientStatus,
};
use crate::error::{require_id, StoreError, StoreResult};

impl Database {
    /// Attach recipients to a blast, assigning `batch_number = index / batch_size`
    /// over the input order. Pairs already attached are skipped, so retrying
    /// the whole call is safe. Returns how many rows were actually inserted.
    ///
    /// One statement, so all-or-nothing: any failure leaves no row of this
    /// call behind.
    pub async fn bulk_insert_recipients(
        &self,
        blast_id: Uuid,
        recipients: &[NewRecipient],
        batch_size: u32,
    ) -> StoreResult<u64> {
        require_id("blast_id", blast_id)?;
        if batch_size == 0 {
            return Err(StoreError::validation("batch_size must be positive"));
        }
        for r in recipients {
            require_id("user_id", r.user_id)?;
            if r.email.trim().is_empty() {
                return Err(StoreError::validation(format!(
                    "recipient {} has no email address",
                    r.user_id
                )));
            }
        }
        self.require_blast(blast_id).await?;
        if recipients.is_empty() {
            return Ok(0);
        }

        let user_ids: Vec<Uuid> = recipients.iter().map(|r| r.user_id).collect();
        let emails: Vec<&str> = recipients.iter().map(|r| r.email.as_str()).collect();
        let batches = assign_batch_numbers(recipients.len(), batch_size);

        // created_at is offset by input position so creation order matches
        // the order the recipients were given in.
        let inserted = sqlx::query(
            "INSERT INTO blast_recipients (blast_id, user_id, email, batch_number, created_at, updated_at)
             SELECT $1::uuid, r.user_id, r.email, r.batch_number,
                    NOW() + r.ord * INTERVAL '1 microsecond', NOW()
             FROM UNNEST($2::uuid[], $3::text[], $4::int[])
                  WITH ORDINALITY AS r(user_id, email, batch_number, ord)
             ORDER BY r.ord
             ON CONFLICT (blast_id, user_id) DO NOTHING",
        )
        .bind(blast_id)
        .bind(&user_ids)
        .bind(&emails)
        .bind(&batches)
        .execute(&self.pool)
        .await?
        .rows_affected();

        info!(
            blast_id = %blast_id,
            requested = recipients.len(),
            inserted,
            batch_size,
            "recipients attached"
        );
        Ok(inserted)
    }

    /// Pending recipients of one batch in creation order. Read-only: nothing
    /// is claimed, so concurrent callers may see the same rows. Senders should
    /// use [`claim_pending_recipients`](Self::claim_pending_recipients).
    pub async fn get_pending_recipients(
        &self,
        blast_id: Uuid,
        batch: i32,
        limit: i64,
    ) -> StoreResult<Vec<BlastRecipient>> {
        validate_limit(limit)?;
        let rows = sqlx::query_as::<_, BlastRecipient>(concat!(
            "SELECT ",
            recipient_columns!(),
            " FROM blast_recipients
             WHERE blast_id = $1 AND batch_number = $2 AND status = 'pending'
             ORDER BY created_at ASC, id ASC
             LIMIT $3"
        ))
        .bind(blast_id)
        .bind(batch)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Atomically claim up to `limit` pending recipients of one batch,
    /// moving them to `queued` and stamping `queued_at`.
    ///
    /// Rows locked by a concurrent claimer are skipped rather than waited on,
    /// so overlapping workers split the batch between them. Returns the
    /// claimed rows in creation order; empty when the batch is drained.
    pub async fn claim_pending_recipients(
        &self,
        blast_id: Uuid,
        batch: i32,
        limit: i64,
    ) -> StoreResult<Vec<BlastRecipient>> {
        validate_limit(limit)?;
        let mut rows = sqlx::query_as::<_, BlastRecipient>(concat!(
            "WITH claimable AS (
                SELECT id AS claim_id FROM blast_recipients
                WHERE blast_id = $1 AND batch_number = $2 AND status = 'pending'
                ORDER BY created_at ASC, id ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            UPDATE blast_recipients SET
                status = 'queued',
                queued_at = NOW(),
                updated_at = NOW()
            FROM claimable
            WHERE blast_recipients.id = claimable.claim_id
            RETURNING ",
            recipient_columns!()
        ))
        .bind(blast_id)
        .bind(batch)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        debug!(blast_id = %blast_id, batch, claimed = rows.len(), "recipients claimed");
        Ok(rows)
    }

    /// Record a delivery outcome for one recipient.
    ///
    /// Stamps the timestamp column of the new status; `opened_at` and
    /// `clicked_at` keep their first value. `email_log_id` and
    /// `error_message` are only overwritten when provided.
    pub async fn update_recipient_status(
        &self,
        recipient_id: Uuid,
        status: RecipientStatus,
        email_log_id: Option<Uuid>,
        error_message: Option<&str>,
    ) -> StoreResult<BlastRecipient> {
        let stamp = status
            .timestamp_assignment()
            .map(|s| format!(", {}", s))
            .unwrap_or_default();
        let sql = format!(
            "UPDATE blast_recipients SET
                status = $2,
                email_log_id = COALESCE($3, email_log_id),
                error_message = COALESCE($4, error_message){},
                updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            stamp,
            recipient_columns!()
        );
        let row = sqlx::query_as::<_, BlastRecipient>(&sql)
            .bind(recipient_id)
            .bind(status.as_str())
            .bind(email_log_id)
            .bind(error_message)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("blast recipient", recipient_id))?;
        debug!(recipient_id = %recipient_id, blast_id = %row.blast_id, status = %status, "recipient status");
        Ok(row)
    }

    pub async fn get_recipient(&self, recipient_id: Uuid) -> StoreResult<Option<BlastRecipient>> {
        let row = sqlx::query_as::<_, BlastRecipient>(concat!(
            "SELECT ",
            recipient_columns!(),
            " FROM blast_recipients WHERE id = $1"
        ))
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Page through a blast's recipients in batch order.
    pub async fn get_blast_recipients(
        &self,
        blast_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<BlastRecipient>> {
        validate_limit(limit)?;
        if offset < 0 {
            return Err(StoreError::validation("offset must not be negative"));
        }
        let rows = sqlx::query_as::<_, BlastRecipient>(concat!(
            "SELECT ",
            recipient_columns!(),
            " FROM blast_recipients
             WHERE blast_id = $1
             ORDER BY batch_number ASC, created_at ASC, id ASC
             LIMIT $2 OFFSET $3"
        ))
        .bind(blast_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Count recipients per status in a single pass.
    pub async fn get_recipient_stats(&self, blast_id: Uuid) -> StoreResult<RecipientStats> {
        let row = sqlx::query_as::<_, RecipientStats>(
            "SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'queued') AS queued,
                COUNT(*) FILTER (WHERE status = 'sending') AS sending,
                COUNT(*) FILTER (WHERE status = 'sent') AS sent,
                COUNT(*) FILTER (WHERE status = 'delivered') AS delivered,
                COUNT(*) FILTER (WHERE status = 'opened') AS opened,
                COUNT(*) FILTER (WHERE status = 'clicked') AS clicked,
                COUNT(*) FILTER (WHERE status = 'bounced') AS bounced,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COUNT(opened_at) AS ever_opened,
                COUNT(clicked_at) AS ever_clicked
             FROM blast_recipients WHERE blast_id = $1",
        )
        .bind(blast_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Highest batch index assigned for a blast, `None` without recipients.
    pub async fn get_max_batch_number(&self, blast_id: Uuid) -> StoreResult<Option<i32>> {
        let max: Option<i32> =
            sqlx::query_scalar("SELECT MAX(batch_number) FROM blast_recipients WHERE blast_id = $1")
                .bind(blast_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(max)
    }
}

fn validate_limit(limit: i64) -> StoreResult<()> {
    if limit <= 0 {
        return Err(StoreError::validation(format!(
            "limit must be positive, got {}",
            limit
        )));
    }
    Ok(())
}
