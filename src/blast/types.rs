//! Row types and write payloads for blasts and their recipients.
//!
//! Row types map directly to PostgreSQL rows via `sqlx::FromRow`; statuses are
//! kept as the stored strings and parsed on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BlastStatus, RecipientStatus};
use crate::error::{require_id, StoreError, StoreResult};

/// Database row for an email blast.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EmailBlast {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub segment_id: Uuid,
    pub template_id: Uuid,
    pub name: String,
    pub subject: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: String,
    pub total_recipients: i64,
    pub sent_count: i64,
    pub delivered_count: i64,
    pub opened_count: i64,
    pub clicked_count: i64,
    pub bounced_count: i64,
    pub failed_count: i64,
    pub batch_size: i32,
    pub current_batch: i32,
    pub last_batch_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub send_throttle_per_second: Option<i32>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl EmailBlast {
    pub fn status(&self) -> StoreResult<BlastStatus> {
        self.status.parse()
    }

    /// Share of recipients that have been sent, in percent. Zero until the
    /// recipient total is known.
    pub fn completion_percentage(&self) -> f64 {
        if self.total_recipients <= 0 {
            return 0.0;
        }
        let pct = self.sent_count as f64 * 100.0 / self.total_recipients as f64;
        pct.min(100.0)
    }

    pub fn counters(&self) -> BlastCounters {
        BlastCounters {
            total_recipients: self.total_recipients,
            sent_count: self.sent_count,
            delivered_count: self.delivered_count,
            opened_count: self.opened_count,
            clicked_count: self.clicked_count,
            bounced_count: self.bounced_count,
            failed_count: self.failed_count,
        }
    }
}

/// Database row for one recipient of a blast.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BlastRecipient {
    pub id: Uuid,
    pub blast_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub status: String,
    pub email_log_id: Option<Uuid>,
    pub queued_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub bounced_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub batch_number: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BlastRecipient {
    pub fn status(&self) -> StoreResult<RecipientStatus> {
        self.status.parse()
    }
}

/// Per-status recipient counts for one blast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct RecipientStats {
    pub total: i64,
    pub pending: i64,
    pub queued: i64,
    pub sending: i64,
    pub sent: i64,
    pub delivered: i64,
    pub opened: i64,
    pub clicked: i64,
    pub bounced: i64,
    pub failed: i64,
    /// Recipients with `opened_at` set, whatever their current status.
    pub ever_opened: i64,
    pub ever_clicked: i64,
}

/// The denormalized counters carried on `email_blasts`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlastCounters {
    pub total_recipients: i64,
    pub sent_count: i64,
    pub delivered_count: i64,
    pub opened_count: i64,
    pub clicked_count: i64,
    pub bounced_count: i64,
    pub failed_count: i64,
}

/// Input for creating a blast.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBlast {
    pub campaign_id: Uuid,
    pub segment_id: Uuid,
    pub template_id: Uuid,
    pub name: String,
    pub subject: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub batch_size: i32,
    pub send_throttle_per_second: Option<i32>,
    pub created_by: Option<Uuid>,
}

impl NewBlast {
    pub fn validate(&self) -> StoreResult<()> {
        require_id("campaign_id", self.campaign_id)?;
        require_id("segment_id", self.segment_id)?;
        require_id("template_id", self.template_id)?;
        require_text("name", &self.name)?;
        require_text("subject", &self.subject)?;
        validate_batching(Some(self.batch_size), self.send_throttle_per_second)
    }

    pub fn initial_status(&self) -> BlastStatus {
        BlastStatus::initial(self.scheduled_at)
    }
}

/// Partial edit of a draft blast. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlastDraftUpdate {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub segment_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
    pub batch_size: Option<i32>,
    pub send_throttle_per_second: Option<i32>,
}

impl BlastDraftUpdate {
    pub fn validate(&self) -> StoreResult<()> {
        if let Some(name) = &self.name {
            require_text("name", name)?;
        }
        if let Some(subject) = &self.subject {
            require_text("subject", subject)?;
        }
        if let Some(id) = self.segment_id {
            require_id("segment_id", id)?;
        }
        if let Some(id) = self.template_id {
            require_id("template_id", id)?;
        }
        validate_batching(self.batch_size, self.send_throttle_per_second)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.subject.is_none()
            && self.segment_id.is_none()
            && self.template_id.is_none()
            && self.batch_size.is_none()
            && self.send_throttle_per_second.is_none()
    }
}

/// One user to attach to a blast. The address is copied so later profile
/// edits do not change who the blast went to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewRecipient {
    pub user_id: Uuid,
    pub email: String,
}

impl NewRecipient {
    pub fn new(user_id: Uuid, email: impl Into<String>) -> Self {
        NewRecipient {
            user_id,
            email: email.into(),
        }
    }
}

fn require_text(field: &str, value: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        return Err(StoreError::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn validate_batching(batch_size: Option<i32>, throttle: Option<i32>) -> StoreResult<()> {
    if let Some(size) = batch_size {
        if size <= 0 {
            return Err(StoreError::validation(format!(
                "batch_size must be positive, got {}",
                size
            )));
        }
    }
    if let Some(rate) = throttle {
        if rate <= 0 {
            return Err(StoreError::validation(format!(
                "send_throttle_per_second must be positive, got {}",
                rate
            )));
        }
    }
    Ok(())
}
