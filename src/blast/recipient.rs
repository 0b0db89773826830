//! Recipient delivery status and batch partitioning.
//!
//! ```text
//! pending → queued → sending → sent → delivered → opened → clicked
//!                                   ↘ bounced
//!                       ↘ failed
//! ```
//!
//! The ledger does not police recipient transitions; the sender reports what
//! happened and the row follows. Only the timestamp bookkeeping differs per
//! status (see [`RecipientStatus::timestamp_column`]).

use serde::{Deserialize, Serialize};

use super::types::{BlastCounters, RecipientStats};
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientStatus {
    Pending,
    Queued,
    Sending,
    Sent,
    Delivered,
    Opened,
    Clicked,
    Bounced,
    Failed,
}

impl RecipientStatus {
    pub const ALL: [RecipientStatus; 9] = [
        RecipientStatus::Pending,
        RecipientStatus::Queued,
        RecipientStatus::Sending,
        RecipientStatus::Sent,
        RecipientStatus::Delivered,
        RecipientStatus::Opened,
        RecipientStatus::Clicked,
        RecipientStatus::Bounced,
        RecipientStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecipientStatus::Pending => "pending",
            RecipientStatus::Queued => "queued",
            RecipientStatus::Sending => "sending",
            RecipientStatus::Sent => "sent",
            RecipientStatus::Delivered => "delivered",
            RecipientStatus::Opened => "opened",
            RecipientStatus::Clicked => "clicked",
            RecipientStatus::Bounced => "bounced",
            RecipientStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RecipientStatus::Bounced | RecipientStatus::Failed)
    }

    /// Still owed a send attempt.
    pub fn is_outstanding(self) -> bool {
        matches!(
            self,
            RecipientStatus::Pending | RecipientStatus::Queued | RecipientStatus::Sending
        )
    }

    /// Column stamped when a recipient enters this status. Whitelisted names
    /// only; the result is spliced into SQL.
    pub(crate) fn timestamp_column(self) -> Option<&'static str> {
        match self {
            RecipientStatus::Pending | RecipientStatus::Sending => None,
            RecipientStatus::Queued => Some("queued_at"),
            RecipientStatus::Sent => Some("sent_at"),
            RecipientStatus::Delivered => Some("delivered_at"),
            RecipientStatus::Opened => Some("opened_at"),
            RecipientStatus::Clicked => Some("clicked_at"),
            RecipientStatus::Bounced => Some("bounced_at"),
            RecipientStatus::Failed => Some("failed_at"),
        }
    }

    /// First touch wins: a second open or click keeps the original timestamp.
    pub(crate) fn stamps_once(self) -> bool {
        matches!(self, RecipientStatus::Opened | RecipientStatus::Clicked)
    }

    /// SQL fragment for the timestamp side effect of entering this status.
    pub(crate) fn timestamp_assignment(self) -> Option<String> {
        let col = self.timestamp_column()?;
        Some(if self.stamps_once() {
            format!("{col} = COALESCE({col}, NOW())")
        } else {
            format!("{col} = NOW()")
        })
    }
}

impl std::fmt::Display for RecipientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecipientStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecipientStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| StoreError::Encoding(format!("unknown recipient status '{}'", s)))
    }
}

/// Batch a recipient lands in given its position in the insert order.
pub fn batch_number(index: usize, batch_size: u32) -> i32 {
    debug_assert!(batch_size > 0);
    (index / batch_size as usize) as i32
}

/// Batch numbers for `len` recipients inserted in order.
pub fn assign_batch_numbers(len: usize, batch_size: u32) -> Vec<i32> {
    (0..len).map(|i| batch_number(i, batch_size)).collect()
}

/// Highest batch index `len` recipients occupy, `None` when empty.
pub fn last_batch_number(len: usize, batch_size: u32) -> Option<i32> {
    len.checked_sub(1).map(|last| batch_number(last, batch_size))
}

impl From<&RecipientStats> for BlastCounters {
    /// Counters are cumulative: a delivered recipient was also sent, a
    /// clicked one was also delivered. Opens and clicks count anyone who ever
    /// opened or clicked, including recipients that bounced afterwards.
    fn from(s: &RecipientStats) -> Self {
        BlastCounters {
            total_recipients: s.total,
            sent_count: s.sent + s.delivered + s.opened + s.clicked + s.bounced,
            delivered_count: s.delivered + s.opened + s.clicked,
            opened_count: s.ever_opened,
            clicked_count: s.ever_clicked,
            bounced_count: s.bounced,
            failed_count: s.failed,
        }
    }
}

impl RecipientStats {
    pub fn outstanding(&self) -> i64 {
        self.pending + self.queued + self.sending
    }
}
