//! Blast status state machine.
//!
//! Every legal lifecycle move is listed once in [`BlastStatus::transition`].
//! The store layer asks this table before issuing any guarded write, so a
//! forbidden move never reaches PostgreSQL.
//!
//! ```text
//! draft       ── Schedule ──────▶ scheduled
//! draft       ── Start ─────────▶ processing
//! scheduled   ── Start ─────────▶ processing
//! processing  ── BeginSending ──▶ sending
//! processing  ── Complete ──────▶ completed     (also from sending)
//! processing  ── Fail ──────────▶ failed        (also from sending)
//! scheduled   ── Cancel ────────▶ cancelled     (also from processing)
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::StoreError;

/// Lifecycle status of an email blast, stored lowercase in `email_blasts.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlastStatus {
    Draft,
    Scheduled,
    Processing,
    Sending,
    Completed,
    Cancelled,
    Failed,
}

/// Something that happens to a blast. Each event has exactly one target status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlastEvent {
    Schedule,
    Start,
    BeginSending,
    Complete,
    Cancel,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot apply {event:?} to a {from} blast")]
pub struct InvalidTransition {
    pub from: BlastStatus,
    pub event: BlastEvent,
}

impl BlastEvent {
    pub const ALL: [BlastEvent; 6] = [
        BlastEvent::Schedule,
        BlastEvent::Start,
        BlastEvent::BeginSending,
        BlastEvent::Complete,
        BlastEvent::Cancel,
        BlastEvent::Fail,
    ];

    pub fn target(self) -> BlastStatus {
        match self {
            BlastEvent::Schedule => BlastStatus::Scheduled,
            BlastEvent::Start => BlastStatus::Processing,
            BlastEvent::BeginSending => BlastStatus::Sending,
            BlastEvent::Complete => BlastStatus::Completed,
            BlastEvent::Cancel => BlastStatus::Cancelled,
            BlastEvent::Fail => BlastStatus::Failed,
        }
    }
}

impl BlastStatus {
    pub const ALL: [BlastStatus; 7] = [
        BlastStatus::Draft,
        BlastStatus::Scheduled,
        BlastStatus::Processing,
        BlastStatus::Sending,
        BlastStatus::Completed,
        BlastStatus::Cancelled,
        BlastStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BlastStatus::Draft => "draft",
            BlastStatus::Scheduled => "scheduled",
            BlastStatus::Processing => "processing",
            BlastStatus::Sending => "sending",
            BlastStatus::Completed => "completed",
            BlastStatus::Cancelled => "cancelled",
            BlastStatus::Failed => "failed",
        }
    }

    /// Status a freshly created blast starts in.
    pub fn initial<T>(scheduled_at: Option<T>) -> Self {
        if scheduled_at.is_some() {
            BlastStatus::Scheduled
        } else {
            BlastStatus::Draft
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BlastStatus::Completed | BlastStatus::Cancelled | BlastStatus::Failed
        )
    }

    /// Mail is (or may be) leaving the building.
    pub fn is_in_flight(self) -> bool {
        matches!(self, BlastStatus::Processing | BlastStatus::Sending)
    }

    pub fn is_deletable(self) -> bool {
        !self.is_in_flight()
    }

    /// Content, targeting and batching may only change while drafting.
    pub fn is_editable(self) -> bool {
        self == BlastStatus::Draft
    }

    pub fn transition(self, event: BlastEvent) -> Result<BlastStatus, InvalidTransition> {
        use BlastEvent::*;
        use BlastStatus::*;

        let legal = match event {
            Schedule => matches!(self, Draft),
            Start => matches!(self, Draft | Scheduled),
            BeginSending => matches!(self, Processing),
            Complete => matches!(self, Processing | Sending),
            Cancel => matches!(self, Scheduled | Processing),
            Fail => matches!(self, Processing | Sending),
        };
        if legal {
            Ok(event.target())
        } else {
            Err(InvalidTransition { from: self, event })
        }
    }

    /// The event that would move a blast into `target`. `Draft` has none:
    /// nothing returns to drafting.
    pub fn event_for(target: BlastStatus) -> Option<BlastEvent> {
        BlastEvent::ALL.into_iter().find(|e| e.target() == target)
    }

    pub fn can_transition_to(self, target: BlastStatus) -> bool {
        Self::event_for(target).is_some_and(|e| self.transition(e).is_ok())
    }
}

impl std::fmt::Display for BlastStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BlastStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlastStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| StoreError::Encoding(format!("unknown blast status '{}'", s)))
    }
}
