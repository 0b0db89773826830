//! Store error taxonomy.
//!
//! Every `db` operation returns [`StoreError`]. Guarded writes first read the
//! current row so that "row missing" and "row in the wrong status" surface as
//! different variants instead of a bare zero-rows-affected.

use thiserror::Error;
use uuid::Uuid;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The row does not exist or has been soft-deleted.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Input rejected before touching the store.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The row exists but its current status forbids the operation.
    #[error("{entity} {id} is {current}, cannot move to {attempted}")]
    StateConflict {
        entity: &'static str,
        id: Uuid,
        current: String,
        attempted: String,
    },

    /// A stored value could not be decoded into its domain type.
    #[error("invalid stored value: {0}")]
    Encoding(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: Uuid) -> Self {
        StoreError::NotFound { entity, id }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_state_conflict(&self) -> bool {
        matches!(self, StoreError::StateConflict { .. })
    }

    /// Connection, pool and I/O failures are worth retrying with backoff.
    /// Constraint violations and decode errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Store(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// Reject the nil UUID for a required identifier.
pub(crate) fn require_id(field: &str, id: Uuid) -> StoreResult<()> {
    if id.is_nil() {
        return Err(StoreError::validation(format!("{} is required", field)));
    }
    Ok(())
}
