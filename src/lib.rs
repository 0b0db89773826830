//! # waitlist-blast
//!
//! Persistence and lifecycle logic for email blasts sent to waitlist
//! segments: the blast state machine, the per-recipient delivery ledger with
//! batch claiming, counter reconciliation, and the tier lookups that decide
//! whether a customer may send blasts at all.
//!
//! ## Modules
//!
//! - [`blast`]: status enums, transition table, row types, validation
//! - [`tier`]: feature/limit projection of a billing price
//! - [`db`]: PostgreSQL operations over `sqlx::PgPool`
//! - [`dispatch`]: scheduler tick: promote due blasts, settle active ones
//! - [`config`]: TOML configuration for the dispatcher
//! - [`error`]: store error taxonomy

pub mod blast;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod tier;

pub use error::{StoreError, StoreResult};
