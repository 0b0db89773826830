//! # Blast: Email Blast Lifecycle and Recipient Ledger Model
//!
//! Pure domain logic for batch email delivery. Nothing here touches the
//! database; the `db` module calls into these types to decide what a write
//! is allowed to do before it issues it.
//!
//! ## Module Structure
//!
//! - `status`: blast status enum and the transition table
//! - `recipient`: per-recipient status, timestamp rules, batch numbering
//! - `types`: row types and create/update payloads with validation

mod recipient;
mod status;
mod types;

pub use recipient::*;
pub use status::*;
pub use types::*;
