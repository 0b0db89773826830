//! # Database: PostgreSQL Storage Layer
//!
//! Async persistence for email blasts, their recipient ledger, and the
//! billing tables the tier resolver reads, via `sqlx::PgPool`.
//!
//! ## Schema
//!
//! - `email_blasts`: blast definition, status, aggregate counters, batch progress
//! - `blast_recipients`: one row per (blast, user), unique on that pair
//! - `prices`, `subscriptions`, `features`, `limits`, `plan_feature_limits`:
//!   read-only inputs to the tier resolver
//!
//! ## Module Structure
//!
//! - `blasts`: blast lifecycle, counters, scheduling queries
//! - `recipients`: bulk attach, batch claiming, delivery status, stats
//! - `tiers`: price/user to [`TierInfo`](crate::tier::TierInfo) lookups
//!
//! ## Guarded Writes
//!
//! Status-changing writes carry the status they were validated against in
//! their `WHERE` clause. When such a write matches no row the current row is
//! re-read to report either `NotFound` or `StateConflict`.

/// Column list shared by every query returning an [`EmailBlast`](crate::blast::EmailBlast).
macro_rules! blast_columns {
    () => {
        "id, campaign_id, segment_id, template_id, name, subject,
         scheduled_at, started_at, completed_at, status,
         total_recipients, sent_count, delivered_count, opened_count,
         clicked_count, bounced_count, failed_count,
         batch_size, current_batch, last_batch_at, error_message,
         send_throttle_per_second, created_by, created_at, updated_at, deleted_at"
    };
}

/// Column list shared by every query returning a [`BlastRecipient`](crate::blast::BlastRecipient).
macro_rules! recipient_columns {
    () => {
        "id, blast_id, user_id, email, status, email_log_id,
         queued_at, sent_at, delivered_at, opened_at, clicked_at,
         bounced_at, failed_at, error_message, batch_number, created_at, updated_at"
    };
}

mod blasts;
mod recipients;
mod tiers;

use anyhow::Result;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::error::StoreResult;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL using the provided database URL.
    ///
    /// User name and password are percent-decoded from the URL before being
    /// handed to sqlx, so credentials containing `@`, `:` or `.` survive.
    /// Prepared statements are not cached, which keeps the pool usable
    /// behind transaction-mode poolers.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let url = url::Url::parse(database_url)?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username)
            .statement_cache_capacity(0);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        Ok(Database { pool })
    }

    /// Wrap an existing pool (tests, embedding in a larger service).
    pub fn from_pool(pool: PgPool) -> Self {
        Database { pool }
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check: execute `SELECT 1` to verify database connectivity.
    pub async fn health_check(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
