//! # Main: CLI Entry Point
//!
//! Routes subcommands to the dispatcher and ledger operations. Handles the
//! shared concerns: `.env` loading, structured logging, configuration and
//! database connection.
//!
//! ## Subcommands
//!
//! - `tick` / `run`: one dispatch tick, or ticks forever on the poll interval
//! - `attach`: bulk-attach recipients from a JSON file
//! - `claim`: claim a batch slice for an external sender, printed as JSON
//! - `stats` / `reconcile`: ledger aggregation and counter repair
//! - `tier`: resolve entitlements for a user or price
//! - `health`: database connectivity check
//!
//! ## Global Options
//!
//! - `--database-url` / `DATABASE_URL`: PostgreSQL connection.
//! - `--config` / `WAITLIST_CONFIG`: TOML dispatcher configuration.

mod cli;

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(
    name = "waitlist-blast",
    about = "Track email blast delivery for waitlist campaigns"
)]
struct Cli {
    /// PostgreSQL connection URL (or set DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Path to a TOML config file with a [dispatch] section
    #[arg(long, env = "WAITLIST_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single dispatch tick and print what it did
    Tick,
    /// Run dispatch ticks until interrupted
    Run,
    /// Attach recipients to a blast from a JSON array of {user_id, email}
    Attach {
        /// Blast to attach recipients to
        #[arg(long)]
        blast_id: Uuid,
        /// Path to the JSON recipient list
        #[arg(long)]
        file: PathBuf,
        /// Recipients per batch (defaults to the blast's own batch size)
        #[arg(long)]
        batch_size: Option<u32>,
    },
    /// Claim pending recipients of one batch and print them as JSON
    Claim {
        /// Blast to claim from
        #[arg(long)]
        blast_id: Uuid,
        /// Batch number to claim from
        #[arg(long)]
        batch: i32,
        /// Maximum recipients to claim (defaults to dispatch.claim_limit)
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Print per-status recipient counts for a blast
    Stats {
        /// Blast to summarize
        #[arg(long)]
        blast_id: Uuid,
    },
    /// Rewrite a blast's counters from its recipient ledger
    Reconcile {
        /// Blast to reconcile
        #[arg(long)]
        blast_id: Uuid,
    },
    /// Resolve tier entitlements
    #[command(group(ArgGroup::new("subject").required(true).args(["user_id", "price_id", "free"])))]
    Tier {
        /// Resolve via the user's active subscription
        #[arg(long)]
        user_id: Option<Uuid>,
        /// Resolve a specific price
        #[arg(long)]
        price_id: Option<Uuid>,
        /// Resolve the free tier
        #[arg(long)]
        free: bool,
    },
    /// Check database connectivity
    Health,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Logs go to stderr so stdout stays pure command output. LOG_FORMAT=json
    // switches to one JSON object per line.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    let config = waitlist_blast::config::load(cli.config.as_deref())?;

    let database_url = cli.database_url.as_deref().ok_or_else(|| {
        anyhow::anyhow!("DATABASE_URL is required (set via --database-url or env)")
    })?;
    let rt = tokio::runtime::Runtime::new()?;
    let db = rt.block_on(waitlist_blast::db::Database::connect(database_url))?;

    rt.block_on(async {
        match &cli.command {
            Commands::Tick => cli::run_tick(&db, &config).await,
            Commands::Run => cli::run_loop(&db, &config).await,
            Commands::Attach {
                blast_id,
                file,
                batch_size,
            } => cli::run_attach(&db, *blast_id, file, *batch_size).await,
            Commands::Claim {
                blast_id,
                batch,
                limit,
            } => cli::run_claim(&db, &config, *blast_id, *batch, *limit).await,
            Commands::Stats { blast_id } => cli::run_stats(&db, *blast_id).await,
            Commands::Reconcile { blast_id } => cli::run_reconcile(&db, *blast_id).await,
            Commands::Tier {
                user_id,
                price_id,
                free,
            } => cli::run_tier(&db, *user_id, *price_id, *free).await,
            Commands::Health => cli::run_health(&db).await,
        }
    })
}
