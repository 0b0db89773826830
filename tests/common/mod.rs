//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;
use waitlist_blast::blast::{BlastEvent, BlastStatus, EmailBlast, NewBlast, NewRecipient};
use waitlist_blast::db::Database;

/// Returns the test database URL from the `TEST_DATABASE_URL` environment variable.
/// Panics if the variable is not set.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for integration tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// One-time schema initialization.
static SCHEMA_INIT: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

/// Tests truncate shared tables, so only one may hold the database at a time.
static DB_LOCK: Mutex<()> = Mutex::new(());

/// A connected, freshly truncated database, held exclusively by one test.
pub struct TestDb {
    pub db: Database,
    _guard: MutexGuard<'static, ()>,
}

impl std::ops::Deref for TestDb {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}

/// Connect to the test database (also ensures schema is set up).
pub async fn setup_test_db() -> TestDb {
    let guard = DB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    SCHEMA_INIT
        .get_or_init(|| async {
            let pool = sqlx::PgPool::connect(&test_db_url()).await.unwrap();
            run_migrations(&pool).await;
            pool.close().await;
        })
        .await;
    let db = Database::connect(&test_db_url())
        .await
        .expect("Failed to connect to test database");
    truncate_all_tables(db.pool()).await;
    TestDb { db, _guard: guard }
}

/// Truncate all tables to ensure test isolation.
pub async fn truncate_all_tables(pool: &sqlx::PgPool) {
    sqlx::raw_sql(
        "TRUNCATE TABLE blast_recipients, email_blasts,
                       plan_feature_limits, subscriptions, prices, features, limits
         CASCADE",
    )
    .execute(pool)
    .await
    .unwrap();
}

/// Apply the schema files in order.
async fn run_migrations(pool: &sqlx::PgPool) {
    let migration_files = ["migrations/001_email_blasts.sql", "migrations/002_tiers.sql"];

    for file in &migration_files {
        let path = std::path::Path::new(file);
        if !path.exists() {
            panic!("Migration file not found: {}", file);
        }
        let sql = std::fs::read_to_string(path).unwrap();
        sqlx::raw_sql(&sql).execute(pool).await.unwrap_or_else(|e| {
            panic!("Migration {} failed: {}", file, e);
        });
    }
}

// ── Fixtures ────────────────────────────────────────────────────

pub fn new_blast(scheduled_at: Option<DateTime<Utc>>, batch_size: i32) -> NewBlast {
    NewBlast {
        campaign_id: Uuid::new_v4(),
        segment_id: Uuid::new_v4(),
        template_id: Uuid::new_v4(),
        name: "Spring launch".into(),
        subject: "You're in".into(),
        scheduled_at,
        batch_size,
        send_throttle_per_second: Some(10),
        created_by: None,
    }
}

pub fn recipients(n: usize) -> Vec<NewRecipient> {
    (0..n)
        .map(|i| NewRecipient::new(Uuid::new_v4(), format!("user{}@example.com", i)))
        .collect()
}

/// Create a blast and walk it to `status` through legal events.
pub async fn blast_in(db: &Database, status: BlastStatus) -> EmailBlast {
    let blast = db.create_blast(&new_blast(None, 10)).await.unwrap();
    let path: &[BlastEvent] = match status {
        BlastStatus::Draft => &[],
        BlastStatus::Scheduled => &[BlastEvent::Schedule],
        BlastStatus::Processing => &[BlastEvent::Start],
        BlastStatus::Sending => &[BlastEvent::Start, BlastEvent::BeginSending],
        BlastStatus::Completed => &[BlastEvent::Start, BlastEvent::Complete],
        BlastStatus::Cancelled => &[BlastEvent::Schedule, BlastEvent::Cancel],
        BlastStatus::Failed => &[BlastEvent::Start, BlastEvent::Fail],
    };
    let mut current = blast;
    for event in path {
        current = match event {
            BlastEvent::Schedule => db.schedule_blast(current.id, Utc::now()).await.unwrap(),
            other => db.apply_blast_event(current.id, *other, None).await.unwrap(),
        };
    }
    assert_eq!(current.status().unwrap(), status);
    current
}

/// Seed a price with feature rows. `limits` entries are (feature, limit, value).
pub async fn seed_price(
    pool: &sqlx::PgPool,
    description: &str,
    features: &[(&str, bool)],
    limits: &[(&str, Option<i64>)],
) -> Uuid {
    let price_id: Uuid =
        sqlx::query_scalar("INSERT INTO prices (description) VALUES ($1) RETURNING id")
            .bind(description)
            .fetch_one(pool)
            .await
            .unwrap();
    for (name, enabled) in features {
        let feature_id = upsert_named(pool, "features", name).await;
        sqlx::query(
            "INSERT INTO plan_feature_limits (price_id, feature_id, enabled) VALUES ($1, $2, $3)",
        )
        .bind(price_id)
        .bind(feature_id)
        .bind(*enabled)
        .execute(pool)
        .await
        .unwrap();
    }
    for (name, value) in limits {
        let feature_id = upsert_named(pool, "features", name).await;
        let limit_id = upsert_named(pool, "limits", name).await;
        sqlx::query(
            "INSERT INTO plan_feature_limits (price_id, feature_id, limit_id, enabled, limit_value)
             VALUES ($1, $2, $3, TRUE, $4)",
        )
        .bind(price_id)
        .bind(feature_id)
        .bind(limit_id)
        .bind(*value)
        .execute(pool)
        .await
        .unwrap();
    }
    price_id
}

async fn upsert_named(pool: &sqlx::PgPool, table: &str, name: &str) -> Uuid {
    let sql = format!(
        "INSERT INTO {table} (name) VALUES ($1)
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
         RETURNING id"
    );
    sqlx::query_scalar(&sql)
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn subscribe(pool: &sqlx::PgPool, user_id: Uuid, price_id: Uuid, status: &str) {
    sqlx::query("INSERT INTO subscriptions (user_id, price_id, status) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(price_id)
        .bind(status)
        .execute(pool)
        .await
        .unwrap();
}
