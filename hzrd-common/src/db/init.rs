//! Database initialization
//!
//! Creates the database on first run and brings the schema up to date.
//! Every `CREATE` is idempotent so opening an existing database is safe.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Current schema version, recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// How long a connection waits on SQLite's write lock before reporting busy
pub const BUSY_TIMEOUT_MS: u64 = 5000;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Workers report progress over many pooled connections; foreign keys and
    // busy timeout must hold on every one of them, not just the first
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create every table used by the hazard crates
///
/// Exposed separately so tests can run against `sqlite::memory:` pools.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_hazard_calculation_table(pool).await?;
    create_source_model_input_table(pool).await?;
    create_parsed_source_table(pool).await?;
    create_lt_realization_table(pool).await?;
    create_source_progress_table(pool).await?;
    create_hazard_curve_progress_table(pool).await?;
    create_job_stats_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_hazard_calculation_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS hazard_calculation (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            guid TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            random_seed INTEGER NOT NULL,
            number_of_logic_tree_samples INTEGER NOT NULL DEFAULT 0
                CHECK (number_of_logic_tree_samples >= 0),
            max_lock_wait_ms INTEGER NOT NULL DEFAULT 5000
                CHECK (max_lock_wait_ms >= 0),
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Source model name -> input mapping for a calculation's logic tree
async fn create_source_model_input_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_model_input (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hazard_calculation_id INTEGER NOT NULL
                REFERENCES hazard_calculation(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            UNIQUE (hazard_calculation_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_parsed_source_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parsed_source (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            input_id INTEGER NOT NULL
                REFERENCES source_model_input(id) ON DELETE CASCADE,
            source_id TEXT NOT NULL,
            source_type TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_parsed_source_input ON parsed_source(input_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_lt_realization_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lt_realization (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hazard_calculation_id INTEGER NOT NULL
                REFERENCES hazard_calculation(id) ON DELETE CASCADE,
            ordinal INTEGER NOT NULL CHECK (ordinal >= 0),
            seed INTEGER,
            weight REAL,
            sm_lt_path TEXT NOT NULL,
            gsim_lt_path TEXT NOT NULL,
            total_items INTEGER NOT NULL DEFAULT -1 CHECK (total_items >= -1),
            completed_items INTEGER NOT NULL DEFAULT 0 CHECK (completed_items >= 0),
            is_complete INTEGER NOT NULL DEFAULT 0,
            UNIQUE (hazard_calculation_id, ordinal),
            CHECK (seed IS NULL OR weight IS NULL)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_source_progress_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_progress (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            lt_realization_id INTEGER NOT NULL
                REFERENCES lt_realization(id) ON DELETE CASCADE,
            parsed_source_id INTEGER NOT NULL
                REFERENCES parsed_source(id) ON DELETE CASCADE,
            is_complete INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_source_progress_rlz ON source_progress(lt_realization_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_hazard_curve_progress_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS hazard_curve_progress (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            lt_realization_id INTEGER NOT NULL
                REFERENCES lt_realization(id) ON DELETE CASCADE,
            imt TEXT NOT NULL,
            result_matrix TEXT NOT NULL,
            UNIQUE (lt_realization_id, imt)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_job_stats_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_stats (
            hazard_calculation_id INTEGER PRIMARY KEY
                REFERENCES hazard_calculation(id) ON DELETE CASCADE,
            num_sites INTEGER NOT NULL,
            num_realizations INTEGER NOT NULL,
            num_tasks INTEGER NOT NULL,
            recorded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
