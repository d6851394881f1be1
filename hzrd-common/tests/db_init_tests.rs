//! Tests for database creation and schema bootstrap

use hzrd_common::db::init::{init_database, SCHEMA_VERSION};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("hzrd.db");

    assert!(!db_path.exists());

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("hzrd.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_all_tables_created() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("hzrd.db")).await.unwrap();

    for table in [
        "hazard_calculation",
        "source_model_input",
        "parsed_source",
        "lt_realization",
        "source_progress",
        "hazard_curve_progress",
        "job_stats",
    ] {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1, "table {} missing", table);
    }

    let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(version, SCHEMA_VERSION);
}

#[tokio::test]
async fn test_realization_rejects_seed_and_weight_together() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("hzrd.db")).await.unwrap();

    sqlx::query(
        "INSERT INTO hazard_calculation (guid, random_seed, created_at) VALUES ('g', 1, '2024-01-01T00:00:00Z')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let result = sqlx::query(
        r#"
        INSERT INTO lt_realization (hazard_calculation_id, ordinal, seed, weight, sm_lt_path, gsim_lt_path)
        VALUES (1, 0, 5, 0.5, '[]', '[]')
        "#,
    )
    .execute(&pool)
    .await;

    assert!(result.is_err(), "seed and weight must be mutually exclusive");
}

#[tokio::test]
async fn test_foreign_keys_enforced() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("hzrd.db")).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO source_progress (lt_realization_id, parsed_source_id) VALUES (999, 999)",
    )
    .execute(&pool)
    .await;

    assert!(result.is_err(), "orphan source_progress row must be rejected");
}
