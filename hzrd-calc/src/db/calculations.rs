//! Hazard calculation records

use chrono::{SecondsFormat, Utc};
use hzrd_common::config::CalculationConfig;
use hzrd_common::db::{HazardCalculation, JobStats};
use hzrd_common::{Error, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Create the calculation row for a job file
pub async fn create_calculation(
    pool: &SqlitePool,
    config: &CalculationConfig,
) -> Result<HazardCalculation> {
    let guid = Uuid::new_v4();
    let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    let max_lock_wait_ms = i64::try_from(config.engine.max_lock_wait_ms).map_err(|_| {
        Error::InvalidInput(format!(
            "engine.max_lock_wait_ms out of range: {}",
            config.engine.max_lock_wait_ms
        ))
    })?;

    let id = sqlx::query(
        r#"
        INSERT INTO hazard_calculation (
            guid, description, random_seed, number_of_logic_tree_samples,
            max_lock_wait_ms, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(guid.to_string())
    .bind(&config.calculation.description)
    .bind(config.calculation.random_seed)
    .bind(i64::from(config.calculation.number_of_logic_tree_samples))
    .bind(max_lock_wait_ms)
    .bind(&created_at)
    .execute(pool)
    .await?
    .last_insert_rowid();

    tracing::info!(
        calculation_id = id,
        guid = %guid,
        random_seed = config.calculation.random_seed,
        samples = config.calculation.number_of_logic_tree_samples,
        "Created hazard calculation"
    );

    get_calculation(pool, id).await
}

pub async fn get_calculation(pool: &SqlitePool, id: i64) -> Result<HazardCalculation> {
    let row = sqlx::query("SELECT * FROM hazard_calculation WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Hazard calculation {}", id)))?;

    HazardCalculation::from_row(&row)
}

/// Delete a calculation; its inputs, realizations and progress rows cascade
pub async fn delete_calculation(pool: &SqlitePool, id: i64) -> Result<()> {
    let deleted = sqlx::query("DELETE FROM hazard_calculation WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(Error::NotFound(format!("Hazard calculation {}", id)));
    }

    tracing::info!(calculation_id = id, "Deleted hazard calculation");
    Ok(())
}

/// Lock-retry budget of the calculation a realization belongs to
pub async fn lock_wait_for_realization(pool: &SqlitePool, realization_id: i64) -> Result<u64> {
    let max_lock_wait_ms: i64 = sqlx::query_scalar(
        r#"
        SELECT c.max_lock_wait_ms
        FROM lt_realization r
        JOIN hazard_calculation c ON c.id = r.hazard_calculation_id
        WHERE r.id = ?
        "#,
    )
    .bind(realization_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Realization {}", realization_id)))?;

    u64::try_from(max_lock_wait_ms)
        .map_err(|_| Error::Internal(format!("Invalid lock wait stored: {}", max_lock_wait_ms)))
}

pub async fn get_job_stats(pool: &SqlitePool, calculation_id: i64) -> Result<Option<JobStats>> {
    let row: Option<(i64, i64, i64, i64)> = sqlx::query_as(
        r#"
        SELECT hazard_calculation_id, num_sites, num_realizations, num_tasks
        FROM job_stats WHERE hazard_calculation_id = ?
        "#,
    )
    .bind(calculation_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(
        |(hazard_calculation_id, num_sites, num_realizations, num_tasks)| JobStats {
            hazard_calculation_id,
            num_sites,
            num_realizations,
            num_tasks,
        },
    ))
}
