//! Calculation size statistics recorded once realizations exist

use chrono::{SecondsFormat, Utc};
use hzrd_common::db::JobStats;
use hzrd_common::{Error, Result};
use sqlx::SqlitePool;

/// Count realizations and tasks and store them in `job_stats`
///
/// A realization with `n` sources is split into `ceil(n / block_size)`
/// tasks. Recording again overwrites the previous row.
pub async fn record_init_stats(
    pool: &SqlitePool,
    calculation_id: i64,
    num_sites: i64,
    block_size: u32,
) -> Result<JobStats> {
    if block_size == 0 {
        return Err(Error::InvalidInput("block_size must be positive".to_string()));
    }

    let source_counts: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT COUNT(sp.id)
        FROM lt_realization r
        LEFT JOIN source_progress sp ON sp.lt_realization_id = r.id
        WHERE r.hazard_calculation_id = ?
        GROUP BY r.id
        ORDER BY r.ordinal
        "#,
    )
    .bind(calculation_id)
    .fetch_all(pool)
    .await?;

    let block_size = i64::from(block_size);
    let num_realizations = source_counts.len() as i64;
    let num_tasks: i64 = source_counts
        .iter()
        .map(|count| (count + block_size - 1) / block_size)
        .sum();

    sqlx::query(
        r#"
        INSERT INTO job_stats (hazard_calculation_id, num_sites, num_realizations, num_tasks, recorded_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(hazard_calculation_id) DO UPDATE SET
            num_sites = excluded.num_sites,
            num_realizations = excluded.num_realizations,
            num_tasks = excluded.num_tasks,
            recorded_at = excluded.recorded_at
        "#,
    )
    .bind(calculation_id)
    .bind(num_sites)
    .bind(num_realizations)
    .bind(num_tasks)
    .bind(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
    .execute(pool)
    .await?;

    tracing::info!(
        calculation_id,
        num_sites,
        num_realizations,
        num_tasks,
        "Recorded calculation statistics"
    );

    Ok(JobStats {
        hazard_calculation_id: calculation_id,
        num_sites,
        num_realizations,
        num_tasks,
    })
}
