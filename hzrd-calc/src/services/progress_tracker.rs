//! Realization progress tracking
//!
//! Workers report finished work units against a realization. Many workers
//! report against the same realization at once, so every update is a single
//! conditional `UPDATE` that reads and writes the counters under the database
//! write lock. No increment is lost and a realization never counts more
//! finished items than it has.

use hzrd_common::db::ProgressTotals;
use hzrd_common::{Error, Result};
use sqlx::{SqliteConnection, SqlitePool};

use crate::db::calculations::lock_wait_for_realization;
use crate::db::realizations::get_realization;
use crate::utils::retry_on_lock;

/// Add `num_items` finished work units to a realization
///
/// Runs on the caller's connection, usually inside the caller's transaction,
/// so the increment commits with whatever else the caller wrote. Sets
/// `is_complete` once `completed_items` reaches `total_items`; the flag is
/// never cleared.
///
/// # Errors
/// - [`Error::InvalidInput`] when `num_items` is not positive or the
///   realization has not been counted yet
/// - [`Error::ProgressOverflow`] when the increment would exceed
///   `total_items`; the row is left unchanged
/// - [`Error::NotFound`] when no realization has this id
pub async fn update_realization(
    conn: &mut SqliteConnection,
    realization_id: i64,
    num_items: i64,
) -> Result<()> {
    if num_items <= 0 {
        return Err(Error::InvalidInput(format!(
            "Progress increment must be positive, got {}",
            num_items
        )));
    }

    // SET expressions see the pre-update row
    let updated: Option<(i64, i64, bool)> = sqlx::query_as(
        r#"
        UPDATE lt_realization
        SET completed_items = completed_items + ?,
            is_complete = CASE
                WHEN completed_items + ? = total_items THEN 1
                ELSE is_complete
            END
        WHERE id = ?
          AND total_items >= 0
          AND completed_items + ? <= total_items
        RETURNING completed_items, total_items, is_complete
        "#,
    )
    .bind(num_items)
    .bind(num_items)
    .bind(realization_id)
    .bind(num_items)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some((completed, total, is_complete)) = updated {
        tracing::debug!(
            realization_id,
            num_items,
            completed_items = completed,
            total_items = total,
            is_complete,
            "Recorded realization progress"
        );
        if is_complete {
            tracing::info!(realization_id, total_items = total, "Realization complete");
        }
        return Ok(());
    }

    // Nothing matched: find out why
    let realization = get_realization(&mut *conn, realization_id).await?;
    match realization.total_items() {
        None => Err(Error::InvalidInput(format!(
            "Realization {} has no work count yet",
            realization_id
        ))),
        Some(total) => {
            tracing::warn!(
                realization_id,
                num_items,
                completed_items = realization.completed_items,
                total_items = total,
                "Rejected progress beyond realization total"
            );
            Err(Error::ProgressOverflow {
                realization_id,
                completed: realization.completed_items,
                total,
                requested: num_items,
            })
        }
    }
}

/// Record progress in its own transaction, retrying on lock contention
///
/// For workers that report outside any transaction of their own.
pub async fn record_progress(
    pool: &SqlitePool,
    realization_id: i64,
    num_items: i64,
    max_wait_ms: u64,
) -> Result<()> {
    retry_on_lock("record_progress", max_wait_ms, || async {
        let mut tx = pool.begin().await?;
        update_realization(&mut tx, realization_id, num_items).await?;
        tx.commit().await?;
        Ok(())
    })
    .await
}

/// Record progress with the lock-retry budget of the realization's calculation
///
/// `max_wait_override` replaces the stored `engine.max_lock_wait_ms` when set.
/// Returns the budget that was used.
pub async fn report_progress(
    pool: &SqlitePool,
    realization_id: i64,
    num_items: i64,
    max_wait_override: Option<u64>,
) -> Result<u64> {
    let max_wait_ms = match max_wait_override {
        Some(ms) => ms,
        None => lock_wait_for_realization(pool, realization_id).await?,
    };

    tracing::debug!(realization_id, num_items, max_wait_ms, "Reporting progress");
    record_progress(pool, realization_id, num_items, max_wait_ms).await?;
    Ok(max_wait_ms)
}

/// Progress summed over every realization of a calculation
///
/// Realizations that have not been counted yet add nothing to the item totals.
pub async fn progress_totals(pool: &SqlitePool, calculation_id: i64) -> Result<ProgressTotals> {
    let (realizations, complete_realizations, total_items, completed_items): (i64, i64, i64, i64) =
        sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN is_complete THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN total_items >= 0 THEN total_items ELSE 0 END), 0),
                COALESCE(SUM(completed_items), 0)
            FROM lt_realization
            WHERE hazard_calculation_id = ?
            "#,
        )
        .bind(calculation_id)
        .fetch_one(pool)
        .await?;

    Ok(ProgressTotals {
        realizations,
        complete_realizations,
        total_items,
        completed_items,
    })
}
