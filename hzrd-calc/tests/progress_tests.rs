//! Integration tests for realization progress under concurrent workers
//!
//! These run against an on-disk database so that every pooled connection
//! sees the same data and contends for the same write lock.

mod helpers;

use helpers::{create_job, setup_db, single_path_job, ENUMERATION_JOB};
use hzrd_calc::db::calculations::{get_calculation, lock_wait_for_realization};
use hzrd_calc::db::realizations::get_realization;
use hzrd_calc::{
    progress_totals, record_progress, report_progress, update_realization,
    RealizationInitializer, WeightedLogicTree,
};
use hzrd_common::db::{Realization, RealizationState};
use hzrd_common::Error;
use sqlx::SqlitePool;
use tokio::task::JoinSet;

async fn initialize(pool: &SqlitePool, job: &str) -> Vec<Realization> {
    let (config, calculation) = create_job(pool, job).await;
    let tree = WeightedLogicTree::from_config(&config.logic_tree).unwrap();
    RealizationInitializer::new(pool, &calculation, &tree)
        .initialize_realizations(&[])
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_single_item_updates_all_counted() {
    const WORKERS: i64 = 16;

    let (_dir, pool) = setup_db().await;
    let realizations = initialize(&pool, &single_path_job(WORKERS as usize)).await;
    let id = realizations[0].id;
    assert_eq!(realizations[0].total_items(), Some(WORKERS));

    let mut join_set = JoinSet::new();
    for _ in 0..WORKERS {
        let pool = pool.clone();
        join_set.spawn(async move { record_progress(&pool, id, 1, 10_000).await });
    }
    while let Some(result) = join_set.join_next().await {
        result.expect("Task panicked").unwrap();
    }

    let rlz = get_realization(&pool, id).await.unwrap();
    assert_eq!(rlz.completed_items, WORKERS);
    assert!(rlz.is_complete);
    assert_eq!(rlz.state(), RealizationState::Complete { total: WORKERS });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_never_exceed_total() {
    let (_dir, pool) = setup_db().await;
    let realizations = initialize(&pool, &single_path_job(10)).await;
    let id = realizations[0].id;

    // 8 workers x 2 items against 10: exactly 5 succeed
    let mut join_set = JoinSet::new();
    for _ in 0..8 {
        let pool = pool.clone();
        join_set.spawn(async move { record_progress(&pool, id, 2, 10_000).await });
    }

    let mut accepted = 0;
    let mut rejected = 0;
    while let Some(result) = join_set.join_next().await {
        match result.expect("Task panicked") {
            Ok(()) => accepted += 1,
            Err(Error::ProgressOverflow { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(accepted, 5);
    assert_eq!(rejected, 3);

    let rlz = get_realization(&pool, id).await.unwrap();
    assert_eq!(rlz.completed_items, 10);
    assert!(rlz.is_complete);
}

#[tokio::test]
async fn test_over_completion_leaves_row_unchanged() {
    let (_dir, pool) = setup_db().await;
    let realizations = initialize(&pool, &single_path_job(3)).await;
    let id = realizations[0].id;

    record_progress(&pool, id, 2, 1000).await.unwrap();
    let err = record_progress(&pool, id, 5, 1000).await.unwrap_err();
    assert!(matches!(
        err,
        Error::ProgressOverflow {
            completed: 2,
            total: 3,
            requested: 5,
            ..
        }
    ));

    let rlz = get_realization(&pool, id).await.unwrap();
    assert_eq!(
        rlz.state(),
        RealizationState::Counted {
            total: 3,
            completed: 2
        }
    );
}

#[tokio::test]
async fn test_completion_flag_is_monotone() {
    let (_dir, pool) = setup_db().await;
    let realizations = initialize(&pool, &single_path_job(2)).await;
    let id = realizations[0].id;

    record_progress(&pool, id, 1, 1000).await.unwrap();
    assert!(!get_realization(&pool, id).await.unwrap().is_complete);

    record_progress(&pool, id, 1, 1000).await.unwrap();
    assert!(get_realization(&pool, id).await.unwrap().is_complete);

    // A rejected update does not clear the flag
    assert!(record_progress(&pool, id, 1, 1000).await.is_err());
    let rlz = get_realization(&pool, id).await.unwrap();
    assert!(rlz.is_complete);
    assert_eq!(rlz.completed_items, 2);
}

#[tokio::test]
async fn test_update_commits_with_caller_transaction() {
    let (_dir, pool) = setup_db().await;
    let realizations = initialize(&pool, &single_path_job(4)).await;
    let id = realizations[0].id;

    let mut tx = pool.begin().await.unwrap();
    sqlx::query("UPDATE source_progress SET is_complete = 1 WHERE lt_realization_id = ? AND id IN (SELECT id FROM source_progress WHERE lt_realization_id = ? ORDER BY id LIMIT 2)")
        .bind(id)
        .bind(id)
        .execute(&mut *tx)
        .await
        .unwrap();
    update_realization(&mut tx, id, 2).await.unwrap();
    tx.commit().await.unwrap();

    let rlz = get_realization(&pool, id).await.unwrap();
    assert_eq!(rlz.completed_items, 2);

    let done: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM source_progress WHERE lt_realization_id = ? AND is_complete = 1",
    )
    .bind(id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(done, rlz.completed_items);
}

#[tokio::test]
async fn test_unknown_realization_not_found() {
    let (_dir, pool) = setup_db().await;

    let err = record_progress(&pool, 12345, 1, 1000).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_progress_totals_over_calculation() {
    let (_dir, pool) = setup_db().await;
    let realizations = initialize(&pool, ENUMERATION_JOB).await;
    let calculation_id = realizations[0].hazard_calculation_id;

    // Finish every realization of the second source model (1 source each)
    for rlz in realizations.iter().filter(|r| r.sm_lt_path == vec!["b2"]) {
        record_progress(&pool, rlz.id, 1, 1000).await.unwrap();
    }

    let totals = progress_totals(&pool, calculation_id).await.unwrap();
    assert_eq!(totals.realizations, 8);
    assert_eq!(totals.complete_realizations, 4);
    assert_eq!(totals.total_items, 16);
    assert_eq!(totals.completed_items, 4);
    assert!((totals.percentage() - 25.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_report_progress_uses_calculation_lock_wait() {
    let (_dir, pool) = setup_db().await;
    let job = ENUMERATION_JOB.replace("block_size = 2", "block_size = 2\nmax_lock_wait_ms = 250");
    let realizations = initialize(&pool, &job).await;
    let rlz = &realizations[0];

    let calculation = get_calculation(&pool, rlz.hazard_calculation_id).await.unwrap();
    assert_eq!(calculation.max_lock_wait_ms, 250);
    assert_eq!(lock_wait_for_realization(&pool, rlz.id).await.unwrap(), 250);

    let used = report_progress(&pool, rlz.id, 1, None).await.unwrap();
    assert_eq!(used, 250);
    assert_eq!(get_realization(&pool, rlz.id).await.unwrap().completed_items, 1);

    let used = report_progress(&pool, rlz.id, 1, Some(40)).await.unwrap();
    assert_eq!(used, 40);
    assert_eq!(get_realization(&pool, rlz.id).await.unwrap().completed_items, 2);
}

#[tokio::test]
async fn test_report_progress_default_lock_wait() {
    let (_dir, pool) = setup_db().await;
    let realizations = initialize(&pool, &single_path_job(2)).await;

    let used = report_progress(&pool, realizations[0].id, 2, None).await.unwrap();
    assert_eq!(used, 5000);
    assert!(get_realization(&pool, realizations[0].id).await.unwrap().is_complete);
}

#[tokio::test]
async fn test_report_progress_unknown_realization() {
    let (_dir, pool) = setup_db().await;

    let err = report_progress(&pool, 12345, 1, None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
