//! Intermediate hazard curve results, one matrix per realization and IMT

use hzrd_common::Result;
use sqlx::{SqliteConnection, SqlitePool};

/// Rows are sites, columns are intensity measure levels
pub type ResultMatrix = Vec<Vec<f64>>;

pub async fn insert_hazard_curve_progress(
    conn: &mut SqliteConnection,
    realization_id: i64,
    imt: &str,
    matrix: &ResultMatrix,
) -> Result<()> {
    let encoded = serde_json::to_string(matrix)?;

    sqlx::query(
        "INSERT INTO hazard_curve_progress (lt_realization_id, imt, result_matrix) VALUES (?, ?, ?)",
    )
    .bind(realization_id)
    .bind(imt)
    .bind(&encoded)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// `(imt, matrix)` pairs for a realization, ordered by IMT
pub async fn list_hazard_curve_progress(
    pool: &SqlitePool,
    realization_id: i64,
) -> Result<Vec<(String, ResultMatrix)>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT imt, result_matrix FROM hazard_curve_progress WHERE lt_realization_id = ? ORDER BY imt",
    )
    .bind(realization_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(imt, encoded)| Ok((imt, serde_json::from_str(&encoded)?)))
        .collect()
}
