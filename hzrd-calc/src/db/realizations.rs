//! Realization and source progress records

use hzrd_common::db::{Realization, SourceProgress};
use hzrd_common::{Error, Result};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

/// Fields of a realization about to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewRealization {
    pub ordinal: u32,
    pub seed: Option<i32>,
    pub weight: Option<f64>,
    pub sm_lt_path: Vec<String>,
    pub gsim_lt_path: Vec<String>,
}

/// Insert a realization in the `Created` state (work units not yet counted)
pub async fn insert_realization(
    conn: &mut SqliteConnection,
    calculation_id: i64,
    new: NewRealization,
) -> Result<Realization> {
    let sm_lt_path = serde_json::to_string(&new.sm_lt_path)?;
    let gsim_lt_path = serde_json::to_string(&new.gsim_lt_path)?;

    let id = sqlx::query(
        r#"
        INSERT INTO lt_realization (
            hazard_calculation_id, ordinal, seed, weight, sm_lt_path, gsim_lt_path, total_items
        )
        VALUES (?, ?, ?, ?, ?, ?, -1)
        "#,
    )
    .bind(calculation_id)
    .bind(i64::from(new.ordinal))
    .bind(new.seed)
    .bind(new.weight)
    .bind(&sm_lt_path)
    .bind(&gsim_lt_path)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(Realization::created(
        id,
        calculation_id,
        new.ordinal,
        new.seed,
        new.weight,
        new.sm_lt_path,
        new.gsim_lt_path,
    ))
}

pub async fn get_realization<'e, E>(executor: E, id: i64) -> Result<Realization>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM lt_realization WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Realization {}", id)))?;

    Realization::from_row(&row)
}

/// All realizations of a calculation, by ordinal
pub async fn list_realizations(pool: &SqlitePool, calculation_id: i64) -> Result<Vec<Realization>> {
    let rows = sqlx::query(
        "SELECT * FROM lt_realization WHERE hazard_calculation_id = ? ORDER BY ordinal",
    )
    .bind(calculation_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(Realization::from_row).collect()
}

pub async fn count_source_progress(pool: &SqlitePool, realization_id: i64) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM source_progress WHERE lt_realization_id = ?")
            .bind(realization_id)
            .fetch_one(pool)
            .await?;

    Ok(count)
}

pub async fn list_source_progress(
    pool: &SqlitePool,
    realization_id: i64,
) -> Result<Vec<SourceProgress>> {
    let rows = sqlx::query_as::<_, SourceProgress>(
        r#"
        SELECT id, lt_realization_id, parsed_source_id, is_complete
        FROM source_progress
        WHERE lt_realization_id = ?
        ORDER BY id
        "#,
    )
    .bind(realization_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
