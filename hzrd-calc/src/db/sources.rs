//! Source model registration
//!
//! Each source model named by the logic tree is registered once per
//! calculation, together with its parsed sources. Realizations find their
//! input through this name mapping.

use hzrd_common::config::LogicTreeConfig;
use hzrd_common::db::{ParsedSource, SourceModelInput};
use hzrd_common::Result;
use sqlx::{SqliteConnection, SqlitePool};

/// Register every source model of the logic tree with its sources
///
/// Idempotent: a name already mapped for this calculation is reused and its
/// sources are not inserted a second time.
pub async fn register_source_models(
    pool: &SqlitePool,
    calculation_id: i64,
    logic_tree: &LogicTreeConfig,
) -> Result<Vec<SourceModelInput>> {
    let mut tx = pool.begin().await?;
    let mut inputs = Vec::with_capacity(logic_tree.source_models.len());

    for branch in &logic_tree.source_models {
        if let Some(existing) = find_source_model_input(&mut tx, calculation_id, &branch.name).await? {
            tracing::debug!(
                calculation_id,
                name = %branch.name,
                input_id = existing.id,
                "Reusing registered source model"
            );
            if !inputs.contains(&existing) {
                inputs.push(existing);
            }
            continue;
        }

        let input_id = sqlx::query(
            "INSERT INTO source_model_input (hazard_calculation_id, name) VALUES (?, ?)",
        )
        .bind(calculation_id)
        .bind(&branch.name)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for source in &branch.sources {
            sqlx::query(
                "INSERT INTO parsed_source (input_id, source_id, source_type) VALUES (?, ?, ?)",
            )
            .bind(input_id)
            .bind(&source.id)
            .bind(&source.kind)
            .execute(&mut *tx)
            .await?;
        }

        tracing::debug!(
            calculation_id,
            name = %branch.name,
            input_id,
            sources = branch.sources.len(),
            "Registered source model"
        );

        inputs.push(SourceModelInput {
            id: input_id,
            hazard_calculation_id: calculation_id,
            name: branch.name.clone(),
        });
    }

    tx.commit().await?;

    tracing::info!(
        calculation_id,
        source_models = inputs.len(),
        "Source models registered"
    );

    Ok(inputs)
}

/// Look up the input registered under a source model name
pub async fn find_source_model_input(
    conn: &mut SqliteConnection,
    calculation_id: i64,
    name: &str,
) -> Result<Option<SourceModelInput>> {
    let input = sqlx::query_as::<_, SourceModelInput>(
        r#"
        SELECT id, hazard_calculation_id, name
        FROM source_model_input
        WHERE hazard_calculation_id = ? AND name = ?
        "#,
    )
    .bind(calculation_id)
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(input)
}

pub async fn list_parsed_sources(pool: &SqlitePool, input_id: i64) -> Result<Vec<ParsedSource>> {
    let sources = sqlx::query_as::<_, ParsedSource>(
        "SELECT id, input_id, source_id, source_type FROM parsed_source WHERE input_id = ? ORDER BY id",
    )
    .bind(input_id)
    .fetch_all(pool)
    .await?;

    Ok(sources)
}
