//! Calculation bootstrap from a loaded job file

use hzrd_common::config::CalculationConfig;
use hzrd_common::db::{HazardCalculation, JobStats, Realization};
use hzrd_common::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::calculations::{create_calculation, delete_calculation};
use crate::db::sources::register_source_models;
use crate::logic_tree::WeightedLogicTree;
use crate::services::callbacks::{HazardCurveProgressSeeder, RealizationCallback};
use crate::services::init_stats::record_init_stats;
use crate::services::realization_initializer::RealizationInitializer;

/// Everything `setup_calculation` created
#[derive(Debug, Clone)]
pub struct CalculationSetup {
    pub calculation: HazardCalculation,
    pub realizations: Vec<Realization>,
    pub stats: JobStats,
}

/// Create a calculation, register its source models, initialize its
/// realizations and record its size statistics
///
/// The hazard curve seeder runs first when the job defines IMTs, then
/// `extra_callbacks` in order. When any step after the calculation row is
/// created fails, the row is deleted (its inputs and realizations cascade)
/// and the original error is returned.
pub async fn setup_calculation(
    pool: &SqlitePool,
    config: &CalculationConfig,
    extra_callbacks: Vec<Box<dyn RealizationCallback>>,
) -> Result<CalculationSetup> {
    let tree = WeightedLogicTree::from_config(&config.logic_tree)?;
    let calculation = create_calculation(pool, config).await?;

    match populate(pool, config, &calculation, &tree, extra_callbacks).await {
        Ok((realizations, stats)) => Ok(CalculationSetup {
            calculation,
            realizations,
            stats,
        }),
        Err(e) => {
            warn!(
                calculation_id = calculation.id,
                error = %e,
                "Calculation setup failed; removing calculation"
            );
            if let Err(cleanup) = delete_calculation(pool, calculation.id).await {
                warn!(
                    calculation_id = calculation.id,
                    error = %cleanup,
                    "Could not remove partially created calculation"
                );
            }
            Err(e)
        }
    }
}

async fn populate(
    pool: &SqlitePool,
    config: &CalculationConfig,
    calculation: &HazardCalculation,
    tree: &WeightedLogicTree,
    extra_callbacks: Vec<Box<dyn RealizationCallback>>,
) -> Result<(Vec<Realization>, JobStats)> {
    let inputs = register_source_models(pool, calculation.id, &config.logic_tree).await?;
    info!(
        calculation_id = calculation.id,
        source_models = inputs.len(),
        "Registered source models"
    );

    let mut callbacks: Vec<Box<dyn RealizationCallback>> = Vec::new();
    let seeder = HazardCurveProgressSeeder::from_config(config);
    if !seeder.is_empty() {
        callbacks.push(Box::new(seeder));
    }
    callbacks.extend(extra_callbacks);

    let realizations = RealizationInitializer::new(pool, calculation, tree)
        .initialize_realizations(&callbacks)
        .await?;

    let stats = record_init_stats(
        pool,
        calculation.id,
        config.sites.len() as i64,
        config.engine.block_size,
    )
    .await?;

    Ok((realizations, stats))
}
