//! Per-realization hooks run during initialization
//!
//! Calculators attach their own setup to each new realization (the classical
//! calculator seeds empty hazard curve matrices, for instance) without the
//! initializer knowing what that setup is.

use std::collections::BTreeMap;

use async_trait::async_trait;
use hzrd_common::config::CalculationConfig;
use hzrd_common::db::Realization;
use hzrd_common::{Error, Result};
use sqlx::SqliteConnection;

use crate::db::curves::{insert_hazard_curve_progress, ResultMatrix};

/// Hook invoked once for every realization, in ordinal order
///
/// Runs inside the initializer's transaction: rows written through `conn`
/// commit or roll back with the realizations themselves. An error aborts
/// the whole initialization.
#[async_trait]
pub trait RealizationCallback: Send + Sync {
    async fn on_realization_created(
        &self,
        conn: &mut SqliteConnection,
        realization: &Realization,
    ) -> Result<()>;
}

/// Seeds one zeroed `num_points x num_levels` result matrix per IMT
#[derive(Debug, Clone)]
pub struct HazardCurveProgressSeeder {
    /// IMT -> number of intensity levels
    imts: BTreeMap<String, usize>,
    num_points: usize,
}

impl HazardCurveProgressSeeder {
    pub fn new(imts: &BTreeMap<String, Vec<f64>>, num_points: usize) -> Self {
        Self {
            imts: imts
                .iter()
                .map(|(imt, levels)| (imt.clone(), levels.len()))
                .collect(),
            num_points,
        }
    }

    pub fn from_config(config: &CalculationConfig) -> Self {
        Self::new(&config.intensity_measure_types_and_levels, config.sites.len())
    }

    pub fn is_empty(&self) -> bool {
        self.imts.is_empty()
    }
}

#[async_trait]
impl RealizationCallback for HazardCurveProgressSeeder {
    async fn on_realization_created(
        &self,
        conn: &mut SqliteConnection,
        realization: &Realization,
    ) -> Result<()> {
        for (imt, num_levels) in &self.imts {
            let matrix: ResultMatrix = vec![vec![0.0; *num_levels]; self.num_points];
            insert_hazard_curve_progress(conn, realization.id, imt, &matrix).await?;
        }

        tracing::debug!(
            realization_id = realization.id,
            imts = self.imts.len(),
            num_points = self.num_points,
            "Seeded hazard curve progress"
        );

        Ok(())
    }
}

/// Adapter running a plain closure as a callback
///
/// Closure errors surface as [`Error::Callback`] with the original error inside.
pub struct FnCallback<F>(pub F);

#[async_trait]
impl<F> RealizationCallback for FnCallback<F>
where
    F: Fn(&Realization) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_realization_created(
        &self,
        _conn: &mut SqliteConnection,
        realization: &Realization,
    ) -> Result<()> {
        (self.0)(realization).map_err(Error::Callback)
    }
}
