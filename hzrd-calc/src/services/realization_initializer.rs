//! Realization initialization
//!
//! Creates the `lt_realization` and `source_progress` records of a
//! calculation, either by full enumeration of the logic trees (realizations
//! carry a weight) or by Monte-Carlo sampling (realizations carry a seed).
//!
//! **Algorithm (both modes):**
//! 1. Take the next logic tree path
//! 2. Resolve the source model input registered under its name (cached per pass)
//! 3. Insert the realization with the next ordinal, work count not yet known
//! 4. Materialize one source progress row per parsed source and record the count
//! 5. Run every callback, in order
//!
//! The pass runs in a single transaction: all realizations are created or
//! none are.

use std::collections::HashMap;

use hzrd_common::db::{HazardCalculation, Realization, SourceModelInput};
use hzrd_common::{Error, Result};
use sqlx::{Connection, SqliteConnection, SqlitePool};

use super::callbacks::RealizationCallback;
use super::sampling::{SeedSource, StdSeedSource};
use crate::db::realizations::{insert_realization, NewRealization};
use crate::db::sources::find_source_model_input;
use crate::logic_tree::LogicTreeProcessor;
use crate::utils::begin_monitored;

pub struct RealizationInitializer<'a, P: LogicTreeProcessor + ?Sized> {
    pool: &'a SqlitePool,
    calculation: &'a HazardCalculation,
    processor: &'a P,
}

impl<'a, P: LogicTreeProcessor + ?Sized> RealizationInitializer<'a, P> {
    pub fn new(pool: &'a SqlitePool, calculation: &'a HazardCalculation, processor: &'a P) -> Self {
        Self {
            pool,
            calculation,
            processor,
        }
    }

    /// Create every realization of the calculation
    ///
    /// Sampling mode when `number_of_logic_tree_samples > 0`, enumeration
    /// otherwise. Returns the realizations in ordinal order. On any error the
    /// transaction is rolled back and no realization remains.
    pub async fn initialize_realizations(
        &self,
        callbacks: &[Box<dyn RealizationCallback>],
    ) -> Result<Vec<Realization>> {
        let mode = if self.calculation.is_sampling() {
            "monte_carlo"
        } else {
            "enumeration"
        };
        tracing::info!(
            calculation_id = self.calculation.id,
            mode,
            callbacks = callbacks.len(),
            "Initializing realizations"
        );

        let mut tx = begin_monitored(self.pool, "realization_initializer::initialize").await?;

        let result = self.initialize_in(tx.connection()?, callbacks).await;

        match result {
            Ok(realizations) => {
                tx.commit().await?;
                tracing::info!(
                    calculation_id = self.calculation.id,
                    mode,
                    realizations = realizations.len(),
                    total_items = realizations.iter().filter_map(|r| r.total_items()).sum::<i64>(),
                    "Realizations initialized"
                );
                Ok(realizations)
            }
            Err(err) => {
                tracing::warn!(
                    calculation_id = self.calculation.id,
                    error = %err,
                    "Realization initialization failed, rolling back"
                );
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn initialize_in(
        &self,
        conn: &mut SqliteConnection,
        callbacks: &[Box<dyn RealizationCallback>],
    ) -> Result<Vec<Realization>> {
        let existing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM lt_realization WHERE hazard_calculation_id = ?",
        )
        .bind(self.calculation.id)
        .fetch_one(&mut *conn)
        .await?;

        if existing > 0 {
            return Err(Error::InvalidInput(format!(
                "Calculation {} already has {} realizations",
                self.calculation.id, existing
            )));
        }

        if self.calculation.is_sampling() {
            let mut seeds = StdSeedSource::new(self.calculation.random_seed);
            self.initialize_monte_carlo(conn, &mut seeds, callbacks).await
        } else {
            self.initialize_enumeration(conn, callbacks).await
        }
    }

    /// Full enumeration: one realization per logic tree path, with its weight
    pub async fn initialize_enumeration(
        &self,
        conn: &mut SqliteConnection,
        callbacks: &[Box<dyn RealizationCallback>],
    ) -> Result<Vec<Realization>> {
        let paths = self.processor.enumerate_paths()?;
        let mut cache = SourceModelCache::new(self.calculation.id);
        let mut realizations = Vec::with_capacity(paths.len());

        for (ordinal, path) in paths.into_iter().enumerate() {
            let ordinal = u32::try_from(ordinal)
                .map_err(|_| Error::InvalidInput("Too many logic tree paths".to_string()))?;

            let realization = self
                .materialize(
                    conn,
                    &mut cache,
                    &path.source_model_name,
                    NewRealization {
                        ordinal,
                        seed: None,
                        weight: path.weight,
                        sm_lt_path: path.sm_lt_path,
                        gsim_lt_path: path.gsim_lt_path,
                    },
                    callbacks,
                )
                .await?;
            realizations.push(realization);
        }

        Ok(realizations)
    }

    /// Monte-Carlo sampling of `number_of_logic_tree_samples` paths
    ///
    /// Realization `i` records the seed its two draws were made from. The
    /// first one records the configured `random_seed`; every later seed is the
    /// third draw of the previous iteration, so the whole run can be replayed
    /// from the configured seed alone.
    pub async fn initialize_monte_carlo<S: SeedSource + Send>(
        &self,
        conn: &mut SqliteConnection,
        seeds: &mut S,
        callbacks: &[Box<dyn RealizationCallback>],
    ) -> Result<Vec<Realization>> {
        let samples = self.calculation.number_of_logic_tree_samples;
        let mut cache = SourceModelCache::new(self.calculation.id);
        let mut realizations = Vec::with_capacity(samples as usize);

        let mut seed = self.calculation.random_seed;
        seeds.reseed(seed);

        for ordinal in 0..samples {
            let (source_model_name, sm_lt_path) =
                self.processor.sample_source_model(seeds.next_seed())?;
            let gsim_lt_path = self.processor.sample_gsim(seeds.next_seed())?;

            let realization = self
                .materialize(
                    conn,
                    &mut cache,
                    &source_model_name,
                    NewRealization {
                        ordinal,
                        seed: Some(seed),
                        weight: None,
                        sm_lt_path,
                        gsim_lt_path,
                    },
                    callbacks,
                )
                .await?;
            realizations.push(realization);

            seed = seeds.next_seed();
            seeds.reseed(seed);
        }

        Ok(realizations)
    }

    async fn materialize(
        &self,
        conn: &mut SqliteConnection,
        cache: &mut SourceModelCache,
        source_model_name: &str,
        new: NewRealization,
        callbacks: &[Box<dyn RealizationCallback>],
    ) -> Result<Realization> {
        // Resolve first so an unknown name never leaves a realization behind
        let input = cache.resolve(conn, source_model_name).await?;

        let mut realization = insert_realization(conn, self.calculation.id, new).await?;
        let total_items = initialize_source_progress(conn, &mut realization, &input).await?;

        tracing::debug!(
            realization_id = realization.id,
            ordinal = realization.ordinal,
            seed = ?realization.seed,
            weight = ?realization.weight,
            source_model = %input.name,
            total_items,
            "Created realization"
        );

        for callback in callbacks {
            callback.on_realization_created(conn, &realization).await?;
        }

        Ok(realization)
    }
}

/// Materialize the work units of a realization
///
/// Inserts one `source_progress` row per parsed source of `input`, ordered by
/// source id, and sets the realization's `total_items` to their count. Both
/// statements run in one savepoint, so nobody can see rows without the count
/// or the count without rows. Returns the count.
pub async fn initialize_source_progress(
    conn: &mut SqliteConnection,
    realization: &mut Realization,
    input: &SourceModelInput,
) -> Result<i64> {
    let mut savepoint = conn.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO source_progress (lt_realization_id, parsed_source_id, is_complete)
        SELECT ?, id, 0
        FROM parsed_source
        WHERE input_id = ?
        ORDER BY id
        "#,
    )
    .bind(realization.id)
    .bind(input.id)
    .execute(&mut *savepoint)
    .await?;

    let total_items: i64 = sqlx::query_scalar(
        r#"
        UPDATE lt_realization
        SET total_items = (SELECT COUNT(*) FROM source_progress WHERE lt_realization_id = ?)
        WHERE id = ?
        RETURNING total_items
        "#,
    )
    .bind(realization.id)
    .bind(realization.id)
    .fetch_one(&mut *savepoint)
    .await?;

    savepoint.commit().await?;

    realization.set_counted(total_items);
    Ok(total_items)
}

/// Source model inputs resolved during one initialization pass
struct SourceModelCache {
    calculation_id: i64,
    inputs: HashMap<String, SourceModelInput>,
}

impl SourceModelCache {
    fn new(calculation_id: i64) -> Self {
        Self {
            calculation_id,
            inputs: HashMap::new(),
        }
    }

    async fn resolve(&mut self, conn: &mut SqliteConnection, name: &str) -> Result<SourceModelInput> {
        if let Some(input) = self.inputs.get(name) {
            return Ok(input.clone());
        }

        let input = find_source_model_input(conn, self.calculation_id, name)
            .await?
            .ok_or_else(|| {
                Error::Config(format!(
                    "Source model '{}' is not registered for calculation {}",
                    name, self.calculation_id
                ))
            })?;

        self.inputs.insert(name.to_string(), input.clone());
        Ok(input)
    }
}
