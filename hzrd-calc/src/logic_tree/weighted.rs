//! Weighted logic tree built from the job file
//!
//! The source model tree has a single branching level. The GSIM tree is an
//! ordered list of branch sets, one per tectonic region; a GSIM path picks one
//! branch from every set.

use std::collections::HashSet;

use hzrd_common::config::{GsimBranchConfig, GsimBranchSetConfig, LogicTreeConfig, SourceModelBranchConfig};
use hzrd_common::{Error, Result};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{LogicTreePath, LogicTreeProcessor};

/// Branch weights of a set must sum to one within this tolerance
const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct WeightedLogicTree {
    source_models: Vec<SourceModelBranchConfig>,
    source_model_index: WeightedIndex<f64>,
    gsim_sets: Vec<GsimBranchSetConfig>,
    gsim_indices: Vec<WeightedIndex<f64>>,
}

impl WeightedLogicTree {
    /// Validate the declared trees and build the sampling tables
    pub fn from_config(config: &LogicTreeConfig) -> Result<Self> {
        let sm_weights = validate_branch_set(
            "source model logic tree",
            config
                .source_models
                .iter()
                .map(|b| (b.branch_id.as_str(), b.weight)),
        )?;
        let source_model_index = weighted_index("source model logic tree", &sm_weights)?;

        let mut gsim_indices = Vec::with_capacity(config.gsim_branch_sets.len());
        for set in &config.gsim_branch_sets {
            let label = format!("GSIM branch set '{}'", set.tectonic_region);
            let weights = validate_branch_set(
                &label,
                set.branches.iter().map(|b| (b.branch_id.as_str(), b.weight)),
            )?;
            gsim_indices.push(weighted_index(&label, &weights)?);
        }

        Ok(Self {
            source_models: config.source_models.clone(),
            source_model_index,
            gsim_sets: config.gsim_branch_sets.clone(),
            gsim_indices,
        })
    }

    /// Number of paths `enumerate_paths` yields
    pub fn path_count(&self) -> usize {
        self.gsim_sets
            .iter()
            .map(|set| set.branches.len())
            .product::<usize>()
            * self.source_models.len()
    }

    /// All GSIM paths with their weights; the last branch set varies fastest
    fn gsim_combinations(&self) -> Vec<(Vec<String>, f64)> {
        let mut combos: Vec<(Vec<String>, f64)> = vec![(Vec::new(), 1.0)];
        for set in &self.gsim_sets {
            combos = combos
                .into_iter()
                .flat_map(|(path, weight)| {
                    set.branches.iter().map(move |branch: &GsimBranchConfig| {
                        let mut extended = path.clone();
                        extended.push(branch.branch_id.clone());
                        (extended, weight * branch.weight)
                    })
                })
                .collect();
        }
        combos
    }
}

impl LogicTreeProcessor for WeightedLogicTree {
    fn enumerate_paths(&self) -> Result<Vec<LogicTreePath>> {
        let gsim_combos = self.gsim_combinations();
        let mut paths = Vec::with_capacity(self.path_count());

        for sm in &self.source_models {
            for (gsim_path, gsim_weight) in &gsim_combos {
                paths.push(LogicTreePath {
                    source_model_name: sm.name.clone(),
                    weight: Some(sm.weight * gsim_weight),
                    sm_lt_path: vec![sm.branch_id.clone()],
                    gsim_lt_path: gsim_path.clone(),
                });
            }
        }

        Ok(paths)
    }

    fn sample_source_model(&self, seed: i32) -> Result<(String, Vec<String>)> {
        let mut rng = rng_from_seed(seed);
        let branch = &self.source_models[self.source_model_index.sample(&mut rng)];
        Ok((branch.name.clone(), vec![branch.branch_id.clone()]))
    }

    fn sample_gsim(&self, seed: i32) -> Result<Vec<String>> {
        let mut rng = rng_from_seed(seed);
        Ok(self
            .gsim_sets
            .iter()
            .zip(&self.gsim_indices)
            .map(|(set, index)| set.branches[index.sample(&mut rng)].branch_id.clone())
            .collect())
    }
}

/// Generator for one sampling call; the `i32` is sign-extended into the seed
pub(crate) fn rng_from_seed(seed: i32) -> StdRng {
    StdRng::seed_from_u64(i64::from(seed) as u64)
}

fn validate_branch_set<'a>(
    label: &str,
    branches: impl Iterator<Item = (&'a str, f64)>,
) -> Result<Vec<f64>> {
    let mut seen = HashSet::new();
    let mut weights = Vec::new();

    for (branch_id, weight) in branches {
        if !seen.insert(branch_id) {
            return Err(Error::Config(format!(
                "{}: duplicate branch id '{}'",
                label, branch_id
            )));
        }
        if !weight.is_finite() || weight <= 0.0 {
            return Err(Error::Config(format!(
                "{}: branch '{}' has invalid weight {}",
                label, branch_id, weight
            )));
        }
        weights.push(weight);
    }

    if weights.is_empty() {
        return Err(Error::Config(format!("{}: no branches", label)));
    }

    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(Error::Config(format!(
            "{}: branch weights sum to {}, expected 1.0",
            label, sum
        )));
    }

    Ok(weights)
}

fn weighted_index(label: &str, weights: &[f64]) -> Result<WeightedIndex<f64>> {
    WeightedIndex::new(weights.iter().copied())
        .map_err(|e| Error::Config(format!("{}: {}", label, e)))
}
