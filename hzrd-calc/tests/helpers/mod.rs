//! Shared setup for hzrd-calc integration tests

#![allow(dead_code)]

use hzrd_calc::db::calculations::create_calculation;
use hzrd_calc::db::sources::register_source_models;
use hzrd_common::config::CalculationConfig;
use hzrd_common::db::{init_database, HazardCalculation};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Two source models (3 and 1 sources) and two GSIM branch sets: 8 paths
pub const ENUMERATION_JOB: &str = r#"
[calculation]
description = "enumerated"
random_seed = 42
number_of_logic_tree_samples = 0

[engine]
block_size = 2

[intensity_measure_types_and_levels]
PGA = [0.1, 0.2, 0.4]
"SA(0.1)" = [0.1, 0.2]

[[sites]]
lon = 0.0
lat = 0.0

[[sites]]
lon = 0.5
lat = 0.5

[[logic_tree.source_models]]
branch_id = "b1"
name = "source_model_1.xml"
weight = 0.6
sources = [{ id = "src_A", kind = "area" }, { id = "src_B" }, { id = "src_C", kind = "fault" }]

[[logic_tree.source_models]]
branch_id = "b2"
name = "source_model_2.xml"
weight = 0.4
sources = [{ id = "src_D" }]

[[logic_tree.gsim_branch_sets]]
tectonic_region = "Active Shallow Crust"
branches = [
    { branch_id = "g1", gsim = "BooreAtkinson2008", weight = 0.5 },
    { branch_id = "g2", gsim = "ChiouYoungs2008", weight = 0.5 },
]

[[logic_tree.gsim_branch_sets]]
tectonic_region = "Stable Continental"
branches = [
    { branch_id = "h1", gsim = "Campbell2003", weight = 0.3 },
    { branch_id = "h2", gsim = "ToroEtAl2002", weight = 0.7 },
]
"#;

/// Same trees, sampled `samples` times
pub fn sampling_job(samples: u32) -> String {
    ENUMERATION_JOB
        .replace("number_of_logic_tree_samples = 0", &format!("number_of_logic_tree_samples = {}", samples))
        .replace("description = \"enumerated\"", "description = \"sampled\"")
}

/// One realization with `num_sources` sources
pub fn single_path_job(num_sources: usize) -> String {
    let sources: Vec<String> = (0..num_sources)
        .map(|i| format!("{{ id = \"src_{}\" }}", i))
        .collect();

    format!(
        r#"
[calculation]
random_seed = 7

[intensity_measure_types_and_levels]
PGA = [0.1]

[[logic_tree.source_models]]
branch_id = "b1"
name = "only.xml"
weight = 1.0
sources = [{}]

[[logic_tree.gsim_branch_sets]]
tectonic_region = "Active Shallow Crust"
branches = [{{ branch_id = "g1", gsim = "BooreAtkinson2008", weight = 1.0 }}]
"#,
        sources.join(", ")
    )
}

/// On-disk database; pooled connections share it, unlike `sqlite::memory:`
pub async fn setup_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("hzrd.db")).await.unwrap();
    (temp_dir, pool)
}

/// Parse the job, create its calculation and register its source models
pub async fn create_job(pool: &SqlitePool, job: &str) -> (CalculationConfig, HazardCalculation) {
    let config = CalculationConfig::from_toml_str(job).unwrap();
    let calculation = create_calculation(pool, &config).await.unwrap();
    register_source_models(pool, calculation.id, &config.logic_tree)
        .await
        .unwrap();
    (config, calculation)
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}
