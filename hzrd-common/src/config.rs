//! Job file loading and database path resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding the database location
pub const DATABASE_ENV_VAR: &str = "HZRD_DATABASE";

/// Hazard calculation job file
///
/// ```toml
/// [calculation]
/// description = "Classical PSHA, two source models"
/// random_seed = 42
/// number_of_logic_tree_samples = 0
///
/// [engine]
/// block_size = 10
///
/// [intensity_measure_types_and_levels]
/// PGA = [0.005, 0.007, 0.0098]
///
/// [[sites]]
/// lon = 0.0
/// lat = 0.0
///
/// [[logic_tree.source_models]]
/// branch_id = "b1"
/// name = "source_model_1.xml"
/// weight = 1.0
/// sources = [{ id = "src_A", kind = "area" }]
///
/// [[logic_tree.gsim_branch_sets]]
/// tectonic_region = "Active Shallow Crust"
/// branches = [{ branch_id = "g1", gsim = "BooreAtkinson2008", weight = 1.0 }]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationConfig {
    pub calculation: CalculationSection,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub sites: Vec<Site>,
    /// IMT name -> intensity measure levels
    #[serde(default)]
    pub intensity_measure_types_and_levels: BTreeMap<String, Vec<f64>>,
    pub logic_tree: LogicTreeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationSection {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub random_seed: i32,
    /// Zero selects full enumeration of the logic tree
    #[serde(default)]
    pub number_of_logic_tree_samples: u32,
}

/// Worker and task sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Number of sources handled by one task
    pub block_size: u32,
    /// Upper bound on lock-retry waiting for progress reports; stored with
    /// the calculation so workers reporting later use the same budget
    pub max_lock_wait_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            block_size: 10,
            max_lock_wait_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogicTreeConfig {
    #[serde(default)]
    pub source_models: Vec<SourceModelBranchConfig>,
    #[serde(default)]
    pub gsim_branch_sets: Vec<GsimBranchSetConfig>,
}

/// One branch of the source model logic tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceModelBranchConfig {
    pub branch_id: String,
    /// Source model file name; realizations are mapped to inputs by this name
    pub name: String,
    pub weight: f64,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    #[serde(default = "default_source_kind")]
    pub kind: String,
}

fn default_source_kind() -> String {
    "point".to_string()
}

/// GSIM branches for one tectonic region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GsimBranchSetConfig {
    pub tectonic_region: String,
    pub branches: Vec<GsimBranchConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GsimBranchConfig {
    pub branch_id: String,
    pub gsim: String,
    pub weight: f64,
}

impl CalculationConfig {
    /// Load and validate a job file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;
        info!(
            path = %path.display(),
            samples = config.calculation.number_of_logic_tree_samples,
            source_models = config.logic_tree.source_models.len(),
            "Loaded job file"
        );
        Ok(config)
    }

    /// Parse and validate a job file from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CalculationConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.block_size == 0 {
            return Err(Error::Config("engine.block_size must be positive".to_string()));
        }
        if self.logic_tree.source_models.is_empty() {
            return Err(Error::Config(
                "logic_tree.source_models must contain at least one branch".to_string(),
            ));
        }
        for (imt, levels) in &self.intensity_measure_types_and_levels {
            if levels.is_empty() {
                return Err(Error::Config(format!("IMT {} has no intensity levels", imt)));
            }
        }
        Ok(())
    }

    /// True when realizations are Monte-Carlo sampled rather than enumerated
    pub fn is_sampling(&self) -> bool {
        self.calculation.number_of_logic_tree_samples > 0
    }
}

/// Database path resolution, in priority order:
/// 1. Command-line argument
/// 2. `HZRD_DATABASE` environment variable
/// 3. `database` key of the user TOML config file
/// 4. OS-dependent compiled default
pub fn resolve_database_path(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Ok(config_path) = user_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(db) = config.get("database").and_then(|v| v.as_str()) {
                    return PathBuf::from(db);
                }
            }
        }
    }

    let default = default_database_path();
    debug!(path = %default.display(), "Using default database location");
    default
}

fn user_config_file() -> Result<PathBuf> {
    let path = dirs::config_dir()
        .map(|d| d.join("hzrd").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

    if path.exists() {
        Ok(path)
    } else {
        Err(Error::Config(format!("Config file not found: {:?}", path)))
    }
}

/// `~/.local/share/hzrd/hzrd.db` on Linux, the platform data dir elsewhere
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("hzrd"))
        .unwrap_or_else(|| PathBuf::from("./hzrd_data"))
        .join("hzrd.db")
}
