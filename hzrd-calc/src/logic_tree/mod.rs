//! Logic tree processing
//!
//! The initializer only needs three capabilities from a logic tree: full
//! enumeration of branch paths, and seeded sampling of a source model path and
//! of a GSIM path. [`LogicTreeProcessor`] is that seam; [`WeightedLogicTree`]
//! implements it for trees declared in the job file.

use hzrd_common::Result;

pub mod weighted;

pub use weighted::WeightedLogicTree;

/// One root-to-leaf selection through both logic trees
#[derive(Debug, Clone, PartialEq)]
pub struct LogicTreePath {
    /// Source model file the path selects
    pub source_model_name: String,
    /// Product of branch weights; only present for enumerated paths
    pub weight: Option<f64>,
    pub sm_lt_path: Vec<String>,
    pub gsim_lt_path: Vec<String>,
}

/// Source of logic tree paths for realization initialization
pub trait LogicTreeProcessor: Send + Sync {
    /// Every path through both trees, in a deterministic order
    fn enumerate_paths(&self) -> Result<Vec<LogicTreePath>>;

    /// Sample one source model path; returns `(source_model_name, sm_lt_path)`
    fn sample_source_model(&self, seed: i32) -> Result<(String, Vec<String>)>;

    /// Sample one GSIM path
    fn sample_gsim(&self, seed: i32) -> Result<Vec<String>>;
}
