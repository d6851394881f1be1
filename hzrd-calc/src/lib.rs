//! hzrd-calc library interface
//!
//! Logic tree realization setup and progress accounting for hazard
//! calculations. The `hzrd-calc` binary is a thin front end over it.

pub mod db;
pub mod logic_tree;
pub mod services;
pub mod utils;

pub use logic_tree::{LogicTreePath, LogicTreeProcessor, WeightedLogicTree};
pub use services::{
    progress_totals, record_init_stats, record_progress, report_progress, setup_calculation,
    update_realization, CalculationSetup, FnCallback, HazardCurveProgressSeeder,
    RealizationCallback, RealizationInitializer, SeedSource, StdSeedSource,
};
