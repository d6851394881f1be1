//! Services for hzrd-calc

pub mod calculation_setup;
pub mod callbacks;
pub mod init_stats;
pub mod progress_tracker;
pub mod realization_initializer;
pub mod sampling;

pub use calculation_setup::{setup_calculation, CalculationSetup};
pub use callbacks::{FnCallback, HazardCurveProgressSeeder, RealizationCallback};
pub use init_stats::record_init_stats;
pub use progress_tracker::{progress_totals, record_progress, report_progress, update_realization};
pub use realization_initializer::{initialize_source_progress, RealizationInitializer};
pub use sampling::{SeedSource, StdSeedSource};
