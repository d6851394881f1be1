//! Table-level database operations
//!
//! Functions taking `&mut SqliteConnection` run inside the caller's
//! transaction; functions taking a pool manage their own.

pub mod calculations;
pub mod curves;
pub mod realizations;
pub mod sources;
