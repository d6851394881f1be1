//! # Hazard Common Library
//!
//! Shared code for the hazard calculation crates including:
//! - Error type and result alias
//! - Job file and database path configuration
//! - Database bootstrap and row models (calculations, realizations, source progress)

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
