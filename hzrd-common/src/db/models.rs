//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::{Error, Result};

/// `total_items` value of a realization whose work units are not counted yet
pub(crate) const UNCOUNTED_TOTAL: i64 = -1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HazardCalculation {
    pub id: i64,
    pub guid: Uuid,
    pub description: String,
    pub random_seed: i32,
    pub number_of_logic_tree_samples: u32,
    /// Lock-retry budget for progress reports against this calculation
    pub max_lock_wait_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl HazardCalculation {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let guid: String = row.try_get("guid")?;
        let created_at: String = row.try_get("created_at")?;
        let samples: i64 = row.try_get("number_of_logic_tree_samples")?;
        let max_lock_wait_ms: i64 = row.try_get("max_lock_wait_ms")?;
        Ok(Self {
            id: row.try_get("id")?,
            guid: Uuid::parse_str(&guid)
                .map_err(|e| Error::Internal(format!("Invalid calculation GUID: {}", e)))?,
            description: row.try_get("description")?,
            random_seed: row.try_get("random_seed")?,
            number_of_logic_tree_samples: u32::try_from(samples).map_err(|_| {
                Error::Internal(format!("Invalid sample count stored: {}", samples))
            })?,
            max_lock_wait_ms: u64::try_from(max_lock_wait_ms).map_err(|_| {
                Error::Internal(format!("Invalid lock wait stored: {}", max_lock_wait_ms))
            })?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| Error::Internal(format!("Invalid created_at: {}", e)))?
                .with_timezone(&Utc),
        })
    }

    /// True when realizations are Monte-Carlo sampled rather than enumerated
    pub fn is_sampling(&self) -> bool {
        self.number_of_logic_tree_samples > 0
    }
}

/// Registered source model of a calculation, addressed by file name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SourceModelInput {
    pub id: i64,
    pub hazard_calculation_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ParsedSource {
    pub id: i64,
    pub input_id: i64,
    pub source_id: String,
    pub source_type: String,
}

/// Lifecycle of a realization's work accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RealizationState {
    /// Row exists, source progress not materialized yet
    Created,
    Counted { total: i64, completed: i64 },
    Complete { total: i64 },
}

/// One enumerated or sampled combination of logic tree branches
///
/// Exactly one of `seed` (sampling) and `weight` (enumeration) is set.
/// Built only through [`Realization::created`] or [`Realization::from_row`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Realization {
    pub id: i64,
    pub hazard_calculation_id: i64,
    pub ordinal: u32,
    pub seed: Option<i32>,
    pub weight: Option<f64>,
    pub sm_lt_path: Vec<String>,
    pub gsim_lt_path: Vec<String>,
    pub completed_items: i64,
    pub is_complete: bool,
    /// Serialized as `null` until counted
    #[serde(serialize_with = "serialize_total_items")]
    total_items: i64,
}

fn serialize_total_items<S: Serializer>(
    total: &i64,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let counted = (*total != UNCOUNTED_TOTAL).then_some(*total);
    counted.serialize(serializer)
}

impl Realization {
    /// A freshly inserted realization, before its work units are counted
    pub fn created(
        id: i64,
        hazard_calculation_id: i64,
        ordinal: u32,
        seed: Option<i32>,
        weight: Option<f64>,
        sm_lt_path: Vec<String>,
        gsim_lt_path: Vec<String>,
    ) -> Self {
        Self {
            id,
            hazard_calculation_id,
            ordinal,
            seed,
            weight,
            sm_lt_path,
            gsim_lt_path,
            completed_items: 0,
            is_complete: false,
            total_items: UNCOUNTED_TOTAL,
        }
    }

    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let ordinal: i64 = row.try_get("ordinal")?;
        let seed: Option<i64> = row.try_get("seed")?;
        let sm_lt_path: String = row.try_get("sm_lt_path")?;
        let gsim_lt_path: String = row.try_get("gsim_lt_path")?;
        let seed = seed
            .map(|s| {
                i32::try_from(s).map_err(|_| Error::Internal(format!("Seed out of range: {}", s)))
            })
            .transpose()?;

        Ok(Self {
            id: row.try_get("id")?,
            hazard_calculation_id: row.try_get("hazard_calculation_id")?,
            ordinal: u32::try_from(ordinal)
                .map_err(|_| Error::Internal(format!("Invalid ordinal stored: {}", ordinal)))?,
            seed,
            weight: row.try_get("weight")?,
            sm_lt_path: serde_json::from_str(&sm_lt_path)?,
            gsim_lt_path: serde_json::from_str(&gsim_lt_path)?,
            completed_items: row.try_get("completed_items")?,
            is_complete: row.try_get("is_complete")?,
            total_items: row.try_get("total_items")?,
        })
    }

    /// Number of work units, `None` until they have been materialized
    pub fn total_items(&self) -> Option<i64> {
        (self.total_items != UNCOUNTED_TOTAL).then_some(self.total_items)
    }

    /// Record the work-unit count once source progress rows exist
    pub fn set_counted(&mut self, total: i64) {
        self.total_items = total;
    }

    pub fn state(&self) -> RealizationState {
        match self.total_items() {
            None => RealizationState::Created,
            Some(total) if self.is_complete => RealizationState::Complete { total },
            Some(total) => RealizationState::Counted {
                total,
                completed: self.completed_items,
            },
        }
    }
}

/// One (realization, source) work unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SourceProgress {
    pub id: i64,
    pub lt_realization_id: i64,
    pub parsed_source_id: i64,
    pub is_complete: bool,
}

/// Summary of a calculation's size, recorded before work is dispatched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub hazard_calculation_id: i64,
    pub num_sites: i64,
    pub num_realizations: i64,
    pub num_tasks: i64,
}

/// Aggregate work accounting for a calculation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressTotals {
    pub realizations: i64,
    pub complete_realizations: i64,
    pub total_items: i64,
    pub completed_items: i64,
}

impl ProgressTotals {
    /// Completed fraction in percent; 0 when there is nothing to do
    pub fn percentage(&self) -> f64 {
        if self.total_items <= 0 {
            0.0
        } else {
            self.completed_items as f64 * 100.0 / self.total_items as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Realization {
        Realization::created(
            1,
            1,
            0,
            Some(42),
            None,
            vec!["b1".to_string()],
            vec!["g1".to_string()],
        )
    }

    #[test]
    fn test_created_realization_hides_sentinel() {
        let rlz = sample();
        assert_eq!(rlz.total_items(), None);
        assert_eq!(rlz.state(), RealizationState::Created);
    }

    #[test]
    fn test_state_transitions() {
        let mut rlz = sample();
        rlz.set_counted(3);
        assert_eq!(
            rlz.state(),
            RealizationState::Counted { total: 3, completed: 0 }
        );

        rlz.completed_items = 3;
        rlz.is_complete = true;
        assert_eq!(rlz.state(), RealizationState::Complete { total: 3 });
    }

    #[test]
    fn test_zero_work_realization_is_counted_not_complete() {
        let mut rlz = sample();
        rlz.set_counted(0);
        assert_eq!(rlz.total_items(), Some(0));
        assert_eq!(
            rlz.state(),
            RealizationState::Counted { total: 0, completed: 0 }
        );
    }

    #[test]
    fn test_serialized_total_items_never_shows_sentinel() {
        let mut rlz = sample();
        let json = serde_json::to_value(&rlz).unwrap();
        assert!(json["total_items"].is_null());

        rlz.set_counted(3);
        let json = serde_json::to_value(&rlz).unwrap();
        assert_eq!(json["total_items"], 3);
        assert_eq!(json["seed"], 42);
    }

    #[test]
    fn test_progress_percentage() {
        let totals = ProgressTotals {
            realizations: 2,
            complete_realizations: 1,
            total_items: 8,
            completed_items: 6,
        };
        assert!((totals.percentage() - 75.0).abs() < 1e-12);
        assert_eq!(ProgressTotals::default().percentage(), 0.0);
    }
}
