//! Aggregation helpers.
//!
//! Each fact table is produced by one helper. A helper is a static
//! [`HelperDescriptor`] run through the shared replace-cycle in [`engine`]:
//!
//! - Global helpers build the whole month in a staging table and swap it in
//!   as the month partition in one transaction.
//! - State-scoped helpers own a `state_id` slice of the month partition and
//!   replace only that slice, so states can run in parallel.
//!
//! The concrete descriptors live in [`catalog`].

pub mod catalog;
pub mod descriptor;
pub mod engine;
pub mod registry;
pub mod render;

pub use descriptor::{HelperDescriptor, Scope};
pub use engine::{DescriptorHelper, Engine, EngineSettings};
pub use registry::HelperRegistry;

use async_trait::async_trait;
use icds_partition::Month;
use serde::Serialize;

use crate::error::AggregationResult;

/// Which states a state-scoped helper runs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateSelection {
    /// Every active state. Slices of states no longer active are removed.
    Active(Vec<String>),
    /// An explicit subset. Other slices are left as they are.
    Subset(Vec<String>),
}

impl StateSelection {
    pub fn states(&self) -> &[String] {
        match self {
            StateSelection::Active(states) | StateSelection::Subset(states) => states,
        }
    }
}

/// Outcome of one replace-cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub helper: String,
    pub state: Option<String>,
    /// Primary-source rows in scope for the month.
    pub source_rows: i64,
    /// Rows of those that failed validation.
    pub excluded_rows: i64,
    pub rows_written: u64,
    pub warnings: Vec<String>,
    pub elapsed_ms: u64,
}

impl StepReport {
    /// Share of source rows excluded, 0 when there were none.
    pub fn exclusion_ratio(&self) -> f64 {
        if self.source_rows <= 0 {
            return 0.0;
        }
        self.excluded_rows as f64 / self.source_rows as f64
    }
}

/// Contract between the pipeline and one fact table.
#[async_trait]
pub trait AggregationHelper: Send + Sync {
    /// Static description: key, sources, target, scope, dependencies.
    fn descriptor(&self) -> &'static HelperDescriptor;

    /// Verify sources exist and have data for the month, and that fact tables
    /// this helper reads have their month partition attached.
    async fn check_sources(&self, month: Month, state: Option<&str>) -> AggregationResult<()>;

    /// State-scoped helpers only: make sure the month partition is attached
    /// and drop slices of inactive states.
    async fn prepare(&self, month: Month, states: &StateSelection) -> AggregationResult<()>;

    /// Run the replace-cycle for the month (and state, when state-scoped).
    /// Safe to repeat.
    async fn aggregate(&self, month: Month, state: Option<&str>) -> AggregationResult<StepReport>;

    /// State-scoped helpers only: build indexes once every slice is loaded.
    async fn finalize(&self, month: Month) -> AggregationResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusion_ratio() {
        let report = StepReport {
            source_rows: 200,
            excluded_rows: 15,
            ..Default::default()
        };
        assert!((report.exclusion_ratio() - 0.075).abs() < f64::EPSILON);
        assert_eq!(StepReport::default().exclusion_ratio(), 0.0);
    }
}
