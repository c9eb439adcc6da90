//! Time-series utilities
//!
//! Merges named metric streams, computes point-wise aggregates and extracts
//! summary statistics. Absent datapoint fields are carried as absent all the
//! way through; nothing here ever substitutes zero for missing telemetry.

mod merge;
mod stats;
mod usage;

pub use merge::{merge_all, merge_custom, merge_max, merge_sum};
pub use stats::{max_sample, sample_values, trimmed_mean};
pub use usage::{extract_usage, UsagePolicy};

use crate::models::{Datapoint, MetricSeries};

impl MetricSeries {
    /// Sum-merge several named streams into one (e.g. NetworkIn + NetworkOut)
    pub fn merged_sum(&self, names: &[&str]) -> Vec<Datapoint> {
        merge_all(names.iter().map(|name| self.get(name)), |a, b| a + b)
    }

    /// Usage of a single stream under the given policy
    pub fn usage(&self, name: &str, policy: UsagePolicy) -> crate::models::Usage {
        extract_usage(self.get(name), policy)
    }
}
