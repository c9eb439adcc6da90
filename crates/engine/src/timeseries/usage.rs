//! Usage extraction from datapoint streams

use crate::models::{Datapoint, Usage};
use serde::{Deserialize, Serialize};

/// How min/avg/max are derived from a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsagePolicy {
    /// min, avg and max are all taken over each datapoint's average
    Average,
    /// avg is the max of per-datapoint averages, max the max of per-datapoint
    /// maxima, min the min of per-datapoint minima. Captures bursts.
    Max,
}

/// Summarise a stream under the given policy.
///
/// A statistic no datapoint carried stays `None`.
pub fn extract_usage(datapoints: &[Datapoint], policy: UsagePolicy) -> Usage {
    let averages = || datapoints.iter().filter_map(|d| d.average);

    let (min, avg, max) = match policy {
        UsagePolicy::Average => (
            fold_min(averages()),
            mean(averages()),
            fold_max(averages()),
        ),
        UsagePolicy::Max => (
            fold_min(datapoints.iter().filter_map(|d| d.minimum)),
            fold_max(averages()),
            fold_max(datapoints.iter().filter_map(|d| d.maximum)),
        ),
    };

    let last = datapoints.iter().max_by_key(|d| d.timestamp).cloned();

    Usage {
        min,
        avg,
        max,
        last,
    }
}

fn fold_min(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
}

fn fold_max(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
