//! Timestamp-aligned merging of datapoint streams

use crate::models::Datapoint;
use chrono::{DateTime, Utc};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Point-wise sum of two streams.
///
/// Timestamps present on one side only are carried through unchanged. Each
/// statistic is added when both sides carry it, otherwise the present side wins.
pub fn merge_sum(a: &[Datapoint], b: &[Datapoint]) -> Vec<Datapoint> {
    merge_custom(a, b, |x, y| x + y)
}

/// Point-wise maximum of two streams, used when folding pod replicas
pub fn merge_max(a: &[Datapoint], b: &[Datapoint]) -> Vec<Datapoint> {
    merge_custom(a, b, f64::max)
}

/// Timestamp-aligned merge with a caller-supplied combiner.
///
/// Output is sorted by timestamp ascending.
pub fn merge_custom<F>(a: &[Datapoint], b: &[Datapoint], combine: F) -> Vec<Datapoint>
where
    F: Fn(f64, f64) -> f64,
{
    let mut by_timestamp: BTreeMap<DateTime<Utc>, Datapoint> = BTreeMap::new();
    for dp in a.iter().chain(b) {
        match by_timestamp.entry(dp.timestamp) {
            Entry::Vacant(slot) => {
                slot.insert(dp.clone());
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                existing.average = combine_field(existing.average, dp.average, &combine);
                existing.minimum = combine_field(existing.minimum, dp.minimum, &combine);
                existing.maximum = combine_field(existing.maximum, dp.maximum, &combine);
                existing.sum = combine_field(existing.sum, dp.sum, &combine);
                existing.sample_count =
                    combine_field(existing.sample_count, dp.sample_count, &combine);
            }
        }
    }
    by_timestamp.into_values().collect()
}

/// Fold any number of streams with one combiner
pub fn merge_all<'a, I, F>(streams: I, combine: F) -> Vec<Datapoint>
where
    I: IntoIterator<Item = &'a [Datapoint]>,
    F: Fn(f64, f64) -> f64,
{
    streams
        .into_iter()
        .fold(Vec::new(), |acc, stream| merge_custom(&acc, stream, &combine))
}

fn combine_field<F>(left: Option<f64>, right: Option<f64>, combine: &F) -> Option<f64>
where
    F: Fn(f64, f64) -> f64,
{
    match (left, right) {
        (Some(l), Some(r)) => Some(combine(l, r)),
        (Some(l), None) => Some(l),
        (None, r) => r,
    }
}
