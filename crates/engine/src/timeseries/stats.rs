//! Sample statistics used by the Kubernetes recommender

use crate::error::{EngineError, Result};
use crate::models::Datapoint;

/// Mean after discarding `trim_fraction / 2` of the samples from each tail.
///
/// Fails on an empty sample set; callers decide what "no data" means.
pub fn trimmed_mean(samples: &[f64], trim_fraction: f64) -> Result<f64> {
    if samples.is_empty() {
        return Err(EngineError::EmptySamples);
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let mut trim = ((n as f64) * trim_fraction.clamp(0.0, 1.0) / 2.0).floor() as usize;
    if trim * 2 >= n {
        trim = (n - 1) / 2;
    }

    let kept = &sorted[trim..n - trim];
    Ok(kept.iter().sum::<f64>() / kept.len() as f64)
}

/// One value per datapoint: the average, or the maximum when no average was reported
pub fn sample_values(datapoints: &[Datapoint]) -> Vec<f64> {
    datapoints
        .iter()
        .filter_map(|d| d.average.or(d.maximum))
        .collect()
}

/// Largest observation in a stream, preferring reported maxima
pub fn max_sample(datapoints: &[Datapoint]) -> Option<f64> {
    datapoints
        .iter()
        .filter_map(|d| d.maximum.or(d.average))
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trimmed_mean_single_element() {
        assert_eq!(trimmed_mean(&[4.2], 0.1).unwrap(), 4.2);
    }

    #[test]
    fn test_trimmed_mean_empty_fails() {
        assert!(matches!(trimmed_mean(&[], 0.1), Err(EngineError::EmptySamples)));
    }

    #[test]
    fn test_trimmed_mean_drops_tails() {
        // 20 samples, 10% trim drops one from each end
        let mut samples: Vec<f64> = (1..=18).map(|_| 1.0).collect();
        samples.push(1000.0);
        samples.push(-1000.0);
        let mean = trimmed_mean(&samples, 0.1).unwrap();
        assert!((mean - 1.0).abs() < 1e-9, "mean was {}", mean);
    }

    #[test]
    fn test_trimmed_mean_unsorted_input() {
        let samples = vec![5.0, 1.0, 3.0, 2.0, 4.0];
        assert!((trimmed_mean(&samples, 0.0).unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_trimmed_mean_full_trim_keeps_median() {
        let samples = vec![1.0, 2.0, 9.0];
        assert_eq!(trimmed_mean(&samples, 1.0).unwrap(), 2.0);
    }

    #[test]
    fn test_max_sample_empty() {
        assert_eq!(max_sample(&[]), None);
    }
}
