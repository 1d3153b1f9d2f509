//! Descriptive statistics over latency samples and throughput averages

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Summary of a set of round-trip samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStatistics {
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub std_dev_ms: f64,
    /// Mean absolute difference between consecutive samples
    pub jitter_ms: f64,
    pub sample_count: usize,
}

impl LatencyStatistics {
    /// Summarize samples in the order they were taken; `None` when empty
    pub fn from_samples(samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let values: Vec<f64> = samples.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        let mean = mean(&values)?;

        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        Some(Self {
            min_ms: sorted[0],
            max_ms: sorted[sorted.len() - 1],
            mean_ms: mean,
            median_ms: percentile(&sorted, 50.0),
            std_dev_ms: standard_deviation(&values, mean),
            jitter_ms: jitter(&values),
            sample_count: values.len(),
        })
    }
}

/// Arithmetic mean; `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Linear-interpolated percentile over already sorted values
pub fn percentile(sorted_values: &[f64], percentile: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let index = (percentile / 100.0) * (sorted_values.len() as f64 - 1.0);
    let lower_index = index.floor() as usize;
    let upper_index = index.ceil() as usize;

    if lower_index == upper_index {
        sorted_values[lower_index]
    } else {
        let lower_value = sorted_values[lower_index];
        let upper_value = sorted_values[upper_index];
        let weight = index - lower_index as f64;
        lower_value + weight * (upper_value - lower_value)
    }
}

/// Population standard deviation around a known mean
pub fn standard_deviation(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Mean absolute difference of consecutive values, zero below two samples
pub fn jitter(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let total: f64 = values.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    total / (values.len() - 1) as f64
}
