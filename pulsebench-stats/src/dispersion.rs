//! Dispersion Measures
//!
//! Mean, Bessel-corrected standard deviation, coefficient of variation and
//! median absolute deviation. All return 0 on degenerate input rather than
//! NaN so downstream reporters never have to special-case.

use crate::percentiles::median;

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Sample standard deviation with Bessel's correction (divide by `n − 1`).
///
/// Returns 0.0 for `n ≤ 1`.
pub fn std_dev(samples: &[f64]) -> f64 {
    if samples.len() <= 1 {
        return 0.0;
    }
    let m = mean(samples);
    let variance =
        samples.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (samples.len() - 1) as f64;
    variance.sqrt()
}

/// Coefficient of variation: `stddev / mean`, 0.0 when the mean is 0.
pub fn coefficient_of_variation(samples: &[f64]) -> f64 {
    let m = mean(samples);
    if m == 0.0 {
        return 0.0;
    }
    std_dev(samples) / m
}

/// Median absolute deviation: the median of `|x − median(x)|`.
pub fn median_abs_deviation(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let med = median(samples);
    let deviations: Vec<f64> = samples.iter().map(|x| (x - med).abs()).collect();
    median(&deviations)
}
