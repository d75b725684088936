//! Outlier Analysis
//!
//! Two views of outliers serve two consumers:
//! - [`tukey_outliers`] reports the rate and indices of samples outside
//!   Tukey's 1.5×IQR fence; report consumers use the indices for overlays.
//! - [`outlier_impact`] weights outliers by their *time cost* rather than
//!   their count, so one 10× spike matters more than ten 1.1× wobbles. The
//!   adaptive controller judges window stability on this.

use crate::percentiles::{median, percentile};

/// Multiplier on the interquartile range for Tukey's fence.
const TUKEY_K: f64 = 1.5;

/// Result of Tukey-fence outlier detection.
#[derive(Debug, Clone)]
pub struct OutlierSummary {
    /// Fraction of samples outside the fence, in `[0, 1]`.
    pub rate: f64,
    /// Indices of the outlying samples, in input order.
    pub indices: Vec<usize>,
    /// Samples below `Q1 − 1.5·IQR`.
    pub low_count: usize,
    /// Samples above `Q3 + 1.5·IQR`.
    pub high_count: usize,
    /// Lower fence used for detection.
    pub lower_fence: f64,
    /// Upper fence used for detection.
    pub upper_fence: f64,
}

/// Detect outliers with Tukey's fence: any sample outside
/// `[Q1 − 1.5·IQR, Q3 + 1.5·IQR]`.
pub fn tukey_outliers(samples: &[f64]) -> OutlierSummary {
    if samples.is_empty() {
        return OutlierSummary {
            rate: 0.0,
            indices: Vec::new(),
            low_count: 0,
            high_count: 0,
            lower_fence: 0.0,
            upper_fence: 0.0,
        };
    }

    let q1 = percentile(samples, 0.25);
    let q3 = percentile(samples, 0.75);
    let iqr = q3 - q1;
    let lower_fence = q1 - TUKEY_K * iqr;
    let upper_fence = q3 + TUKEY_K * iqr;

    let mut indices = Vec::new();
    let mut low_count = 0;
    let mut high_count = 0;

    for (i, &s) in samples.iter().enumerate() {
        if s < lower_fence {
            indices.push(i);
            low_count += 1;
        } else if s > upper_fence {
            indices.push(i);
            high_count += 1;
        }
    }

    OutlierSummary {
        rate: indices.len() as f64 / samples.len() as f64,
        indices,
        low_count,
        high_count,
        lower_fence,
        upper_fence,
    }
}

/// Fraction of total measured time attributable to samples beyond the upper
/// fence `median + 1.5·(q75 − median)`.
///
/// For every sample above the threshold the excess over the median is
/// accumulated; the impact is `excess / total_time` (0 when total time is 0).
pub fn outlier_impact(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let med = median(samples);
    let q75 = percentile(samples, 0.75);
    let threshold = med + TUKEY_K * (q75 - med);

    let total_time: f64 = samples.iter().sum();
    if total_time <= 0.0 {
        return 0.0;
    }

    let excess: f64 = samples
        .iter()
        .filter(|&&s| s > threshold)
        .map(|&s| s - med)
        .sum();

    excess / total_time
}
