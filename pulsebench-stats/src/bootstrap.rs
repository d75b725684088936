//! Bootstrap Comparison
//!
//! Compares a baseline and a candidate sample distribution by bootstrapping
//! the percentage difference of their medians. The observed change and each
//! resampled change use the same expression:
//!
//! ```text
//! 100 · (median(current) − median(baseline)) / median(baseline)
//! ```
//!
//! The comparison is intentionally not symmetrized: swapping the inputs is
//! not guaranteed to mirror the interval when the distributions have
//! different variances.

use crate::percentiles::median;
use crate::resample::resample;
use crate::{DEFAULT_CONFIDENCE, DEFAULT_RESAMPLES, HISTOGRAM_BINS};
use rand::thread_rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Options for a bootstrap comparison.
#[derive(Debug, Clone)]
pub struct CompareOptions {
    /// Number of bootstrap resamples (default: 10,000)
    pub resamples: usize,
    /// Confidence level (default: 0.95 for a 95% CI)
    pub confidence: f64,
    /// Whether to resample on the rayon pool
    pub parallel: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            resamples: DEFAULT_RESAMPLES,
            confidence: DEFAULT_CONFIDENCE,
            parallel: true,
        }
    }
}

/// Which way the candidate moved relative to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The full confidence interval lies strictly below 0.
    Faster,
    /// The full confidence interval lies strictly above 0.
    Slower,
    /// The confidence interval spans 0 (or the comparison is undefined).
    Uncertain,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Faster => write!(f, "faster"),
            Direction::Slower => write!(f, "slower"),
            Direction::Uncertain => write!(f, "uncertain"),
        }
    }
}

/// Confidence interval bounds on the percentage change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CiBounds {
    /// Lower bound (percent)
    pub lower: f64,
    /// Upper bound (percent)
    pub upper: f64,
}

/// Equal-width histogram of the resample distribution, for transport to
/// report renderers. Bins are identified by their midpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Histogram {
    /// Width of each bin (percent)
    pub bin_width: f64,
    /// Midpoint of each bin (percent)
    pub midpoints: Vec<f64>,
    /// Number of resamples falling in each bin
    pub counts: Vec<u32>,
}

/// Result of a bootstrap comparison between baseline and candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifferenceCi {
    /// Observed percentage change of the candidate median vs the baseline
    pub percent: f64,
    /// Confidence interval on the change; `None` when the baseline median
    /// is 0 and the percentage is undefined
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci: Option<CiBounds>,
    /// Direction of the change
    pub direction: Direction,
    /// Two-sided bootstrap p-value analog: how compatible the resample
    /// distribution is with "no change"
    pub p_value: f64,
    /// Resample distribution, binned for the reporter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub histogram: Option<Histogram>,
}

/// Errors from the comparator.
#[derive(Debug, Clone, Error)]
pub enum CompareError {
    /// The baseline sample array was empty
    #[error("baseline samples are empty")]
    EmptyBaseline,
    /// The candidate sample array was empty
    #[error("candidate samples are empty")]
    EmptyCurrent,
}

/// Compare two distributions by bootstrapping the percentage difference of
/// their medians.
///
/// A zero-median baseline does not fail: the result carries `percent = 0`,
/// no interval, and direction [`Direction::Uncertain`].
pub fn compare_medians(
    baseline: &[f64],
    current: &[f64],
    options: &CompareOptions,
) -> Result<DifferenceCi, CompareError> {
    if baseline.is_empty() {
        return Err(CompareError::EmptyBaseline);
    }
    if current.is_empty() {
        return Err(CompareError::EmptyCurrent);
    }

    let baseline_median = median(baseline);
    if baseline_median == 0.0 {
        return Ok(DifferenceCi {
            percent: 0.0,
            ci: None,
            direction: Direction::Uncertain,
            p_value: 1.0,
            histogram: None,
        });
    }

    let observed = percent_change(baseline_median, median(current));

    let diffs = if options.parallel {
        resample_diffs_parallel(baseline, current, options.resamples)
    } else {
        resample_diffs_serial(baseline, current, options.resamples)
    };

    // Resamples of a zero-heavy baseline can land on a zero median; those
    // produce non-finite percentages and carry no interval information.
    let mut diffs: Vec<f64> = diffs.into_iter().filter(|d| d.is_finite()).collect();
    if diffs.is_empty() {
        return Ok(DifferenceCi {
            percent: observed,
            ci: None,
            direction: Direction::Uncertain,
            p_value: 1.0,
            histogram: None,
        });
    }

    let histogram = bin_diffs(&diffs);
    let p_value = two_sided_p(&diffs);

    diffs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = diffs.len();
    let alpha = 1.0 - options.confidence;
    let lower_idx = ((alpha / 2.0) * n as f64) as usize;
    let upper_idx = (((1.0 - alpha / 2.0) * n as f64) as usize).min(n - 1);

    let ci = CiBounds {
        lower: diffs[lower_idx.min(n - 1)],
        upper: diffs[upper_idx],
    };

    let direction = if ci.upper < 0.0 {
        Direction::Faster
    } else if ci.lower > 0.0 {
        Direction::Slower
    } else {
        Direction::Uncertain
    };

    Ok(DifferenceCi {
        percent: observed,
        ci: Some(ci),
        direction,
        p_value,
        histogram: Some(histogram),
    })
}

#[inline]
fn percent_change(baseline_median: f64, current_median: f64) -> f64 {
    100.0 * (current_median - baseline_median) / baseline_median
}

fn one_resampled_diff<R: rand::Rng>(baseline: &[f64], current: &[f64], rng: &mut R) -> f64 {
    let b = median(&resample(baseline, rng));
    let c = median(&resample(current, rng));
    if b == 0.0 {
        f64::NAN
    } else {
        percent_change(b, c)
    }
}

fn resample_diffs_parallel(baseline: &[f64], current: &[f64], resamples: usize) -> Vec<f64> {
    (0..resamples)
        .into_par_iter()
        .map_init(thread_rng, |rng, _| {
            one_resampled_diff(baseline, current, rng)
        })
        .collect()
}

fn resample_diffs_serial(baseline: &[f64], current: &[f64], resamples: usize) -> Vec<f64> {
    let mut rng = thread_rng();
    (0..resamples)
        .map(|_| one_resampled_diff(baseline, current, &mut rng))
        .collect()
}

/// Two-sided p-value analog: twice the smaller inclusive tail mass around
/// 0. Inclusive tails keep an all-ties distribution at 1, not 0.
fn two_sided_p(diffs: &[f64]) -> f64 {
    let n = diffs.len() as f64;
    let at_or_above = diffs.iter().filter(|&&d| d >= 0.0).count() as f64 / n;
    let at_or_below = diffs.iter().filter(|&&d| d <= 0.0).count() as f64 / n;
    (2.0 * at_or_above.min(at_or_below)).min(1.0)
}

/// Bin the resample distribution into equal-width bins centered on the bin
/// midpoints.
fn bin_diffs(diffs: &[f64]) -> Histogram {
    let min = diffs.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = diffs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    // Degenerate distribution: every resample produced the same value
    if !(max > min) {
        return Histogram {
            bin_width: 0.0,
            midpoints: vec![min],
            counts: vec![diffs.len() as u32],
        };
    }

    let bin_width = (max - min) / HISTOGRAM_BINS as f64;
    let midpoints: Vec<f64> = (0..HISTOGRAM_BINS)
        .map(|i| min + bin_width * (i as f64 + 0.5))
        .collect();

    let mut counts = vec![0u32; HISTOGRAM_BINS];
    for &d in diffs {
        let idx = (((d - min) / bin_width) as usize).min(HISTOGRAM_BINS - 1);
        counts[idx] += 1;
    }

    Histogram {
        bin_width,
        midpoints,
        counts,
    }
}
