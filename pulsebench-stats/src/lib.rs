#![warn(missing_docs)]
//! PulseBench Statistical Engine
//!
//! Provides the numeric core of the harness:
//! - Nearest-rank percentiles (tail latency percentiles include outliers)
//! - Dispersion measures: Bessel-corrected stddev, CV, MAD
//! - Outlier analysis via Tukey's fence, plus time-weighted outlier impact
//! - Bootstrap comparison: confidence interval on the percentage
//!   difference of medians between a baseline and a candidate

mod bootstrap;
mod dispersion;
mod outliers;
mod percentiles;
mod resample;

pub use bootstrap::{
    CiBounds, CompareError, CompareOptions, DifferenceCi, Direction, Histogram, compare_medians,
};
pub use dispersion::{coefficient_of_variation, mean, median_abs_deviation, std_dev};
pub use outliers::{OutlierSummary, outlier_impact, tukey_outliers};
pub use percentiles::{median, percentile, quantile_of_sorted};
pub use resample::resample;

/// Default number of bootstrap resamples
pub const DEFAULT_RESAMPLES: usize = 10_000;

/// Default confidence level (95%)
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// Number of equal-width bins in the resample-distribution histogram
pub const HISTOGRAM_BINS: usize = 30;
