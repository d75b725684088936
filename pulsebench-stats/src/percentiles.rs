//! Percentile Computation
//!
//! Nearest-rank percentiles over sorted copies of the input. Percentiles are
//! computed from raw samples; the tail (p99, p999) must include outliers
//! because for latency they ARE the signal.

/// Compute the percentile `p` (in `[0, 1]`) of `samples` by nearest rank.
///
/// For `n` sorted values the selected index is `max(0, ceil(n·p) − 1)`.
/// Returns 0.0 for an empty slice; a single-element slice returns that
/// element for every `p`.
pub fn percentile(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    quantile_of_sorted(&sorted, p)
}

/// Nearest-rank quantile of an already-sorted slice.
///
/// Callers that need several percentiles of the same data should sort once
/// and use this to avoid re-sorting per percentile.
pub fn quantile_of_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let n = sorted.len();
    let p = p.clamp(0.0, 1.0);
    let rank = (n as f64 * p).ceil() as usize;
    let idx = rank.saturating_sub(1).min(n - 1);
    sorted[idx]
}

/// Median (the 50th percentile by nearest rank).
pub fn median(samples: &[f64]) -> f64 {
    percentile(samples, 0.5)
}
