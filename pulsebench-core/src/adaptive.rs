//! Adaptive Controller
//!
//! Wraps the base collector and keeps requesting small batches until two
//! sliding windows of recent samples agree: when both the median and the
//! outlier time-impact stop drifting between the windows, the run has
//! converged and collection stops early.

use crate::collector::{Work, collect_prepared, merge_results, summarize};
use crate::error::BenchError;
use crate::measure::Timer;
use crate::runtime::RuntimeHooks;
use pulsebench_ipc::{Convergence, MeasuredResults, RunnerOptions};
use pulsebench_stats::{median, outlier_impact};
use std::time::{Duration, Instant};

/// Window size used before 20 samples exist to pick a better one.
pub const DEFAULT_WINDOW: usize = 50;

/// Relative drift below which a window dimension counts as stable (5%).
pub const DRIFT_THRESHOLD: f64 = 0.05;

/// Time budget of the initial batch and of each follow-up batch, in ms.
const BATCH_BUDGET_MS: f64 = 100.0;

/// Iteration cap on follow-up batches.
const BATCH_ITERATION_CAP: u64 = 10;

/// Confidence that may stop the run after `min_time_ms`, regardless of a
/// higher target.
const FALLBACK_CONFIDENCE: f64 = 80.0;

/// Window size for the convergence check, adapted to execution speed.
///
/// Fast iterations are noisy individually, so their windows are long;
/// slow iterations carry more signal each, so their windows are short.
/// Judged on the median of the last 20 samples (nanoseconds).
pub fn window_size(samples_ns: &[f64]) -> usize {
    if samples_ns.len() < 20 {
        return DEFAULT_WINDOW;
    }

    let tail = &samples_ns[samples_ns.len() - 20..];
    let median_ns = median(tail);

    if median_ns < 10_000.0 {
        200
    } else if median_ns < 100_000.0 {
        100
    } else if median_ns < 1_000_000.0 {
        50
    } else if median_ns < 10_000_000.0 {
        30
    } else {
        20
    }
}

/// Judge stability of the sample stream (durations in nanoseconds).
///
/// Needs at least `2·W` samples; below that the result reports collection
/// progress. Otherwise the last two `W`-sized windows are compared on
/// median drift and outlier-impact drift.
pub fn check_convergence(samples_ns: &[f64]) -> Convergence {
    let w = window_size(samples_ns);
    let needed = 2 * w;
    let n = samples_ns.len();

    if n < needed {
        return Convergence {
            converged: false,
            confidence: (n as f64 / needed as f64) * 100.0,
            reason: format!("Collecting samples: {n}/{needed}"),
        };
    }

    let recent = &samples_ns[n - w..];
    let previous = &samples_ns[n - 2 * w..n - w];

    let median_recent = median(recent);
    let median_previous = median(previous);
    let median_drift = if median_previous == 0.0 {
        if median_recent == 0.0 { 0.0 } else { 1.0 }
    } else {
        (median_recent - median_previous).abs() / median_previous
    };

    let impact_drift = (outlier_impact(recent) - outlier_impact(previous)).abs();

    if median_drift < DRIFT_THRESHOLD && impact_drift < DRIFT_THRESHOLD {
        return Convergence {
            converged: true,
            confidence: 100.0,
            reason: "Stable performance pattern".to_string(),
        };
    }

    let confidence = (50.0 * (1.0 - median_drift / DRIFT_THRESHOLD)
        + 50.0 * (1.0 - impact_drift / DRIFT_THRESHOLD))
        .clamp(0.0, 100.0);
    let reason = if median_drift >= impact_drift {
        format!("Median drifting {:.1}% between windows", median_drift * 100.0)
    } else {
        format!(
            "Outlier impact drifting {:.1}% between windows",
            impact_drift * 100.0
        )
    };

    Convergence {
        converged: false,
        confidence,
        reason,
    }
}

/// Emits at most one progress line per second to stderr.
struct ProgressLine {
    last: Option<Instant>,
}

impl ProgressLine {
    fn new() -> Self {
        Self { last: None }
    }

    fn emit(&mut self, name: &str, convergence: &Convergence) {
        let due = self
            .last
            .map(|t| t.elapsed() >= Duration::from_secs(1))
            .unwrap_or(true);
        if due {
            eprintln!(
                "  {name}: {:.0}% confidence - {}",
                convergence.confidence, convergence.reason
            );
            self.last = Some(Instant::now());
        }
    }
}

/// Run a benchmark under the adaptive controller.
///
/// The first batch gets the full warmup and settle treatment; the adaptive
/// clock starts only after it, so warmup is never charged against the time
/// budget. Follow-up batches run warm with a small budget and append their
/// samples until convergence, the fallback confidence, or the budget ends
/// the run.
pub fn collect_adaptive(
    name: &str,
    work: &mut Work,
    options: &RunnerOptions,
    hooks: &mut dyn RuntimeHooks,
) -> Result<MeasuredResults, BenchError> {
    let max_time_ms = options.effective_max_time_ms().ok_or_else(|| {
        BenchError::ConfigInvalid("adaptive mode requires max_time_ms".to_string())
    })?;
    let target = options.target_confidence;

    let initial_options = RunnerOptions {
        max_time_ms: Some(BATCH_BUDGET_MS),
        max_iterations: None,
        batches: 1,
        ..options.clone()
    };
    let mut merged = collect_prepared(name, work, &initial_options, hooks)?;

    let clock = Timer::start();
    // Keep at least ten scheduling points inside small budgets.
    let batch_budget = BATCH_BUDGET_MS.min(max_time_ms / 10.0).max(1.0);
    let batch_options = RunnerOptions {
        max_time_ms: Some(batch_budget),
        max_iterations: Some(BATCH_ITERATION_CAP),
        skip_warmup: true,
        skip_settle: true,
        batches: 1,
        ..options.clone()
    };

    let mut progress = ProgressLine::new();
    let convergence = loop {
        let samples_ns: Vec<f64> = merged.samples.iter().map(|ms| ms * 1_000_000.0).collect();
        let convergence = check_convergence(&samples_ns);
        progress.emit(name, &convergence);

        if convergence.converged && convergence.confidence >= target {
            break convergence;
        }

        let elapsed_ms = clock.elapsed_ms();
        if elapsed_ms >= max_time_ms {
            break convergence;
        }
        if elapsed_ms >= options.min_time_ms
            && convergence.confidence >= target.max(FALLBACK_CONFIDENCE)
        {
            break convergence;
        }

        let batch = collect_prepared(name, work, &batch_options, hooks)?;
        merged = merge_results(vec![merged, batch], true)?;
    };

    merged.time = summarize(&merged.samples, true);
    merged.convergence = Some(convergence);
    merged.total_time_s = Some(clock.elapsed().as_secs_f64());
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BenchArgs, BenchRunnable};
    use crate::runtime::NativeRuntime;

    #[test]
    fn test_window_scales_inversely_with_time() {
        let fast: Vec<f64> = vec![5_000.0; 30]; // 5 us
        assert_eq!(window_size(&fast), 200);

        let medium: Vec<f64> = vec![500_000.0; 30]; // 0.5 ms
        assert_eq!(window_size(&medium), 50);

        let slow: Vec<f64> = vec![50_000_000.0; 30]; // 50 ms
        assert_eq!(window_size(&slow), 20);
    }

    #[test]
    fn test_window_default_before_twenty_samples() {
        let few = vec![5_000.0; 19];
        assert_eq!(window_size(&few), DEFAULT_WINDOW);
    }

    #[test]
    fn test_insufficient_samples_reports_progress() {
        // 30 slow samples -> W = 20, need 40
        let samples = vec![50_000_000.0; 30];
        let convergence = check_convergence(&samples);

        assert!(!convergence.converged);
        assert!(convergence.reason.starts_with("Collecting samples"));
        assert!((convergence.confidence - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_stable_samples_converge_with_full_confidence() {
        // 2*W stable slow samples, rsd well under 1%
        let samples: Vec<f64> = (0..40)
            .map(|i| 50_000_000.0 + (i % 5) as f64 * 1_000.0)
            .collect();
        let convergence = check_convergence(&samples);

        assert!(convergence.converged);
        assert_eq!(convergence.confidence, 100.0);
        assert_eq!(convergence.reason, "Stable performance pattern");
    }

    #[test]
    fn test_drifting_median_blocks_convergence() {
        // Previous window at 50ms, recent window at 100ms
        let mut samples = vec![50_000_000.0; 20];
        samples.extend(vec![100_000_000.0; 20]);
        let convergence = check_convergence(&samples);

        assert!(!convergence.converged);
        assert_eq!(convergence.confidence, 0.0);
        assert!(convergence.reason.contains("Median"));
    }

    #[test]
    fn test_confidence_bounded() {
        let mut samples = vec![50_000_000.0; 20];
        samples.extend(vec![53_000_000.0; 20]); // 6% drift, just over threshold
        let convergence = check_convergence(&samples);

        assert!(!convergence.converged);
        assert!(convergence.confidence >= 0.0 && convergence.confidence <= 100.0);
    }

    fn steady_work(_: &BenchArgs) {
        // Around 1ms of spinning: slow enough for W=50 to be reachable
        // quickly, steady enough to converge
        let timer = Timer::start();
        while timer.elapsed_ms() < 1.0 {
            std::hint::black_box(0u64);
        }
    }

    #[test]
    fn test_adaptive_stops_early_on_stable_data() {
        let mut hooks = NativeRuntime;
        let options = RunnerOptions {
            max_time_ms: Some(10_000.0),
            adaptive: true,
            target_confidence: 95.0,
            warmup_iterations: 2,
            skip_settle: true,
            ..Default::default()
        };

        let mut work =
            Work::prepare(&BenchRunnable::Stateless(steady_work), None, None).unwrap();
        let wall = Timer::start();
        let result = collect_adaptive("steady", &mut work, &options, &mut hooks).unwrap();

        // Stopped well before the 10s budget
        assert!(wall.elapsed_ms() < 8_000.0);

        let convergence = result.convergence.as_ref().unwrap();
        assert!(convergence.converged);
        assert_eq!(convergence.confidence, 100.0);

        // Adaptive runs carry the extended stats block
        assert!(result.time.p25.is_some());
        assert!(result.time.cv.is_some());
        assert!(result.time.outlier_rate.is_some());
        assert!(result.check_invariants().is_ok());
    }
}
