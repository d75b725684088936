//! Sample Collection Loop
//!
//! The measurement core: warmup, settle, then a tight loop that times one
//! iteration per sample. All per-sample arrays are pre-allocated before the
//! loop starts so that mid-measurement reallocation cannot distort tail
//! percentiles; on exit lengths are trimmed, capacity is not.

use crate::error::BenchError;
use crate::measure::{Timer, wall_clock_micros};
use crate::registry::{BenchArgs, BenchRunnable, BenchState, SetupKind};
use crate::runtime::RuntimeHooks;
use pulsebench_ipc::{MeasuredResults, PausePoint, RunnerOptions, SETTLE_MS, TimeStats};
use pulsebench_stats as stats;
use std::time::Duration;

/// A benchmark with its setup already executed, ready to iterate.
///
/// Preparing once and collecting many times keeps stateful benchmarks'
/// setup out of the adaptive controller's batch loop.
pub enum Work {
    /// Parameter value goes into every iteration
    Stateless {
        /// Iteration body
        f: fn(&BenchArgs),
        /// The parameter value
        params: BenchArgs,
    },
    /// Iterations borrow state produced by setup
    Stateful {
        /// Iteration body
        run: fn(&BenchState),
        /// State built by the setup step
        state: BenchState,
    },
}

impl Work {
    /// Resolve a runnable into iteration-ready work, executing its setup.
    ///
    /// `setup_override` replaces a stateful benchmark's own setup (the
    /// "setup export" of a wire descriptor). Async setups are driven to
    /// completion on a current-thread runtime before measurement starts.
    pub fn prepare(
        runnable: &BenchRunnable,
        params: Option<BenchArgs>,
        setup_override: Option<SetupKind>,
    ) -> Result<Self, BenchError> {
        let params = params.unwrap_or(BenchArgs::Null);

        match runnable {
            BenchRunnable::Stateless(f) => {
                if setup_override.is_some() {
                    return Err(BenchError::ConfigInvalid(
                        "setup specified for a stateless benchmark".to_string(),
                    ));
                }
                Ok(Work::Stateless { f: *f, params })
            }
            BenchRunnable::Stateful { setup, run } => {
                let setup = setup_override.unwrap_or(*setup);
                let state = run_setup(setup, params)?;
                Ok(Work::Stateful { run: *run, state })
            }
        }
    }

    #[inline(always)]
    fn run_once(&self) {
        match self {
            Work::Stateless { f, params } => f(params),
            Work::Stateful { run, state } => run(state),
        }
    }
}

fn run_setup(setup: SetupKind, params: BenchArgs) -> Result<BenchState, BenchError> {
    match setup {
        SetupKind::Sync(f) => Ok(f(params)),
        SetupKind::Async(f) => {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .map_err(|e| {
                    BenchError::ConfigInvalid(format!("failed to build setup runtime: {e}"))
                })?;
            Ok(rt.block_on(f(params)))
        }
    }
}

/// Run one benchmark through the full loop: warmup, settle, measurement.
pub fn collect(
    name: &str,
    runnable: &BenchRunnable,
    params: Option<BenchArgs>,
    options: &RunnerOptions,
    hooks: &mut dyn RuntimeHooks,
) -> Result<MeasuredResults, BenchError> {
    options.validate().map_err(BenchError::ConfigInvalid)?;
    let mut work = Work::prepare(runnable, params, None)?;
    collect_prepared(name, &mut work, options, hooks)
}

/// Collection over already-prepared work. The adaptive controller and the
/// suite batch loop call this repeatedly without re-running setup.
pub fn collect_prepared(
    name: &str,
    work: &mut Work,
    options: &RunnerOptions,
    hooks: &mut dyn RuntimeHooks,
) -> Result<MeasuredResults, BenchError> {
    let max_time_ms = options.effective_max_time_ms();
    let max_iterations = options.effective_max_iterations();
    if max_time_ms.is_none() && max_iterations.is_none() {
        return Err(BenchError::ConfigInvalid(
            "neither max_time_ms nor max_iterations is set".to_string(),
        ));
    }

    // Phase 1 — warmup. Iterations are unmeasured but their durations are
    // kept; bimodality in warmup_samples is how you see tiering happen.
    let mut warmup_samples = None;
    if !options.skip_warmup {
        if options.warmup_iterations > 0 {
            let mut durations = Vec::with_capacity(options.warmup_iterations as usize);
            for _ in 0..options.warmup_iterations {
                let timer = Timer::start();
                work.run_once();
                durations.push(timer.elapsed_ms());
            }
            warmup_samples = Some(durations);
        }

        hooks.gc_hint();
        if !options.skip_settle {
            // Quiet window for background optimization to finish before
            // timing begins; without it measurement mixes pre- and
            // post-optimization iterations and turns bimodal.
            std::thread::sleep(Duration::from_millis(SETTLE_MS));
            hooks.gc_hint();
        }
    }

    // Phase 2 — measurement. Everything per-sample is allocated up front.
    let capacity = options.estimated_capacity();
    let mut samples: Vec<f64> = Vec::with_capacity(capacity);
    let mut timestamps: Vec<u64> = Vec::with_capacity(capacity);
    let mut heap_samples: Vec<u64> = Vec::with_capacity(capacity);
    let mut opt_samples: Option<Vec<i8>> = options
        .trace_opt
        .then(|| Vec::with_capacity(capacity));
    let mut pause_points: Vec<PausePoint> = Vec::new();

    let heap_before = hooks.heap_used();
    let loop_start = Timer::start();
    let mut excluded_ms = 0.0_f64;
    let mut iteration: u64 = 0;

    loop {
        if let Some(cap) = max_iterations {
            if iteration >= cap {
                break;
            }
        }
        if let Some(budget) = max_time_ms {
            if loop_start.elapsed_ms() - excluded_ms >= budget {
                break;
            }
        }

        let timer = Timer::start();
        work.run_once();
        samples.push(timer.elapsed_ms());

        timestamps.push(wall_clock_micros());
        heap_samples.push(hooks.heap_used());
        if let Some(opt) = opt_samples.as_mut() {
            opt.push(hooks.opt_status().unwrap_or(-1));
        }

        if options.collect {
            hooks.gc_hint();
        }

        if pause_due(iteration, options.pause_first, options.pause_interval) {
            pause_points.push(PausePoint {
                sample_index: iteration,
                duration_ms: options.pause_duration_ms,
            });
            if options.pause_duration_ms > 0.0 {
                std::thread::sleep(Duration::from_secs_f64(options.pause_duration_ms / 1000.0));
                excluded_ms += options.pause_duration_ms;
            }
        }

        iteration += 1;
    }

    if samples.is_empty() {
        return Err(BenchError::EmptySamples {
            name: name.to_string(),
        });
    }

    let heap_after = hooks.heap_used();
    let heap_growth_kb =
        heap_after.saturating_sub(heap_before) as f64 / 1024.0 / samples.len() as f64;
    let total_time_s = (loop_start.elapsed_ms() - excluded_ms) / 1000.0;

    Ok(MeasuredResults {
        name: name.to_string(),
        time: summarize(&samples, options.adaptive),
        samples,
        warmup_samples,
        heap_samples: Some(heap_samples),
        timestamps: Some(timestamps),
        opt_samples,
        pause_points: (!pause_points.is_empty()).then_some(pause_points),
        gc_stats: None,
        heap_profile: None,
        convergence: None,
        total_time_s: Some(total_time_s),
        heap_growth_kb: Some(heap_growth_kb),
    })
}

/// Whether a scheduled pause fires at `iteration`.
///
/// Fires at `pause_first`, and every `pause_interval` iterations from there
/// on. With `pause_first` set and `pause_interval` absent or 0, exactly one
/// pause fires.
fn pause_due(iteration: u64, pause_first: Option<u64>, pause_interval: Option<u64>) -> bool {
    if let Some(first) = pause_first {
        if iteration == first {
            return true;
        }
    }
    if let Some(interval) = pause_interval {
        if interval > 0 {
            let base = pause_first.unwrap_or(0);
            if let Some(offset) = iteration.checked_sub(base) {
                return offset % interval == 0;
            }
        }
    }
    false
}

/// Timing summary over a sample array, in ms.
///
/// The extended block (`p25`, `p95`, `cv`, `mad`, `outlier_rate`) is filled
/// only for adaptive runs.
pub fn summarize(samples: &[f64], adaptive: bool) -> TimeStats {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let q = |p: f64| stats::quantile_of_sorted(&sorted, p);

    TimeStats {
        min: sorted.first().copied().unwrap_or(0.0),
        max: sorted.last().copied().unwrap_or(0.0),
        avg: stats::mean(samples),
        p50: q(0.50),
        p75: q(0.75),
        p99: q(0.99),
        p999: q(0.999),
        p25: adaptive.then(|| q(0.25)),
        p95: adaptive.then(|| q(0.95)),
        cv: adaptive.then(|| stats::coefficient_of_variation(samples)),
        mad: adaptive.then(|| stats::median_abs_deviation(samples)),
        outlier_rate: adaptive.then(|| stats::tukey_outliers(samples).rate),
    }
}

/// Merge batch records of the same benchmark into one.
///
/// Samples concatenate in batch order; pause-point indices shift by the
/// cumulative sample offset. Per-sample series survive only when every
/// batch carries them. Warmup samples come from the first batch (later
/// batches run with `skip_warmup`).
pub fn merge_results(
    batches: Vec<MeasuredResults>,
    adaptive: bool,
) -> Result<MeasuredResults, BenchError> {
    let mut batches = batches.into_iter();
    let mut merged = batches.next().ok_or_else(|| BenchError::ConfigInvalid(
        "cannot merge zero batches".to_string(),
    ))?;

    let mut pause_points = merged.pause_points.take().unwrap_or_default();
    let mut total_time_s = merged.total_time_s.unwrap_or(0.0);
    let mut growth_weighted = merged.heap_growth_kb.unwrap_or(0.0) * merged.samples.len() as f64;

    for batch in batches {
        let offset = merged.samples.len() as u64;

        if let Some(points) = batch.pause_points {
            pause_points.extend(points.into_iter().map(|p| PausePoint {
                sample_index: p.sample_index + offset,
                duration_ms: p.duration_ms,
            }));
        }

        merge_series(&mut merged.timestamps, batch.timestamps);
        merge_series(&mut merged.heap_samples, batch.heap_samples);
        merge_series(&mut merged.opt_samples, batch.opt_samples);

        growth_weighted += batch.heap_growth_kb.unwrap_or(0.0) * batch.samples.len() as f64;
        total_time_s += batch.total_time_s.unwrap_or(0.0);
        merged.samples.extend(batch.samples);
    }

    merged.time = summarize(&merged.samples, adaptive);
    merged.pause_points = (!pause_points.is_empty()).then_some(pause_points);
    merged.total_time_s = Some(total_time_s);
    merged.heap_growth_kb = Some(growth_weighted / merged.samples.len() as f64);
    Ok(merged)
}

/// Concatenate an optional per-sample series; a batch missing it drops the
/// series entirely so lengths stay aligned with `samples`.
fn merge_series<T>(into: &mut Option<Vec<T>>, from: Option<Vec<T>>) {
    match (into.as_mut(), from) {
        (Some(dst), Some(src)) => dst.extend(src),
        (_, None) => *into = None,
        (None, _) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::NativeRuntime;

    fn busy_work(_: &BenchArgs) {
        let mut sum = 0u64;
        for i in 0..512 {
            sum = sum.wrapping_add(std::hint::black_box(i));
        }
        std::hint::black_box(sum);
    }

    fn quick_options() -> RunnerOptions {
        RunnerOptions {
            max_iterations: Some(50),
            warmup_iterations: 3,
            skip_settle: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_collect_iteration_capped() {
        let mut hooks = NativeRuntime;
        let result = collect(
            "busy",
            &BenchRunnable::Stateless(busy_work),
            None,
            &quick_options(),
            &mut hooks,
        )
        .unwrap();

        assert_eq!(result.samples.len(), 50);
        assert_eq!(result.warmup_samples.as_ref().unwrap().len(), 3);
        assert_eq!(result.timestamps.as_ref().unwrap().len(), 50);
        assert!(result.check_invariants().is_ok());
    }

    #[test]
    fn test_collect_time_capped() {
        let mut hooks = NativeRuntime;
        let options = RunnerOptions {
            max_time_ms: Some(30.0),
            warmup_iterations: 0,
            skip_settle: true,
            ..Default::default()
        };
        let result = collect(
            "busy",
            &BenchRunnable::Stateless(busy_work),
            None,
            &options,
            &mut hooks,
        )
        .unwrap();

        assert!(!result.samples.is_empty());
        assert!(result.total_time_s.unwrap() < 5.0);
    }

    #[test]
    fn test_collect_without_limits_fails_fast() {
        let mut hooks = NativeRuntime;
        let result = collect(
            "busy",
            &BenchRunnable::Stateless(busy_work),
            None,
            &RunnerOptions::default(),
            &mut hooks,
        );
        assert!(matches!(result, Err(BenchError::ConfigInvalid(_))));
    }

    #[test]
    fn test_stateful_setup_runs_once() {
        fn build(_: BenchArgs) -> BenchState {
            Box::new(vec![1u64; 128])
        }
        fn run(state: &BenchState) {
            let v = state.downcast_ref::<Vec<u64>>().unwrap();
            std::hint::black_box(v.iter().sum::<u64>());
        }

        let mut hooks = NativeRuntime;
        let runnable = BenchRunnable::Stateful {
            setup: SetupKind::Sync(build),
            run,
        };
        let result = collect("stateful", &runnable, None, &quick_options(), &mut hooks).unwrap();
        assert_eq!(result.samples.len(), 50);
    }

    #[test]
    fn test_async_setup_is_awaited() {
        fn build(_: BenchArgs) -> crate::registry::SetupFuture {
            Box::pin(async { Box::new(7u64) as BenchState })
        }
        fn run(state: &BenchState) {
            std::hint::black_box(state.downcast_ref::<u64>().unwrap());
        }

        let mut hooks = NativeRuntime;
        let runnable = BenchRunnable::Stateful {
            setup: SetupKind::Async(build),
            run,
        };
        let result = collect("async_setup", &runnable, None, &quick_options(), &mut hooks).unwrap();
        assert!(!result.samples.is_empty());
    }

    #[test]
    fn test_setup_override_on_stateless_rejected() {
        fn build(_: BenchArgs) -> BenchState {
            Box::new(())
        }
        let err = Work::prepare(
            &BenchRunnable::Stateless(busy_work),
            None,
            Some(SetupKind::Sync(build)),
        )
        .err()
        .unwrap();
        assert!(matches!(err, BenchError::ConfigInvalid(_)));
    }

    #[test]
    fn test_pause_schedule_first_only() {
        // pause_interval unset: exactly one pause at pause_first
        assert!(!pause_due(0, Some(5), None));
        assert!(pause_due(5, Some(5), None));
        assert!(!pause_due(10, Some(5), None));
    }

    #[test]
    fn test_pause_schedule_interval() {
        // first at 3, then every 4 iterations
        assert!(pause_due(3, Some(3), Some(4)));
        assert!(pause_due(7, Some(3), Some(4)));
        assert!(pause_due(11, Some(3), Some(4)));
        assert!(!pause_due(5, Some(3), Some(4)));
        assert!(!pause_due(2, Some(3), Some(4)));
    }

    #[test]
    fn test_pause_schedule_interval_without_first() {
        assert!(pause_due(0, None, Some(10)));
        assert!(pause_due(10, None, Some(10)));
        assert!(!pause_due(5, None, Some(10)));
    }

    #[test]
    fn test_pause_interval_zero_single_pause() {
        assert!(pause_due(4, Some(4), Some(0)));
        assert!(!pause_due(8, Some(4), Some(0)));
    }

    #[test]
    fn test_pause_points_recorded_and_excluded() {
        let mut hooks = NativeRuntime;
        let options = RunnerOptions {
            max_iterations: Some(20),
            warmup_iterations: 0,
            skip_settle: true,
            pause_first: Some(5),
            pause_interval: Some(10),
            pause_duration_ms: 1.0,
            ..Default::default()
        };
        let result = collect(
            "paused",
            &BenchRunnable::Stateless(busy_work),
            None,
            &options,
            &mut hooks,
        )
        .unwrap();

        let points = result.pause_points.unwrap();
        assert_eq!(
            points.iter().map(|p| p.sample_index).collect::<Vec<_>>(),
            vec![5, 15]
        );
    }

    #[test]
    fn test_summarize_monotonic() {
        let samples = vec![3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0];
        let t = summarize(&samples, true);

        assert!(t.min <= t.p25.unwrap());
        assert!(t.p25.unwrap() <= t.p50);
        assert!(t.p50 <= t.p75);
        assert!(t.p75 <= t.p95.unwrap());
        assert!(t.p95.unwrap() <= t.p99);
        assert!(t.p99 <= t.p999);
        assert!(t.p999 <= t.max);
    }

    #[test]
    fn test_summarize_plain_run_omits_extended_block() {
        let t = summarize(&[1.0, 2.0, 3.0], false);
        assert!(t.p25.is_none());
        assert!(t.cv.is_none());
        assert!(t.outlier_rate.is_none());
    }

    #[test]
    fn test_merge_concatenates_and_shifts() {
        let mut hooks = NativeRuntime;
        let options = RunnerOptions {
            max_iterations: Some(10),
            warmup_iterations: 0,
            skip_settle: true,
            pause_first: Some(2),
            pause_duration_ms: 0.5,
            ..Default::default()
        };
        let runnable = BenchRunnable::Stateless(busy_work);
        let a = collect("m", &runnable, None, &options, &mut hooks).unwrap();
        let b = collect("m", &runnable, None, &options, &mut hooks).unwrap();

        let merged = merge_results(vec![a, b], false).unwrap();
        assert_eq!(merged.samples.len(), 20);

        let points = merged.pause_points.unwrap();
        assert_eq!(
            points.iter().map(|p| p.sample_index).collect::<Vec<_>>(),
            vec![2, 12]
        );
        for p in &points {
            assert!(p.sample_index < 20);
        }
        assert_eq!(merged.timestamps.as_ref().unwrap().len(), 20);
    }

    #[test]
    fn test_merge_length_is_sum_of_inputs() {
        let mut hooks = NativeRuntime;
        let options = quick_options();
        let runnable = BenchRunnable::Stateless(busy_work);
        let batches: Vec<MeasuredResults> = (0..3)
            .map(|_| collect("m", &runnable, None, &options, &mut hooks).unwrap())
            .collect();
        let expected: usize = batches.iter().map(|b| b.samples.len()).sum();

        let merged = merge_results(batches, false).unwrap();
        assert_eq!(merged.samples.len(), expected);
    }
}
