//! Integration tests for PulseBench
//!
//! End-to-end behavior of the harness: comparator scenarios, the adaptive
//! controller on live measurements, registry-driven suites, and the GC
//! trace pipeline.

use pulsebench::prelude::*;
use pulsebench::{
    BenchGroup, CompareOptions, Direction, GcType, RunnerOptions, aggregate_gc_stats, collect,
    compare_medians, parse_gc_line, run_suite,
};
use pulsebench_core::NativeRuntime;
use std::collections::BTreeMap;

fn fast_compare() -> CompareOptions {
    CompareOptions {
        resamples: 2000,
        parallel: false,
        ..Default::default()
    }
}

/// Scenario: a 20% speedup must come out as direction "faster" with the
/// whole interval below zero.
#[test]
fn test_speedup_detected_end_to_end() {
    let baseline: Vec<f64> = (50..150).map(|x| x as f64).collect();
    let current: Vec<f64> = baseline.iter().map(|x| x * 0.8).collect();

    let diff = compare_medians(&baseline, &current, &fast_compare()).unwrap();

    assert!((diff.percent - (-20.0)).abs() < 2.0);
    assert!(diff.ci.unwrap().upper < 0.0);
    assert_eq!(diff.direction, Direction::Faster);
}

/// Scenario: a 30% regression must come out as "slower" with the whole
/// interval above zero.
#[test]
fn test_regression_detected_end_to_end() {
    let baseline: Vec<f64> = (100..200).map(|x| x as f64).collect();
    let current: Vec<f64> = baseline.iter().map(|x| x * 1.3).collect();

    let diff = compare_medians(&baseline, &current, &fast_compare()).unwrap();

    assert!((diff.percent - 30.0).abs() < 3.0);
    assert!(diff.ci.unwrap().lower > 0.0);
    assert_eq!(diff.direction, Direction::Slower);
}

/// Scenario: small noise around an unchanged distribution stays uncertain.
#[test]
fn test_no_change_under_noise() {
    let baseline: Vec<f64> = (200..300).map(|x| x as f64).collect();
    // Deterministic "uniform(-1, 1)" jitter
    let current: Vec<f64> = baseline
        .iter()
        .enumerate()
        .map(|(i, x)| x + ((i * 37 % 100) as f64 / 50.0 - 1.0))
        .collect();

    let diff = compare_medians(&baseline, &current, &fast_compare()).unwrap();

    assert!(diff.percent.abs() < 5.0);
    let ci = diff.ci.unwrap();
    assert!(ci.lower <= 0.0 && ci.upper >= 0.0);
    assert_eq!(diff.direction, Direction::Uncertain);
}

/// Scenario: a 4x spread between the distributions is an unmistakable
/// signal: tiny p-value, interval strictly away from zero.
#[test]
fn test_wide_spread_strong_signal() {
    let samples: Vec<f64> = (100..200).map(|x| x as f64).collect();
    let fast: Vec<f64> = samples.iter().map(|x| x * 0.5).collect();
    let slow: Vec<f64> = samples.iter().map(|x| x * 2.0).collect();

    let diff = compare_medians(&fast, &slow, &fast_compare()).unwrap();

    assert!(diff.p_value < 0.01);
    assert!(diff.ci.unwrap().lower > 0.0);
}

/// Scenario: a single value against an identical vector is a wash.
#[test]
fn test_single_value_vs_identical_vector() {
    let baseline = vec![50.0];
    let current = vec![50.0; 5];

    let diff = compare_medians(&baseline, &current, &fast_compare()).unwrap();

    assert_eq!(diff.percent, 0.0);
    assert_eq!(diff.direction, Direction::Uncertain);
}

fn steady_millisecond(_: &BenchArgs) {
    let start = std::time::Instant::now();
    while start.elapsed().as_micros() < 1_000 {
        std::hint::black_box(0u64);
    }
}

/// Scenario: stable samples converge well before the time budget.
#[test]
fn test_adaptive_stops_early_on_stable_data() {
    let options = RunnerOptions {
        max_time_ms: Some(10_000.0),
        adaptive: true,
        target_confidence: 95.0,
        warmup_iterations: 2,
        skip_settle: true,
        ..Default::default()
    };

    let started = std::time::Instant::now();
    let mut work =
        pulsebench::Work::prepare(&BenchRunnable::Stateless(steady_millisecond), None, None)
            .unwrap();
    let result =
        pulsebench::collect_adaptive("steady", &mut work, &options, &mut NativeRuntime).unwrap();

    assert!(started.elapsed().as_millis() < 15_000);

    let convergence = result.convergence.as_ref().expect("adaptive run records convergence");
    assert!(convergence.converged);
    assert_eq!(convergence.confidence, 100.0);
    assert_eq!(convergence.reason, "Stable performance pattern");
    assert!(result.check_invariants().is_ok());
}

/// Scenario: the documented V8 trace line parses field-for-field.
#[test]
fn test_gc_line_parse_scenario() {
    let line = "[71753:0x83280c000:0] 9 ms: pause=0.5 mutator=0.1 gc=s allocated=293224 \
                promoted=653480 new_space_survived=290176 start_object_size=4392688 \
                end_object_size=4287840";

    let event = parse_gc_line(line).expect("conforming line parses");
    assert_eq!(event.gc_type, GcType::Scavenge);
    assert_eq!(event.pause_ms, 0.5);
    assert_eq!(event.allocated, Some(293224));
    assert_eq!(event.promoted, 653480);
    assert_eq!(event.survived, 290176);
    assert_eq!(event.collected(), 104848);

    let stats = aggregate_gc_stats(&[event]);
    assert_eq!(stats.scavenges, 1);
    assert_eq!(stats.total_collected, 104848);
    assert_eq!(stats.total_allocated, Some(293224));
}

fn spin(_: &BenchArgs) {
    std::hint::black_box((0..1024).sum::<u64>());
}

fn spin_with_param(args: &BenchArgs) {
    let n = args.get("n").and_then(|v| v.as_u64()).unwrap_or(128);
    std::hint::black_box((0..n).sum::<u64>());
}

pulsebench::register_benchmark! {
    id: "integration_spin", name: "integration spin", group: "integration", run: spin,
}

pulsebench::register_benchmark! {
    id: "integration_param", name: "integration param", group: "integration", run: spin_with_param,
}

/// Registered benchmarks resolve by id and run through the suite.
#[test]
fn test_registered_suite_in_process() {
    let group = BenchGroup {
        name: "integration".to_string(),
        specs: vec![
            BenchmarkSpec::registered("integration spin", "integration_spin"),
            BenchmarkSpec::registered("integration param", "integration_param")
                .with_params(serde_json::json!({"n": 2048})),
        ],
        baseline: Some(BenchmarkSpec::registered("baseline", "integration_spin")),
        setup: None,
        metadata: BTreeMap::new(),
    };
    let suite = BenchSuite {
        name: "integration".to_string(),
        groups: vec![group],
    };
    let options = RunnerOptions {
        max_iterations: Some(40),
        warmup_iterations: 2,
        skip_settle: true,
        ..Default::default()
    };

    let report = run_suite(&suite, &options, false, None).unwrap();

    let group = &report.groups[0];
    assert_eq!(group.results.len(), 2);
    assert!(group.baseline.is_some());
    for (result, comparison) in group.results.iter().zip(&group.comparisons) {
        assert_eq!(result.samples.len(), 40);
        assert!(comparison.is_some());
        assert!(result.check_invariants().is_ok());
    }
}

/// Running the collector twice on the same deterministic workload gives
/// results of the same magnitude. Wide tolerances: this asserts sanity,
/// not bit-level reproducibility.
#[test]
fn test_repeat_runs_roughly_agree() {
    let options = RunnerOptions {
        max_iterations: Some(60),
        warmup_iterations: 5,
        skip_settle: true,
        ..Default::default()
    };

    let runnable = BenchRunnable::Stateless(steady_millisecond);
    let first = collect("repeat", &runnable, None, &options, &mut NativeRuntime).unwrap();
    let second = collect("repeat", &runnable, None, &options, &mut NativeRuntime).unwrap();

    assert_eq!(first.samples.len(), second.samples.len());

    let diff = compare_medians(&first.samples, &second.samples, &fast_compare()).unwrap();
    assert!(
        diff.percent.abs() < 50.0,
        "repeat runs diverged by {}%",
        diff.percent
    );
}

/// Percentile invariants hold on every record the collector emits.
#[test]
fn test_record_percentiles_monotonic() {
    let options = RunnerOptions {
        max_iterations: Some(100),
        warmup_iterations: 0,
        skip_settle: true,
        adaptive: false,
        ..Default::default()
    };
    let result = collect(
        "mono",
        &BenchRunnable::Stateless(spin),
        None,
        &options,
        &mut NativeRuntime,
    )
    .unwrap();

    let t = &result.time;
    assert!(t.min <= t.p50);
    assert!(t.p50 <= t.p75);
    assert!(t.p75 <= t.p99);
    assert!(t.p99 <= t.p999);
    assert!(t.p999 <= t.max);
}
