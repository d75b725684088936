//! Suite Runner
//!
//! Runs groups of benchmarks strictly sequentially: within a group the
//! baseline runs first, then each member in declared order. With batching
//! enabled the time budget is split across N batches whose ordering
//! alternates (baseline-first, then baseline-last) to cancel systematic
//! drift; batch records merge back into one record per benchmark.

use crate::supervisor;
use indicatif::{ProgressBar, ProgressStyle};
use pulsebench_core::{
    BenchError, BenchTarget, BenchmarkSpec, NativeRuntime, SetupKind, Work, collect_adaptive,
    collect_prepared, find_benchmark, find_group, find_setup, group_benchmarks, merge_results,
};
use pulsebench_ipc::{MeasuredResults, RunMessage, RunnerOptions, WireSpec};
use pulsebench_stats::{CompareOptions, DifferenceCi, compare_medians};
use std::collections::BTreeMap;

/// An ordered list of benchmarks sharing a setup step, with an optional
/// baseline compared against every member.
#[derive(Debug, Clone, Default)]
pub struct BenchGroup {
    /// Group name
    pub name: String,
    /// Members, in declared order
    pub specs: Vec<BenchmarkSpec>,
    /// Baseline benchmark; runs first, compared against each member
    pub baseline: Option<BenchmarkSpec>,
    /// Registered setup id shared by the members
    pub setup: Option<String>,
    /// Free-form metadata; flows unchanged to the report
    pub metadata: BTreeMap<String, String>,
}

/// A suite: groups in execution order.
#[derive(Debug, Clone, Default)]
pub struct BenchSuite {
    /// Suite name
    pub name: String,
    /// Groups, in execution order
    pub groups: Vec<BenchGroup>,
}

impl BenchSuite {
    /// Build a suite from the registry: one group per distinct group id,
    /// enriched by `GroupDef` registrations where present.
    pub fn from_registry(name: impl Into<String>) -> Self {
        let mut seen = Vec::new();
        let mut groups = Vec::new();

        for bench in inventory::iter::<pulsebench_core::BenchmarkDef> {
            if seen.contains(&bench.group) {
                continue;
            }
            seen.push(bench.group);

            let def = find_group(bench.group);
            let specs = group_benchmarks(bench.group)
                .iter()
                .filter(|b| Some(b.id) != def.and_then(|d| d.baseline))
                .map(|b| BenchmarkSpec::registered(b.name, b.id))
                .collect();

            groups.push(BenchGroup {
                name: bench.group.to_string(),
                specs,
                baseline: def
                    .and_then(|d| d.baseline)
                    .map(|id| BenchmarkSpec::registered(id, id)),
                setup: def.and_then(|d| d.setup).map(str::to_string),
                metadata: def
                    .map(|d| {
                        d.metadata
                            .iter()
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect()
                    })
                    .unwrap_or_default(),
            });
        }

        Self {
            name: name.into(),
            groups,
        }
    }
}

/// Results for one group.
#[derive(Debug, Clone)]
pub struct GroupReport {
    /// Group name
    pub name: String,
    /// Metadata copied from the group
    pub metadata: BTreeMap<String, String>,
    /// Baseline record, when the group declared one
    pub baseline: Option<MeasuredResults>,
    /// Member records, in declared order
    pub results: Vec<MeasuredResults>,
    /// Baseline comparison per member, aligned with `results`
    pub comparisons: Vec<Option<DifferenceCi>>,
}

/// Results for the whole suite.
#[derive(Debug, Clone)]
pub struct SuiteReport {
    /// Suite name
    pub name: String,
    /// Group reports, in execution order
    pub groups: Vec<GroupReport>,
}

/// Run a suite.
///
/// `isolated` routes registered benchmarks through fresh worker children;
/// in-process callables always run in-process. `filter` is a
/// case-insensitive substring on benchmark names; a filter matching
/// nothing is a hard error.
pub fn run_suite(
    suite: &BenchSuite,
    options: &RunnerOptions,
    isolated: bool,
    filter: Option<&str>,
) -> Result<SuiteReport, BenchError> {
    options.validate().map_err(BenchError::ConfigInvalid)?;

    let groups = filter_groups(suite, filter)?;

    let total_runs: u64 = groups
        .iter()
        .map(|g| (g.specs.len() + usize::from(g.baseline.is_some())) as u64)
        .sum::<u64>()
        * options.batches as u64;
    let progress = ProgressBar::new(total_runs);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut reports = Vec::with_capacity(groups.len());
    for group in &groups {
        reports.push(run_group(group, options, isolated, &progress)?);
    }
    progress.finish_with_message("complete");

    Ok(SuiteReport {
        name: suite.name.clone(),
        groups: reports,
    })
}

fn filter_groups(suite: &BenchSuite, filter: Option<&str>) -> Result<Vec<BenchGroup>, BenchError> {
    let Some(raw) = filter else {
        return Ok(suite.groups.clone());
    };
    let needle = raw.to_lowercase();

    let mut groups = Vec::new();
    for group in &suite.groups {
        let specs: Vec<BenchmarkSpec> = group
            .specs
            .iter()
            .filter(|s| s.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        if !specs.is_empty() {
            groups.push(BenchGroup {
                specs,
                ..group.clone()
            });
        }
    }

    if groups.is_empty() {
        return Err(BenchError::FilterNoMatch {
            filter: raw.to_string(),
        });
    }
    Ok(groups)
}

fn run_group(
    group: &BenchGroup,
    options: &RunnerOptions,
    isolated: bool,
    progress: &ProgressBar,
) -> Result<GroupReport, BenchError> {
    let batches = options.batches.max(1);
    let batch_options = RunnerOptions {
        max_time_ms: options
            .effective_max_time_ms()
            .map(|t| t / batches as f64)
            .or(options.max_time_ms),
        ..options.clone()
    };

    let mut baseline_batches: Vec<MeasuredResults> = Vec::new();
    let mut member_batches: Vec<Vec<MeasuredResults>> = vec![Vec::new(); group.specs.len()];

    for batch in 0..batches {
        // Alternate baseline-first / baseline-last across batches so a
        // monotonic machine-state drift hits both sides equally.
        let baseline_first = batch % 2 == 0;

        if baseline_first {
            if let Some(spec) = &group.baseline {
                baseline_batches.push(run_spec(spec, group, &batch_options, isolated, progress)?);
            }
        }
        for (i, spec) in group.specs.iter().enumerate() {
            member_batches[i].push(run_spec(spec, group, &batch_options, isolated, progress)?);
        }
        if !baseline_first {
            if let Some(spec) = &group.baseline {
                baseline_batches.push(run_spec(spec, group, &batch_options, isolated, progress)?);
            }
        }
    }

    let baseline = match baseline_batches.is_empty() {
        true => None,
        false => Some(merge_results(baseline_batches, options.adaptive)?),
    };
    let mut results = Vec::with_capacity(member_batches.len());
    for batches in member_batches {
        results.push(merge_results(batches, options.adaptive)?);
    }

    // Baseline diffs ride along for the reporter.
    let compare_options = CompareOptions::default();
    let comparisons = results
        .iter()
        .map(|member| {
            baseline
                .as_ref()
                .and_then(|b| compare_medians(&b.samples, &member.samples, &compare_options).ok())
        })
        .collect();

    Ok(GroupReport {
        name: group.name.clone(),
        metadata: group.metadata.clone(),
        baseline,
        results,
        comparisons,
    })
}

fn run_spec(
    spec: &BenchmarkSpec,
    group: &BenchGroup,
    options: &RunnerOptions,
    isolated: bool,
    progress: &ProgressBar,
) -> Result<MeasuredResults, BenchError> {
    progress.set_message(spec.name.clone());
    tracing::debug!(benchmark = %spec.name, "running");

    let result = match &spec.target {
        BenchTarget::Callable(runnable) => run_in_process(
            &spec.name,
            runnable,
            spec.params.clone(),
            group.setup.as_deref(),
            options,
        ),
        BenchTarget::Registered { id, setup } => {
            let setup_id = setup.as_deref().or(group.setup.as_deref());
            if isolated {
                run_in_worker(spec, id, setup_id, options)
            } else {
                let bench = find_benchmark(id).ok_or_else(|| BenchError::BenchmarkFailed {
                    name: spec.name.clone(),
                    message: format!("benchmark not registered: {id}"),
                    stack: None,
                })?;
                run_in_process(
                    &spec.name,
                    &bench.runnable,
                    spec.params.clone(),
                    setup_id,
                    options,
                )
            }
        }
    };

    progress.inc(1);
    result
}

fn resolve_setup(setup_id: Option<&str>) -> Result<Option<SetupKind>, BenchError> {
    match setup_id {
        Some(id) => find_setup(id)
            .map(|def| Some(def.setup))
            .ok_or_else(|| BenchError::ConfigInvalid(format!("setup not registered: {id}"))),
        None => Ok(None),
    }
}

fn run_in_process(
    name: &str,
    runnable: &pulsebench_core::BenchRunnable,
    params: Option<pulsebench_core::BenchArgs>,
    setup_id: Option<&str>,
    options: &RunnerOptions,
) -> Result<MeasuredResults, BenchError> {
    // Only stateful benchmarks can take a shared setup; resolve_setup
    // leaves stateless ones alone by passing None through.
    let setup_override = match runnable {
        pulsebench_core::BenchRunnable::Stateful { .. } => resolve_setup(setup_id)?,
        pulsebench_core::BenchRunnable::Stateless(_) => None,
    };

    let mut hooks = NativeRuntime;
    let mut work = Work::prepare(runnable, params, setup_override)?;
    if options.adaptive {
        collect_adaptive(name, &mut work, options, &mut hooks)
    } else {
        collect_prepared(name, &mut work, options, &mut hooks)
    }
}

fn run_in_worker(
    spec: &BenchmarkSpec,
    bench_id: &str,
    setup_id: Option<&str>,
    options: &RunnerOptions,
) -> Result<MeasuredResults, BenchError> {
    let message = RunMessage {
        spec: WireSpec {
            name: spec.name.clone(),
            bench_id: Some(bench_id.to_string()),
            setup_id: setup_id.map(str::to_string),
            ..Default::default()
        },
        runner_name: if options.adaptive { "adaptive" } else { "default" }.to_string(),
        options: options.clone(),
        params: spec
            .params
            .as_ref()
            .map(|p| serde_json::to_string(p).unwrap_or_default()),
    };

    let results = supervisor::run_isolated(&message)?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| BenchError::EmptySamples {
            name: spec.name.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsebench_core::{BenchArgs, BenchRunnable};

    fn spin(_: &BenchArgs) {
        std::hint::black_box((0..256).sum::<u64>());
    }

    fn spin_slow(_: &BenchArgs) {
        std::hint::black_box((0..4096).sum::<u64>());
    }

    fn quick_options() -> RunnerOptions {
        RunnerOptions {
            max_iterations: Some(30),
            warmup_iterations: 0,
            skip_settle: true,
            ..Default::default()
        }
    }

    fn inline_group() -> BenchGroup {
        BenchGroup {
            name: "inline".to_string(),
            specs: vec![
                BenchmarkSpec::callable("spin", BenchRunnable::Stateless(spin)),
                BenchmarkSpec::callable("spin_slow", BenchRunnable::Stateless(spin_slow)),
            ],
            baseline: Some(BenchmarkSpec::callable(
                "baseline_spin",
                BenchRunnable::Stateless(spin),
            )),
            setup: None,
            metadata: BTreeMap::from([("unit".to_string(), "ns".to_string())]),
        }
    }

    #[test]
    fn test_group_runs_baseline_and_members() {
        let suite = BenchSuite {
            name: "t".to_string(),
            groups: vec![inline_group()],
        };
        let report = run_suite(&suite, &quick_options(), false, None).unwrap();

        let group = &report.groups[0];
        assert!(group.baseline.is_some());
        assert_eq!(group.results.len(), 2);
        assert_eq!(group.comparisons.len(), 2);
        assert!(group.comparisons.iter().all(|c| c.is_some()));
        assert_eq!(group.metadata.get("unit").unwrap(), "ns");
        for result in &group.results {
            assert!(result.check_invariants().is_ok());
        }
    }

    #[test]
    fn test_batching_merges_to_full_sample_count() {
        let suite = BenchSuite {
            name: "t".to_string(),
            groups: vec![inline_group()],
        };
        let options = RunnerOptions {
            batches: 3,
            ..quick_options()
        };
        let report = run_suite(&suite, &options, false, None).unwrap();

        // 3 batches x 30 iterations each
        assert_eq!(report.groups[0].results[0].samples.len(), 90);
        assert_eq!(report.groups[0].baseline.as_ref().unwrap().samples.len(), 90);
    }

    #[test]
    fn test_filter_selects_by_substring() {
        let suite = BenchSuite {
            name: "t".to_string(),
            groups: vec![inline_group()],
        };
        let report = run_suite(&suite, &quick_options(), false, Some("SLOW")).unwrap();

        assert_eq!(report.groups[0].results.len(), 1);
        assert_eq!(report.groups[0].results[0].name, "spin_slow");
    }

    #[test]
    fn test_filter_no_match_is_hard_error() {
        let suite = BenchSuite {
            name: "t".to_string(),
            groups: vec![inline_group()],
        };
        let err = run_suite(&suite, &quick_options(), false, Some("nonexistent")).unwrap_err();
        assert!(matches!(err, BenchError::FilterNoMatch { .. }));
    }

    #[test]
    fn test_invalid_options_fail_fast() {
        let suite = BenchSuite::default();
        let err = run_suite(&suite, &RunnerOptions::default(), false, None).unwrap_err();
        assert!(matches!(err, BenchError::ConfigInvalid(_)));
    }
}
