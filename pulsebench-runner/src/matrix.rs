//! Matrix Runner
//!
//! Runs a variants × cases cross product. Variants are the things under
//! test, cases the inputs they run against. Inline variants run with the
//! in-process collector; a variant directory holds one benchmark binary
//! per variant id, and every (variant, case) pair then gets its own fresh
//! worker.
//!
//! Baseline semantics, mutually exclusive by construction:
//! - `baseline_dir`: per-variant baseline binaries; a variant present in
//!   both directories gets its baseline run attached with a delta.
//! - `baseline_variant`: one variant is the reference; every other
//!   variant's result for the same case compares against it.

use crate::supervisor;
use pulsebench_core::{
    BenchArgs, BenchError, BenchRunnable, NativeRuntime, Work, collect_adaptive, collect_prepared,
    find_case_loader,
};
use pulsebench_ipc::{MeasuredResults, RunMessage, RunnerOptions, WireSpec};
use std::path::{Path, PathBuf};

/// An in-process variant.
#[derive(Debug, Clone)]
pub struct InlineVariant {
    /// Variant id (the axis label)
    pub id: String,
    /// The callable under test
    pub runnable: BenchRunnable,
}

/// Where variants come from.
#[derive(Debug, Clone)]
pub enum VariantSource {
    /// Callables defined in the calling process
    Inline(Vec<InlineVariant>),
    /// Directory of variant benchmark binaries, one per variant id
    Dir(PathBuf),
}

/// A named collection of variants and cases.
#[derive(Debug, Clone)]
pub struct BenchMatrix {
    /// Matrix name
    pub name: String,
    /// The things under test
    pub variants: VariantSource,
    /// Case identifiers
    pub cases: Vec<String>,
    /// Registered loader turning a case id into its input value; without
    /// one the case id itself is the input
    pub case_loader: Option<String>,
    /// Directory of per-variant baseline binaries
    pub baseline_dir: Option<PathBuf>,
    /// Variant serving as the reference for all others
    pub baseline_variant: Option<String>,
    /// Pre-selected case ids; intersects with any filter
    pub filtered_cases: Vec<String>,
    /// Pre-selected variant ids; intersects with any filter
    pub filtered_variants: Vec<String>,
}

impl BenchMatrix {
    /// A matrix over inline variants.
    pub fn inline(name: impl Into<String>, variants: Vec<InlineVariant>, cases: Vec<String>) -> Self {
        Self {
            name: name.into(),
            variants: VariantSource::Inline(variants),
            cases,
            case_loader: None,
            baseline_dir: None,
            baseline_variant: None,
            filtered_cases: Vec::new(),
            filtered_variants: Vec::new(),
        }
    }

    fn validate(&self) -> Result<(), BenchError> {
        if self.baseline_dir.is_some() && self.baseline_variant.is_some() {
            return Err(BenchError::ConfigInvalid(
                "baseline_dir and baseline_variant are mutually exclusive".to_string(),
            ));
        }
        if matches!(self.variants, VariantSource::Inline(_)) && self.baseline_dir.is_some() {
            // baseline_dir needs re-resolvable variants; inline callables
            // cannot be re-spawned from another binary
            return Err(BenchError::ConfigInvalid(
                "inline variants cannot use baseline_dir".to_string(),
            ));
        }
        if self.cases.is_empty() {
            return Err(BenchError::ConfigInvalid(format!(
                "matrix '{}' has no cases",
                self.name
            )));
        }
        Ok(())
    }
}

/// One variant's outcome for one case.
#[derive(Debug, Clone)]
pub struct VariantOutcome {
    /// Variant id
    pub variant_id: String,
    /// The measured record
    pub result: MeasuredResults,
    /// Baseline record, when baseline semantics attached one
    pub baseline: Option<MeasuredResults>,
    /// `(avg(current) − avg(baseline)) / avg(baseline) · 100`; 0 when the
    /// baseline average is 0
    pub delta_percent: Option<f64>,
}

/// All variant outcomes for one case.
#[derive(Debug, Clone)]
pub struct CaseReport {
    /// Case id
    pub case_id: String,
    /// Outcomes, in variant order
    pub variants: Vec<VariantOutcome>,
}

/// The full cross-product result.
#[derive(Debug, Clone)]
pub struct MatrixReport {
    /// Matrix name
    pub name: String,
    /// Case reports, in case order
    pub cases: Vec<CaseReport>,
}

/// `"case/variant"` filter; either half optional. Matching is
/// case-insensitive substring. A bare term (no `/`) selects pairs where it
/// matches either axis.
#[derive(Debug, Clone)]
struct MatrixFilter {
    case: Option<String>,
    variant: Option<String>,
    either: Option<String>,
}

impl MatrixFilter {
    fn parse(raw: &str) -> Self {
        match raw.split_once('/') {
            Some((case, variant)) => Self {
                case: (!case.is_empty()).then(|| case.to_lowercase()),
                variant: (!variant.is_empty()).then(|| variant.to_lowercase()),
                either: None,
            },
            None => Self {
                case: None,
                variant: None,
                either: Some(raw.to_lowercase()),
            },
        }
    }

    fn matches(&self, case_id: &str, variant_id: &str) -> bool {
        let case_id = case_id.to_lowercase();
        let variant_id = variant_id.to_lowercase();

        if let Some(term) = &self.either {
            return case_id.contains(term) || variant_id.contains(term);
        }
        self.case.as_ref().map_or(true, |c| case_id.contains(c))
            && self.variant.as_ref().map_or(true, |v| variant_id.contains(v))
    }
}

/// Run the matrix.
pub fn run_matrix(
    matrix: &BenchMatrix,
    options: &RunnerOptions,
    filter: Option<&str>,
) -> Result<MatrixReport, BenchError> {
    matrix.validate()?;
    options.validate().map_err(BenchError::ConfigInvalid)?;

    let variant_ids = variant_ids(matrix)?;
    if let Some(baseline) = &matrix.baseline_variant {
        if !variant_ids.contains(baseline) {
            return Err(BenchError::ConfigInvalid(format!(
                "baseline_variant '{baseline}' is not a variant of matrix '{}'",
                matrix.name
            )));
        }
    }

    let pairs = select_pairs(matrix, &variant_ids, filter)?;

    let mut cases = Vec::new();
    for case_id in &matrix.cases {
        // A case with no surviving pair is skipped entirely; the reference
        // variant joins only cases that still run.
        if !pairs.iter().any(|(c, _)| c == case_id) {
            continue;
        }
        let selected: Vec<&String> = variant_ids
            .iter()
            .filter(|v| {
                pairs.contains(&(case_id.clone(), (*v).clone()))
                    || matrix.baseline_variant.as_deref() == Some(v.as_str())
            })
            .collect();

        let mut outcomes = Vec::with_capacity(selected.len());
        for variant_id in selected {
            tracing::info!(case = %case_id, variant = %variant_id, "matrix cell");
            let result = run_cell(matrix, variant_id, case_id, options)?;
            let baseline = run_dir_baseline(matrix, variant_id, case_id, options)?;
            let delta_percent = baseline.as_ref().map(|b| delta_percent(&result, b));
            outcomes.push(VariantOutcome {
                variant_id: variant_id.clone(),
                result,
                baseline,
                delta_percent,
            });
        }

        if let Some(reference) = &matrix.baseline_variant {
            attach_variant_baseline(&mut outcomes, reference);
        }

        cases.push(CaseReport {
            case_id: case_id.clone(),
            variants: outcomes,
        });
    }

    Ok(MatrixReport {
        name: matrix.name.clone(),
        cases,
    })
}

/// Variant ids in execution order: declared order for inline variants,
/// sorted file names for a variant directory.
fn variant_ids(matrix: &BenchMatrix) -> Result<Vec<String>, BenchError> {
    match &matrix.variants {
        VariantSource::Inline(variants) => {
            if variants.is_empty() {
                return Err(BenchError::ConfigInvalid(format!(
                    "matrix '{}' has no variants",
                    matrix.name
                )));
            }
            Ok(variants.iter().map(|v| v.id.clone()).collect())
        }
        VariantSource::Dir(dir) => {
            let mut ids: Vec<String> = std::fs::read_dir(dir)
                .map_err(|e| {
                    BenchError::ConfigInvalid(format!(
                        "cannot read variant dir {}: {e}",
                        dir.display()
                    ))
                })?
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_file())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .collect();
            ids.sort();
            if ids.is_empty() {
                return Err(BenchError::ConfigInvalid(format!(
                    "variant dir {} is empty",
                    dir.display()
                )));
            }
            Ok(ids)
        }
    }
}

/// Apply the filter and the pre-existing allowlists; hard error when the
/// selection ends up empty.
fn select_pairs(
    matrix: &BenchMatrix,
    variant_ids: &[String],
    filter: Option<&str>,
) -> Result<Vec<(String, String)>, BenchError> {
    let parsed = filter.map(MatrixFilter::parse);

    let mut pairs = Vec::new();
    for case_id in &matrix.cases {
        if !matrix.filtered_cases.is_empty() && !matrix.filtered_cases.contains(case_id) {
            continue;
        }
        for variant_id in variant_ids {
            if !matrix.filtered_variants.is_empty()
                && !matrix.filtered_variants.contains(variant_id)
            {
                continue;
            }
            if parsed
                .as_ref()
                .map_or(true, |f| f.matches(case_id, variant_id))
            {
                pairs.push((case_id.clone(), variant_id.clone()));
            }
        }
    }

    if pairs.is_empty() {
        return Err(BenchError::FilterNoMatch {
            filter: filter.unwrap_or("<filtered_cases/filtered_variants>").to_string(),
        });
    }
    Ok(pairs)
}

/// Resolve the input value for a case.
fn case_params(matrix: &BenchMatrix, case_id: &str) -> Result<BenchArgs, BenchError> {
    match &matrix.case_loader {
        Some(loader_id) => {
            let loader = find_case_loader(loader_id).ok_or_else(|| {
                BenchError::ConfigInvalid(format!("case loader not registered: {loader_id}"))
            })?;
            Ok((loader.load)(case_id))
        }
        None => Ok(BenchArgs::String(case_id.to_string())),
    }
}

/// Run one (variant, case) cell.
fn run_cell(
    matrix: &BenchMatrix,
    variant_id: &str,
    case_id: &str,
    options: &RunnerOptions,
) -> Result<MeasuredResults, BenchError> {
    let name = format!("{case_id}/{variant_id}");
    match &matrix.variants {
        VariantSource::Inline(variants) => {
            let variant = variants
                .iter()
                .find(|v| v.id == variant_id)
                .ok_or_else(|| {
                    BenchError::ConfigInvalid(format!("unknown variant: {variant_id}"))
                })?;
            let params = case_params(matrix, case_id)?;
            run_inline(&name, &variant.runnable, params, options)
        }
        VariantSource::Dir(dir) => {
            run_worker_cell(&name, &dir.join(variant_id), matrix, variant_id, case_id, options)
        }
    }
}

/// Run the baseline-directory counterpart for a cell, when one exists.
fn run_dir_baseline(
    matrix: &BenchMatrix,
    variant_id: &str,
    case_id: &str,
    options: &RunnerOptions,
) -> Result<Option<MeasuredResults>, BenchError> {
    let Some(baseline_dir) = &matrix.baseline_dir else {
        return Ok(None);
    };
    let binary = baseline_dir.join(variant_id);
    if !binary.is_file() {
        // Only variants that also exist in the baseline directory compare
        return Ok(None);
    }

    let name = format!("{case_id}/{variant_id} (baseline)");
    run_worker_cell(&name, &binary, matrix, variant_id, case_id, options).map(Some)
}

fn run_inline(
    name: &str,
    runnable: &BenchRunnable,
    params: BenchArgs,
    options: &RunnerOptions,
) -> Result<MeasuredResults, BenchError> {
    let mut hooks = NativeRuntime;
    let mut work = Work::prepare(runnable, Some(params), None)?;
    if options.adaptive {
        collect_adaptive(name, &mut work, options, &mut hooks)
    } else {
        collect_prepared(name, &mut work, options, &mut hooks)
    }
}

fn run_worker_cell(
    name: &str,
    binary: &Path,
    matrix: &BenchMatrix,
    variant_id: &str,
    case_id: &str,
    options: &RunnerOptions,
) -> Result<MeasuredResults, BenchError> {
    let message = RunMessage {
        spec: WireSpec {
            name: name.to_string(),
            variant_dir: binary.parent().map(|p| p.display().to_string()),
            variant_id: Some(variant_id.to_string()),
            case_id: Some(case_id.to_string()),
            case_loader: matrix.case_loader.clone(),
            case_data: matrix
                .case_loader
                .is_none()
                .then(|| serde_json::to_string(case_id).unwrap_or_default()),
            ..Default::default()
        },
        runner_name: if options.adaptive { "adaptive" } else { "default" }.to_string(),
        options: options.clone(),
        params: None,
    };

    let results = supervisor::run_isolated_binary(binary, &message)?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| BenchError::EmptySamples {
            name: name.to_string(),
        })
}

/// Percentage change of the averages; 0 when the baseline average is 0.
fn delta_percent(current: &MeasuredResults, baseline: &MeasuredResults) -> f64 {
    if baseline.time.avg == 0.0 {
        return 0.0;
    }
    (current.time.avg - baseline.time.avg) / baseline.time.avg * 100.0
}

/// Mark one variant's results as the baseline for every other outcome of
/// the same case. The reference variant keeps no baseline of its own.
fn attach_variant_baseline(outcomes: &mut [VariantOutcome], reference: &str) {
    let Some(baseline) = outcomes
        .iter()
        .find(|o| o.variant_id == reference)
        .map(|o| o.result.clone())
    else {
        return;
    };

    for outcome in outcomes.iter_mut() {
        if outcome.variant_id == reference {
            continue;
        }
        outcome.delta_percent = Some(delta_percent(&outcome.result, &baseline));
        outcome.baseline = Some(baseline.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast(_: &BenchArgs) {
        std::hint::black_box((0..128).sum::<u64>());
    }

    fn slow(_: &BenchArgs) {
        std::hint::black_box((0..8192).sum::<u64>());
    }

    fn quick_options() -> RunnerOptions {
        RunnerOptions {
            max_iterations: Some(25),
            warmup_iterations: 0,
            skip_settle: true,
            ..Default::default()
        }
    }

    fn two_by_two() -> BenchMatrix {
        BenchMatrix::inline(
            "m",
            vec![
                InlineVariant {
                    id: "fast".to_string(),
                    runnable: BenchRunnable::Stateless(fast),
                },
                InlineVariant {
                    id: "slow".to_string(),
                    runnable: BenchRunnable::Stateless(slow),
                },
            ],
            vec!["small".to_string(), "large".to_string()],
        )
    }

    #[test]
    fn test_cross_product_runs_all_cells() {
        let report = run_matrix(&two_by_two(), &quick_options(), None).unwrap();

        assert_eq!(report.cases.len(), 2);
        for case in &report.cases {
            assert_eq!(case.variants.len(), 2);
            for outcome in &case.variants {
                assert_eq!(outcome.result.samples.len(), 25);
                assert!(outcome.baseline.is_none());
            }
        }
    }

    #[test]
    fn test_baseline_variant_attaches_deltas() {
        let mut matrix = two_by_two();
        matrix.baseline_variant = Some("fast".to_string());

        let report = run_matrix(&matrix, &quick_options(), None).unwrap();

        for case in &report.cases {
            let fast = case.variants.iter().find(|v| v.variant_id == "fast").unwrap();
            let slow = case.variants.iter().find(|v| v.variant_id == "slow").unwrap();

            // The reference has no baseline of its own
            assert!(fast.baseline.is_none());
            assert!(fast.delta_percent.is_none());
            assert!(slow.baseline.is_some());
            assert!(slow.delta_percent.is_some());
        }
    }

    #[test]
    fn test_both_baselines_rejected() {
        let mut matrix = two_by_two();
        matrix.baseline_variant = Some("fast".to_string());
        matrix.baseline_dir = Some(PathBuf::from("/tmp/baselines"));

        let err = run_matrix(&matrix, &quick_options(), None).unwrap_err();
        assert!(matches!(err, BenchError::ConfigInvalid(_)));
    }

    #[test]
    fn test_inline_with_baseline_dir_rejected() {
        let mut matrix = two_by_two();
        matrix.baseline_dir = Some(PathBuf::from("/tmp/baselines"));

        let err = run_matrix(&matrix, &quick_options(), None).unwrap_err();
        assert!(matches!(err, BenchError::ConfigInvalid(_)));
    }

    #[test]
    fn test_unknown_baseline_variant_rejected() {
        let mut matrix = two_by_two();
        matrix.baseline_variant = Some("missing".to_string());

        let err = run_matrix(&matrix, &quick_options(), None).unwrap_err();
        assert!(matches!(err, BenchError::ConfigInvalid(_)));
    }

    #[test]
    fn test_filter_halves() {
        let filter = MatrixFilter::parse("small/fast");
        assert!(filter.matches("small", "fast"));
        assert!(!filter.matches("large", "fast"));
        assert!(!filter.matches("small", "slow"));

        let case_only = MatrixFilter::parse("small/");
        assert!(case_only.matches("small", "anything"));
        assert!(!case_only.matches("large", "anything"));

        let variant_only = MatrixFilter::parse("/fast");
        assert!(variant_only.matches("anything", "fast"));
        assert!(!variant_only.matches("anything", "slow"));
    }

    #[test]
    fn test_filter_bare_term_matches_either_axis() {
        let filter = MatrixFilter::parse("fast");
        assert!(filter.matches("small", "fast"));
        assert!(filter.matches("fastpath", "slow"));
        assert!(!filter.matches("small", "slow"));
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let filter = MatrixFilter::parse("SMALL/Fast");
        assert!(filter.matches("small", "fast"));
    }

    #[test]
    fn test_filter_selects_subset() {
        let report = run_matrix(&two_by_two(), &quick_options(), Some("small/")).unwrap();

        assert_eq!(report.cases.len(), 1);
        assert_eq!(report.cases[0].case_id, "small");
    }

    #[test]
    fn test_filter_no_match_fails() {
        let err = run_matrix(&two_by_two(), &quick_options(), Some("bogus/")).unwrap_err();
        assert!(matches!(err, BenchError::FilterNoMatch { .. }));
    }

    #[test]
    fn test_allowlists_intersect() {
        let mut matrix = two_by_two();
        matrix.filtered_variants = vec!["slow".to_string()];

        let report = run_matrix(&matrix, &quick_options(), None).unwrap();
        for case in &report.cases {
            assert_eq!(case.variants.len(), 1);
            assert_eq!(case.variants[0].variant_id, "slow");
        }
    }

    fn record_with_samples(name: &str, samples: Vec<f64>) -> MeasuredResults {
        MeasuredResults {
            name: name.to_string(),
            time: pulsebench_core::summarize(&samples, false),
            samples,
            warmup_samples: None,
            heap_samples: None,
            timestamps: None,
            opt_samples: None,
            pause_points: None,
            gc_stats: None,
            heap_profile: None,
            convergence: None,
            total_time_s: None,
            heap_growth_kb: None,
        }
    }

    #[test]
    fn test_delta_percent_zero_baseline() {
        let current = record_with_samples("current", vec![1.0, 2.0]);
        let zero = record_with_samples("zero", vec![0.0, 0.0]);
        assert_eq!(delta_percent(&current, &zero), 0.0);
    }

    #[test]
    fn test_delta_percent_regression() {
        let current = record_with_samples("current", vec![3.0, 3.0]);
        let baseline = record_with_samples("baseline", vec![2.0, 2.0]);
        assert!((delta_percent(&current, &baseline) - 50.0).abs() < 1e-9);
    }
}
