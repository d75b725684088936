//! # PulseBench
//!
//! A benchmark harness for short-running code units:
//! - **Process isolation**: each benchmark runs in a fresh worker child so
//!   code caches and allocator state never leak between measurements
//! - **Adaptive sampling**: collection stops once two sliding windows of
//!   samples agree on median and outlier impact
//! - **Bootstrap comparison**: baseline diffs come with a confidence
//!   interval on the percentage change of medians
//! - **Matrix runs**: variants × cases with per-variant baselines
//!
//! ## Quick start
//!
//! ```ignore
//! use pulsebench::prelude::*;
//!
//! fn fibonacci(_: &BenchArgs) {
//!     std::hint::black_box(fib(20));
//! }
//!
//! pulsebench::register_benchmark! {
//!     id: "fib_20", name: "fibonacci 20", group: "math", run: fibonacci,
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     pulsebench::worker_mode_or_continue();
//!     let suite = BenchSuite::from_registry("math-suite");
//!     let options = RunnerOptions {
//!         max_time_ms: Some(2_000.0),
//!         ..Default::default()
//!     };
//!     let report = pulsebench::run_suite(&suite, &options, true, None)?;
//!     Ok(())
//! }
//! ```

// Re-export the measurement runtime
pub use pulsebench_core::{
    BenchArgs, BenchError, BenchRunnable, BenchState, BenchTarget, BenchmarkDef, BenchmarkSpec,
    CaseLoaderDef, GroupDef, NativeRuntime, RuntimeHooks, SetupDef, SetupFuture, SetupKind,
    TrackingAllocator, Work, WorkerMain, check_convergence, collect, collect_adaptive,
    find_benchmark, heap_used, merge_results, summarize, window_size,
};

// Re-export the shared data model and protocol surface
pub use pulsebench_ipc::{
    Convergence, GcStats, MeasuredResults, PausePoint, RunnerOptions, SETTLE_MS, TimeStats,
    WORKER_FLAG,
};

// Re-export the statistical engine
pub use pulsebench_stats::{
    CiBounds, CompareOptions, DifferenceCi, Direction, Histogram, compare_medians, mean, median,
    median_abs_deviation, outlier_impact, percentile, resample, std_dev, tukey_outliers,
};

// Re-export orchestration
pub use pulsebench_runner::{
    BenchGroup, BenchMatrix, BenchSuite, CaseReport, GcEvent, GcType, GroupReport, InlineVariant,
    MatrixReport, PulseConfig, SuiteReport, VariantOutcome, VariantSource, WORKER_TIMEOUT,
    WorkerHandle, aggregate_gc_stats, init_logging, load_results, parse_gc_line, render_gc_line,
    run_isolated, run_isolated_binary, run_matrix, run_suite, save_results,
    worker_mode_or_continue,
};

/// Internal re-exports for macro use
#[doc(hidden)]
pub mod internal {
    pub use inventory;
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BenchArgs, BenchRunnable, BenchSuite, BenchmarkSpec, MeasuredResults, RunnerOptions,
        register_benchmark, register_case_loader, register_group, register_setup,
    };
}

/// Register a benchmark under a stable id.
///
/// ```ignore
/// pulsebench::register_benchmark! {
///     id: "hash_u64", name: "hash a u64", group: "hashing", run: hash_u64,
/// }
/// ```
///
/// With a setup step (the state form):
///
/// ```ignore
/// pulsebench::register_benchmark! {
///     id: "sort_1k", name: "sort 1k ints", group: "sorting",
///     setup: build_unsorted, run: sort_them,
/// }
/// ```
#[macro_export]
macro_rules! register_benchmark {
    (id: $id:expr, name: $name:expr, group: $group:expr, run: $run:path $(,)?) => {
        $crate::internal::inventory::submit! {
            $crate::BenchmarkDef {
                id: $id,
                name: $name,
                group: $group,
                runnable: $crate::BenchRunnable::Stateless($run),
            }
        }
    };
    (id: $id:expr, name: $name:expr, group: $group:expr, setup: $setup:path, run: $run:path $(,)?) => {
        $crate::internal::inventory::submit! {
            $crate::BenchmarkDef {
                id: $id,
                name: $name,
                group: $group,
                runnable: $crate::BenchRunnable::Stateful {
                    setup: $crate::SetupKind::Sync($setup),
                    run: $run,
                },
            }
        }
    };
}

/// Register a group with optional baseline, shared setup, and metadata.
#[macro_export]
macro_rules! register_group {
    (id: $id:expr, description: $desc:expr
     $(, baseline: $baseline:expr)?
     $(, setup: $setup:expr)?
     $(, metadata: $metadata:expr)? $(,)?) => {
        $crate::internal::inventory::submit! {
            $crate::GroupDef {
                id: $id,
                description: $desc,
                baseline: {
                    #[allow(unused_mut, unused_assignments)]
                    let mut baseline: Option<&'static str> = None;
                    $(baseline = Some($baseline);)?
                    baseline
                },
                setup: {
                    #[allow(unused_mut, unused_assignments)]
                    let mut setup: Option<&'static str> = None;
                    $(setup = Some($setup);)?
                    setup
                },
                metadata: {
                    #[allow(unused_mut, unused_assignments)]
                    let mut metadata: &'static [(&'static str, &'static str)] = &[];
                    $(metadata = $metadata;)?
                    metadata
                },
            }
        }
    };
}

/// Register a setup step addressable by id.
#[macro_export]
macro_rules! register_setup {
    (id: $id:expr, run: $setup:path $(,)?) => {
        $crate::internal::inventory::submit! {
            $crate::SetupDef {
                id: $id,
                setup: $crate::SetupKind::Sync($setup),
            }
        }
    };
    (id: $id:expr, run_async: $setup:path $(,)?) => {
        $crate::internal::inventory::submit! {
            $crate::SetupDef {
                id: $id,
                setup: $crate::SetupKind::Async($setup),
            }
        }
    };
}

/// Register a case loader for matrix runs.
#[macro_export]
macro_rules! register_case_loader {
    (id: $id:expr, load: $load:path $(,)?) => {
        $crate::internal::inventory::submit! {
            $crate::CaseLoaderDef {
                id: $id,
                load: $load,
            }
        }
    };
}
