#![warn(missing_docs)]
//! PulseBench Runner
//!
//! Orchestration on the parent side: isolated worker execution, the suite
//! and matrix runners, GC trace capture, configuration discovery, and
//! result persistence for external reporters.
//!
//! A benchmark binary wires itself up like this:
//!
//! ```ignore
//! fn main() -> anyhow::Result<()> {
//!     pulsebench_runner::worker_mode_or_continue();
//!     pulsebench_runner::init_logging(false);
//!
//!     let suite = pulsebench_runner::BenchSuite::from_registry("my-suite");
//!     let options = pulsebench_runner::PulseConfig::discover()
//!         .unwrap_or_default()
//!         .to_options()?;
//!     let report = pulsebench_runner::run_suite(&suite, &options, true, None)?;
//!     // hand `report` to a reporter
//!     Ok(())
//! }
//! ```

mod config;
mod gctrace;
mod matrix;
mod suite;
mod supervisor;

pub use config::{OutputSection, PulseConfig, RunnerSection, WorkerSection};
pub use gctrace::{GcEvent, GcType, aggregate_gc_stats, parse_gc_line, render_gc_line};
pub use matrix::{
    BenchMatrix, CaseReport, InlineVariant, MatrixReport, VariantOutcome, VariantSource,
    run_matrix,
};
pub use suite::{BenchGroup, BenchSuite, GroupReport, SuiteReport, run_suite};
pub use supervisor::{WORKER_TIMEOUT, WorkerHandle, run_isolated, run_isolated_binary};

use pulsebench_core::{WORKER_FLAG, WorkerMain};
use pulsebench_ipc::MeasuredResults;
use std::path::Path;

/// If this process was launched with the worker flag, serve the run
/// request and exit with the worker's status. Call first in `main`.
pub fn worker_mode_or_continue() {
    if std::env::args().any(|arg| arg == WORKER_FLAG) {
        let code = WorkerMain::new().run();
        std::process::exit(code);
    }
}

/// Initialize tracing output. Safe to call more than once.
pub fn init_logging(verbose: bool) {
    let filter = if verbose {
        "pulsebench=debug"
    } else {
        "pulsebench=info"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Save result records as JSON for reporters and baseline comparisons.
pub fn save_results(path: impl AsRef<Path>, results: &[MeasuredResults]) -> anyhow::Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(path.as_ref(), json)?;
    Ok(())
}

/// Load result records saved by [`save_results`].
pub fn load_results(path: impl AsRef<Path>) -> anyhow::Result<Vec<MeasuredResults>> {
    let content = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&content)?)
}
