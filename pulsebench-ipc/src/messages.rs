//! Worker Message Protocol
//!
//! One request, one reply. The parent frames a [`RunMessage`] to the child;
//! the child frames back exactly one [`WorkerReply`] and exits 0. Any other
//! exit is a parent-side orchestrator error.

use crate::options::RunnerOptions;
use crate::record::MeasuredResults;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};

/// Describes the work the child should resolve and run.
///
/// Benchmarks are compiled into the binary and registered under stable
/// identifiers, so the wire carries ids rather than code. For matrix runs
/// the variant/case fields identify the pair; `case_data` carries inline
/// JSON when the parent already loaded the case input, `case_loader` names
/// a registered loader for the child to resolve it locally.
#[derive(Debug, Clone, Default, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct WireSpec {
    /// Display name for errors and the result record
    pub name: String,
    /// Registered benchmark id to resolve in the child
    pub bench_id: Option<String>,
    /// Registered setup id overriding the benchmark's own setup
    pub setup_id: Option<String>,
    /// Directory the variant binary was spawned from (informational)
    pub variant_dir: Option<String>,
    /// Variant id; used as the bench id when `bench_id` is unset
    pub variant_id: Option<String>,
    /// Case id for matrix runs
    pub case_id: Option<String>,
    /// Inline case input as JSON
    pub case_data: Option<String>,
    /// Registered case-loader id to resolve `case_id` in the child
    pub case_loader: Option<String>,
}

/// The single request the parent sends after spawning a worker.
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct RunMessage {
    /// What to run
    pub spec: WireSpec,
    /// Collector strategy: `"default"` or `"adaptive"`
    pub runner_name: String,
    /// Collector tunables
    pub options: RunnerOptions,
    /// Benchmark parameter as JSON, passed to each iteration (stateless)
    /// or to setup (stateful)
    pub params: Option<String>,
}

/// The single reply the child sends before exiting.
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WorkerReply {
    /// The run completed; one record per executed benchmark
    Result {
        /// Measured records, in execution order
        results: Vec<MeasuredResults>,
        /// Opaque heap-sampling profile (JSON) when one was taken
        heap_profile: Option<String>,
    },
    /// The run failed inside the child
    Error {
        /// Message of the in-child error
        error: String,
        /// Backtrace captured at the failure site, when available
        stack: Option<String>,
    },
}
