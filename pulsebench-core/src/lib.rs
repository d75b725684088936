#![warn(missing_docs)]
//! PulseBench Core - Measurement Runtime
//!
//! This crate provides the execution environment for benchmarks:
//! - The sample collection loop (warmup, settle, measurement, pauses)
//! - The adaptive controller that decides when enough samples exist
//! - The compile-time benchmark registry
//! - Runtime hooks (GC hint, heap probe, optimization-tier status)
//! - The worker-child main loop for process-isolated execution

mod adaptive;
mod collector;
mod error;
mod heap;
mod measure;
mod registry;
mod runtime;
mod worker;

pub use adaptive::{
    DEFAULT_WINDOW, DRIFT_THRESHOLD, check_convergence, collect_adaptive, window_size,
};
pub use collector::{Work, collect, collect_prepared, merge_results, summarize};
pub use error::BenchError;
pub use heap::{TrackingAllocator, heap_used};
pub use measure::{Timer, pin_to_cpu, wall_clock_micros};
pub use registry::{
    BenchArgs, BenchRunnable, BenchState, BenchTarget, BenchmarkDef, BenchmarkSpec, CaseLoaderDef,
    GroupDef, SetupDef, SetupFuture, SetupKind, find_benchmark, find_case_loader, find_group,
    find_setup, group_benchmarks,
};
pub use runtime::{NativeRuntime, RuntimeHooks};
pub use worker::{WORKER_LIFETIME_SECS, WorkerMain, shutdown_requested};

// The wire flag lives with the protocol so both sides agree on it.
pub use pulsebench_ipc::WORKER_FLAG;

/// Anchor to prevent LTO from stripping inventory entries
#[used]
#[doc(hidden)]
pub static REGISTRY_ANCHOR: fn() = || {
    for _ in inventory::iter::<BenchmarkDef> {}
    for _ in inventory::iter::<GroupDef> {}
    for _ in inventory::iter::<SetupDef> {}
    for _ in inventory::iter::<CaseLoaderDef> {}
};
