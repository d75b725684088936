//! Benchmark Registry
//!
//! Benchmarks are compiled into the binary and registered under stable
//! identifiers; the wire protocol ships ids, and worker children re-resolve
//! them here. Registration happens through `inventory` at link time.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;

/// The parameter value handed to a benchmark or its setup step.
pub type BenchArgs = serde_json::Value;

/// State produced by a setup step and borrowed by every iteration.
pub type BenchState = Box<dyn Any + Send>;

/// Future returned by an async setup function.
pub type SetupFuture = Pin<Box<dyn Future<Output = BenchState> + Send>>;

/// A setup step: runs once with the parameter value, returns iteration state.
#[derive(Clone, Copy)]
pub enum SetupKind {
    /// Plain function
    Sync(fn(BenchArgs) -> BenchState),
    /// Async function, driven on a current-thread runtime before
    /// measurement begins
    Async(fn(BenchArgs) -> SetupFuture),
}

impl std::fmt::Debug for SetupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetupKind::Sync(_) => write!(f, "SetupKind::Sync"),
            SetupKind::Async(_) => write!(f, "SetupKind::Async"),
        }
    }
}

/// How a benchmark's work is invoked.
///
/// A tagged union rather than structural detection: either the parameter
/// value goes straight into every iteration, or a setup step turns it into
/// state that iterations borrow.
#[derive(Debug, Clone, Copy)]
pub enum BenchRunnable {
    /// The parameter value is passed to each iteration.
    Stateless(fn(&BenchArgs)),
    /// `setup` runs once; each iteration receives the state it produced.
    Stateful {
        /// One-time state construction
        setup: SetupKind,
        /// Per-iteration body
        run: fn(&BenchState),
    },
}

/// A registered benchmark.
#[derive(Debug, Clone, Copy)]
pub struct BenchmarkDef {
    /// Stable identifier carried over the wire
    pub id: &'static str,
    /// Human-readable display name
    pub name: &'static str,
    /// Group this benchmark belongs to
    pub group: &'static str,
    /// How to invoke it
    pub runnable: BenchRunnable,
}

/// A registered group: shared setup, optional baseline, metadata that
/// flows unchanged to the report.
#[derive(Debug, Clone, Copy)]
pub struct GroupDef {
    /// Group identifier
    pub id: &'static str,
    /// Human-readable description
    pub description: &'static str,
    /// Benchmark id whose results baseline every member
    pub baseline: Option<&'static str>,
    /// Setup id shared by the members
    pub setup: Option<&'static str>,
    /// Free-form key/value metadata for the report
    pub metadata: &'static [(&'static str, &'static str)],
}

/// A registered setup step, addressable over the wire by id.
#[derive(Debug, Clone, Copy)]
pub struct SetupDef {
    /// Stable identifier
    pub id: &'static str,
    /// The setup function
    pub setup: SetupKind,
}

/// A registered case loader for matrix runs: turns a case id into the
/// input value for that case.
#[derive(Debug, Clone, Copy)]
pub struct CaseLoaderDef {
    /// Stable identifier
    pub id: &'static str,
    /// Loader function
    pub load: fn(&str) -> BenchArgs,
}

inventory::collect!(BenchmarkDef);
inventory::collect!(GroupDef);
inventory::collect!(SetupDef);
inventory::collect!(CaseLoaderDef);

/// Look up a registered benchmark by id.
pub fn find_benchmark(id: &str) -> Option<&'static BenchmarkDef> {
    inventory::iter::<BenchmarkDef>.into_iter().find(|b| b.id == id)
}

/// Look up a registered group by id.
pub fn find_group(id: &str) -> Option<&'static GroupDef> {
    inventory::iter::<GroupDef>.into_iter().find(|g| g.id == id)
}

/// Look up a registered setup step by id.
pub fn find_setup(id: &str) -> Option<&'static SetupDef> {
    inventory::iter::<SetupDef>.into_iter().find(|s| s.id == id)
}

/// Look up a registered case loader by id.
pub fn find_case_loader(id: &str) -> Option<&'static CaseLoaderDef> {
    inventory::iter::<CaseLoaderDef>
        .into_iter()
        .find(|c| c.id == id)
}

/// All benchmarks registered under a group, in registration order.
pub fn group_benchmarks(group: &str) -> Vec<&'static BenchmarkDef> {
    inventory::iter::<BenchmarkDef>
        .into_iter()
        .filter(|b| b.group == group)
        .collect()
}

/// A named unit of measurable work, as the suite API sees it.
#[derive(Debug, Clone)]
pub struct BenchmarkSpec {
    /// Stable display name
    pub name: String,
    /// The callable or the descriptor resolving to one
    pub target: BenchTarget,
    /// Parameter value for iterations (stateless) or setup (stateful)
    pub params: Option<BenchArgs>,
}

/// Exactly one way to reach the callable: in-process, or an id the worker
/// re-resolves inside the isolated process. The enum *is* the invariant.
#[derive(Debug, Clone)]
pub enum BenchTarget {
    /// In-process callable; runs with the in-process collector.
    Callable(BenchRunnable),
    /// Registry descriptor; runs in a worker child.
    Registered {
        /// Benchmark id to resolve
        id: String,
        /// Setup id overriding the benchmark's own setup
        setup: Option<String>,
    },
}

impl BenchmarkSpec {
    /// Spec for an in-process callable.
    pub fn callable(name: impl Into<String>, runnable: BenchRunnable) -> Self {
        Self {
            name: name.into(),
            target: BenchTarget::Callable(runnable),
            params: None,
        }
    }

    /// Spec for a registered benchmark, to be re-resolved in a worker.
    pub fn registered(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: BenchTarget::Registered {
                id: id.into(),
                setup: None,
            },
            params: None,
        }
    }

    /// Attach a parameter value.
    pub fn with_params(mut self, params: BenchArgs) -> Self {
        self.params = Some(params);
        self
    }
}
