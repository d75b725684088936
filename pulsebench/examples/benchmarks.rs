//! Example benchmark binary.
//!
//! Build and run with:
//!
//! ```sh
//! cargo run --release --example benchmarks
//! ```
//!
//! The same binary serves as its own worker: the suite runner re-spawns it
//! with the worker flag and each benchmark runs in a fresh child process.

use pulsebench::BenchState;
use pulsebench::prelude::*;

// Opt in to heap tracking so heap_samples and heap growth are real.
#[global_allocator]
static ALLOC: pulsebench::TrackingAllocator = pulsebench::TrackingAllocator;

fn fib(n: u64) -> u64 {
    if n < 2 { n } else { fib(n - 1) + fib(n - 2) }
}

fn bench_fib(_: &BenchArgs) {
    std::hint::black_box(fib(std::hint::black_box(18)));
}

fn bench_vec_push(args: &BenchArgs) {
    let n = args.get("n").and_then(|v| v.as_u64()).unwrap_or(1_000) as usize;
    let mut v = Vec::new();
    for i in 0..n {
        v.push(std::hint::black_box(i));
    }
    std::hint::black_box(v);
}

fn sorted_haystack(_: BenchArgs) -> BenchState {
    Box::new((0..10_000u64).collect::<Vec<u64>>())
}

fn bench_binary_search(state: &BenchState) {
    let haystack = state
        .downcast_ref::<Vec<u64>>()
        .expect("state built by sorted_haystack");
    std::hint::black_box(haystack.binary_search(std::hint::black_box(&7_777)).ok());
}

pulsebench::register_benchmark! {
    id: "fib_18", name: "recursive fibonacci(18)", group: "demo", run: bench_fib,
}

pulsebench::register_benchmark! {
    id: "vec_push", name: "vec push loop", group: "demo", run: bench_vec_push,
}

pulsebench::register_benchmark! {
    id: "binary_search", name: "binary search in 10k", group: "demo",
    setup: sorted_haystack, run: bench_binary_search,
}

pulsebench::register_group! {
    id: "demo", description: "demo benchmarks", baseline: "fib_18",
}

fn main() -> anyhow::Result<()> {
    // Must come first: worker children re-enter through main.
    pulsebench::worker_mode_or_continue();
    pulsebench::init_logging(false);

    let options = RunnerOptions {
        max_time_ms: Some(500.0),
        warmup_iterations: 20,
        // Native code has no tiered compiler to wait out
        skip_settle: true,
        adaptive: true,
        target_confidence: 95.0,
        ..Default::default()
    };

    let suite = BenchSuite::from_registry("demo-suite");
    let report = pulsebench::run_suite(&suite, &options, true, None)?;

    for group in &report.groups {
        println!("group {}", group.name);
        for (result, diff) in group.results.iter().zip(&group.comparisons) {
            print!(
                "  {:<28} p50 {:>9.4} ms  p99 {:>9.4} ms",
                result.name, result.time.p50, result.time.p99
            );
            if let Some(diff) = diff {
                print!("  {:+.1}% vs baseline ({})", diff.percent, diff.direction);
            }
            println!();
        }
    }

    pulsebench::save_results("target/pulsebench/demo.json", &report.groups[0].results)?;
    Ok(())
}
