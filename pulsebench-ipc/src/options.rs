//! Runner Options
//!
//! Every tunable the sample collection loop and adaptive controller
//! consume. The struct crosses the IPC boundary unchanged, so the worker
//! child measures with exactly the options the parent resolved.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

/// Fixed settle window after warmup, in milliseconds.
///
/// Worst case for tiered-compilation stabilization on managed runtimes;
/// static-compile targets can opt out via `skip_settle`.
pub const SETTLE_MS: u64 = 1000;

/// Tunables consumed by the sample collector.
#[derive(Debug, Clone, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
#[serde(default)]
pub struct RunnerOptions {
    /// Soft wall-clock budget for the measurement phase, in ms.
    pub max_time_ms: Option<f64>,
    /// Hard iteration cap; either limit (or both) stops the loop.
    pub max_iterations: Option<u64>,
    /// Unmeasured iterations before measurement; durations are still
    /// recorded into `warmup_samples`.
    pub warmup_iterations: u64,
    /// Skip the warmup phase entirely.
    pub skip_warmup: bool,
    /// Skip the GC-hint + settle-sleep sequence after warmup.
    pub skip_settle: bool,
    /// Force a GC hint after every iteration (allocation isolation).
    pub collect: bool,
    /// First iteration at which a scheduled pause fires.
    pub pause_first: Option<u64>,
    /// Fire a pause every this many iterations after `pause_first`.
    pub pause_interval: Option<u64>,
    /// Duration of each scheduled pause, in ms; pause time is excluded
    /// from the `max_time_ms` budget.
    pub pause_duration_ms: f64,
    /// Record per-sample optimization-tier status when the runtime
    /// exposes one.
    pub trace_opt: bool,
    /// Capture GC trace lines from the worker child.
    pub gc_stats: bool,
    /// Wrap collection with the adaptive controller.
    pub adaptive: bool,
    /// Adaptive: minimum elapsed ms before the fallback confidence can
    /// stop the run.
    pub min_time_ms: f64,
    /// Adaptive: required confidence in `0..=100` to stop early.
    pub target_confidence: f64,
    /// Split the time budget across this many alternating batches.
    pub batches: u32,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            max_time_ms: None,
            max_iterations: None,
            warmup_iterations: 10,
            skip_warmup: false,
            skip_settle: false,
            collect: false,
            pause_first: None,
            pause_interval: None,
            pause_duration_ms: 0.0,
            trace_opt: false,
            gc_stats: false,
            adaptive: false,
            min_time_ms: 0.0,
            target_confidence: 95.0,
            batches: 1,
        }
    }
}

impl RunnerOptions {
    /// The time budget, treating 0 and negative values as unset.
    pub fn effective_max_time_ms(&self) -> Option<f64> {
        self.max_time_ms.filter(|&t| t > 0.0)
    }

    /// The iteration cap, treating 0 as unset.
    pub fn effective_max_iterations(&self) -> Option<u64> {
        self.max_iterations.filter(|&n| n > 0)
    }

    /// Estimated iteration count used to pre-allocate sample arrays:
    /// `max(max_iterations, ceil(max_time_ms / 0.1))`.
    pub fn estimated_capacity(&self) -> usize {
        let by_iterations = self.effective_max_iterations().unwrap_or(0);
        let by_time = self
            .effective_max_time_ms()
            .map(|t| (t / 0.1).ceil() as u64)
            .unwrap_or(0);
        by_iterations.max(by_time).max(1) as usize
    }

    /// Validate option combinations, returning a description of the first
    /// problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.effective_max_time_ms().is_none() && self.effective_max_iterations().is_none() {
            return Err("neither max_time_ms nor max_iterations is set".to_string());
        }
        if !(0.0..=100.0).contains(&self.target_confidence) {
            return Err(format!(
                "target_confidence must be in 0..=100, got {}",
                self.target_confidence
            ));
        }
        if self.pause_duration_ms < 0.0 {
            return Err(format!(
                "pause_duration_ms must be >= 0, got {}",
                self.pause_duration_ms
            ));
        }
        if self.batches == 0 {
            return Err("batches must be >= 1".to_string());
        }
        if self.adaptive && self.effective_max_time_ms().is_none() {
            return Err("adaptive mode requires max_time_ms".to_string());
        }
        Ok(())
    }
}
