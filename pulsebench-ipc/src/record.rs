//! Measured Result Record
//!
//! The canonical record a benchmark produces. Reporters and exporters
//! consume it through serde; the worker ships it to the parent through
//! rkyv. Shapes only — summarization and merging live with the collector.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

/// Per-percentile timing summary, in milliseconds.
///
/// The adaptive-only fields (`p25`, `p95`, `cv`, `mad`, `outlier_rate`) are
/// populated when the run went through the adaptive controller.
#[derive(Debug, Clone, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct TimeStats {
    /// Fastest sample
    pub min: f64,
    /// Slowest sample
    pub max: f64,
    /// Arithmetic mean
    pub avg: f64,
    /// Median
    pub p50: f64,
    /// 75th percentile
    pub p75: f64,
    /// 99th percentile
    pub p99: f64,
    /// 99.9th percentile
    pub p999: f64,
    /// 25th percentile (adaptive runs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p25: Option<f64>,
    /// 95th percentile (adaptive runs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p95: Option<f64>,
    /// Coefficient of variation (adaptive runs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv: Option<f64>,
    /// Median absolute deviation (adaptive runs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mad: Option<f64>,
    /// Fraction of samples outside Tukey's fence (adaptive runs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outlier_rate: Option<f64>,
}

/// A scheduled pause injected during measurement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct PausePoint {
    /// Index of the sample after which the pause fired
    pub sample_index: u64,
    /// Pause length in milliseconds
    pub duration_ms: f64,
}

/// Outcome of the adaptive controller's convergence check.
///
/// Written once at the end of the adaptive loop and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct Convergence {
    /// Whether both stability dimensions settled below the drift threshold
    pub converged: bool,
    /// Confidence in `0..=100`
    pub confidence: f64,
    /// Human-readable explanation of the stop decision
    pub reason: String,
}

/// Aggregated garbage-collection counters parsed from the worker child's
/// trace stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct GcStats {
    /// Young-generation collections (scavenge / minor-ms)
    pub scavenges: u32,
    /// Full mark-compact collections
    pub mark_compacts: u32,
    /// Total bytes reclaimed across events
    pub total_collected: u64,
    /// Total pause time across events, in ms
    pub gc_pause_time: f64,
    /// Total bytes allocated; present iff any event carried the field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_allocated: Option<u64>,
    /// Total bytes promoted; present iff any event carried `allocated`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_promoted: Option<u64>,
    /// Total bytes survived; present iff any event carried `allocated`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_survived: Option<u64>,
}

/// The canonical result record for one benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct MeasuredResults {
    /// Stable display name
    pub name: String,
    /// Per-iteration durations in ms, insertion-ordered; never empty
    pub samples: Vec<f64>,
    /// Timing summary over `samples`
    pub time: TimeStats,
    /// Durations of warmup iterations (when warmup ran)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warmup_samples: Option<Vec<f64>>,
    /// Used-heap bytes captured after each sample
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heap_samples: Option<Vec<u64>>,
    /// Wall-clock microseconds, one per sample
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Vec<u64>>,
    /// Optimization-tier codes, one per sample (when the runtime exposes
    /// tier status and `trace_opt` was set)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opt_samples: Option<Vec<i8>>,
    /// Scheduled pauses that fired during measurement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_points: Option<Vec<PausePoint>>,
    /// GC counters aggregated from the worker's trace stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gc_stats: Option<GcStats>,
    /// Opaque heap-sampling profile (JSON) from an external profiler
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heap_profile: Option<String>,
    /// Adaptive convergence outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convergence: Option<Convergence>,
    /// Total measurement wall time in seconds (pauses excluded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_time_s: Option<f64>,
    /// Amortized heap growth in KB per sample
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heap_growth_kb: Option<f64>,
}

impl MeasuredResults {
    /// Check the record invariants consumers are allowed to assume.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.samples.is_empty() {
            return Err(format!("'{}': samples are empty", self.name));
        }

        let t = &self.time;
        let ordered = [
            ("min", t.min),
            ("p25", t.p25.unwrap_or(t.min)),
            ("p50", t.p50),
            ("p75", t.p75),
            ("p95", t.p95.unwrap_or(t.p75)),
            ("p99", t.p99),
            ("p999", t.p999),
            ("max", t.max),
        ];
        for pair in ordered.windows(2) {
            if pair[0].1 > pair[1].1 {
                return Err(format!(
                    "'{}': {} ({}) > {} ({})",
                    self.name, pair[0].0, pair[0].1, pair[1].0, pair[1].1
                ));
            }
        }

        if let Some(timestamps) = &self.timestamps {
            if timestamps.len() != self.samples.len() {
                return Err(format!(
                    "'{}': {} timestamps for {} samples",
                    self.name,
                    timestamps.len(),
                    self.samples.len()
                ));
            }
        }

        if let Some(pause_points) = &self.pause_points {
            for p in pause_points {
                if p.sample_index >= self.samples.len() as u64 {
                    return Err(format!(
                        "'{}': pause at sample {} beyond {} samples",
                        self.name,
                        p.sample_index,
                        self.samples.len()
                    ));
                }
            }
        }

        Ok(())
    }
}
