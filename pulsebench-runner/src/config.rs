//! Configuration loading from pulse.toml
//!
//! Configuration lives in a `pulse.toml` at the project root, discovered
//! by walking up from the current directory. It feeds `RunnerOptions`
//! defaults; the embedding application's own argument handling can still
//! override anything.

use pulsebench_ipc::RunnerOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level pulse.toml contents.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PulseConfig {
    /// Collector defaults
    #[serde(default)]
    pub runner: RunnerSection,
    /// Worker child settings
    #[serde(default)]
    pub worker: WorkerSection,
    /// Result persistence
    #[serde(default)]
    pub output: OutputSection,
}

/// `[runner]` section: collector defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSection {
    /// Measurement budget (e.g., "500ms", "2s")
    #[serde(default = "default_max_time")]
    pub max_time: String,
    /// Iteration cap
    #[serde(default)]
    pub max_iterations: Option<u64>,
    /// Warmup iterations before measurement
    #[serde(default = "default_warmup_iterations")]
    pub warmup_iterations: u64,
    /// Skip the post-warmup settle window
    #[serde(default)]
    pub skip_settle: bool,
    /// Enable the adaptive controller
    #[serde(default)]
    pub adaptive: bool,
    /// Minimum time before the adaptive fallback confidence applies
    #[serde(default = "default_min_time")]
    pub min_time: String,
    /// Adaptive target confidence (0-100)
    #[serde(default = "default_target_confidence")]
    pub target_confidence: f64,
    /// Batches per benchmark, alternated to cancel drift
    #[serde(default = "default_batches")]
    pub batches: u32,
    /// Capture GC trace lines from worker children
    #[serde(default)]
    pub gc_stats: bool,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            max_time: default_max_time(),
            max_iterations: None,
            warmup_iterations: default_warmup_iterations(),
            skip_settle: false,
            adaptive: false,
            min_time: default_min_time(),
            target_confidence: default_target_confidence(),
            batches: default_batches(),
            gc_stats: false,
        }
    }
}

fn default_max_time() -> String {
    "2s".to_string()
}
fn default_warmup_iterations() -> u64 {
    10
}
fn default_min_time() -> String {
    "0ms".to_string()
}
fn default_target_confidence() -> f64 {
    95.0
}
fn default_batches() -> u32 {
    1
}

/// `[worker]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSection {
    /// Reply deadline per benchmark (e.g., "60s")
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
        }
    }
}

fn default_timeout() -> String {
    "60s".to_string()
}

impl WorkerSection {
    /// Parsed reply deadline.
    pub fn timeout(&self) -> anyhow::Result<Duration> {
        let ms = PulseConfig::parse_duration_ms(&self.timeout)?;
        Ok(Duration::from_secs_f64(ms / 1000.0))
    }
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    /// Directory for saved result records
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Save records as JSON after each run
    #[serde(default)]
    pub save_results: bool,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_results: false,
        }
    }
}

fn default_output_dir() -> String {
    "target/pulsebench".to_string()
}

impl PulseConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&content)?)
    }

    /// Discover pulse.toml by walking up from the current directory.
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let candidate = dir.join("pulse.toml");
            if candidate.exists() {
                return Self::load(&candidate).ok();
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Resolve the config into collector options.
    pub fn to_options(&self) -> anyhow::Result<RunnerOptions> {
        Ok(RunnerOptions {
            max_time_ms: Some(Self::parse_duration_ms(&self.runner.max_time)?),
            max_iterations: self.runner.max_iterations,
            warmup_iterations: self.runner.warmup_iterations,
            skip_settle: self.runner.skip_settle,
            adaptive: self.runner.adaptive,
            min_time_ms: Self::parse_duration_ms(&self.runner.min_time)?,
            target_confidence: self.runner.target_confidence,
            batches: self.runner.batches,
            gc_stats: self.runner.gc_stats,
            ..Default::default()
        })
    }

    /// Parse a duration string ("500ms", "2s", "1.5m") into milliseconds.
    pub fn parse_duration_ms(s: &str) -> anyhow::Result<f64> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("empty duration string"));
        }

        let (number, unit) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "ms"));

        let value: f64 = number
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid duration number: {number}"))?;

        let multiplier = match unit.to_lowercase().as_str() {
            "ns" => 1e-6,
            "us" => 1e-3,
            "ms" | "" => 1.0,
            "s" => 1e3,
            "m" | "min" => 60e3,
            other => return Err(anyhow::anyhow!("unknown duration unit: {other}")),
        };

        Ok(value * multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PulseConfig::default();
        assert_eq!(config.runner.max_time, "2s");
        assert_eq!(config.runner.batches, 1);
        assert_eq!(config.worker.timeout, "60s");
        assert!(!config.runner.adaptive);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(PulseConfig::parse_duration_ms("500ms").unwrap(), 500.0);
        assert_eq!(PulseConfig::parse_duration_ms("2s").unwrap(), 2000.0);
        assert_eq!(PulseConfig::parse_duration_ms("100us").unwrap(), 0.1);
        assert_eq!(PulseConfig::parse_duration_ms("1m").unwrap(), 60_000.0);
        assert_eq!(PulseConfig::parse_duration_ms("1.5s").unwrap(), 1500.0);
        assert_eq!(PulseConfig::parse_duration_ms("250").unwrap(), 250.0);
        assert!(PulseConfig::parse_duration_ms("oops").is_err());
        assert!(PulseConfig::parse_duration_ms("5fortnights").is_err());
    }

    #[test]
    fn test_parse_toml_with_partial_sections() {
        let toml_str = r#"
            [runner]
            max_time = "750ms"
            adaptive = true
            target_confidence = 99.0
        "#;

        let config: PulseConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.runner.max_time, "750ms");
        assert!(config.runner.adaptive);
        // Untouched sections keep defaults
        assert_eq!(config.worker.timeout, "60s");
        assert_eq!(config.output.directory, "target/pulsebench");
    }

    #[test]
    fn test_to_options() {
        let toml_str = r#"
            [runner]
            max_time = "300ms"
            warmup_iterations = 5
            batches = 2
        "#;
        let config: PulseConfig = toml::from_str(toml_str).unwrap();
        let options = config.to_options().unwrap();

        assert_eq!(options.max_time_ms, Some(300.0));
        assert_eq!(options.warmup_iterations, 5);
        assert_eq!(options.batches, 2);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_worker_timeout_parse() {
        let section = WorkerSection {
            timeout: "90s".to_string(),
        };
        assert_eq!(section.timeout().unwrap(), Duration::from_secs(90));
    }
}
