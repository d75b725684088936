//! Error Taxonomy
//!
//! Every failure surfaced to callers is one of these kinds. Only malformed
//! GC trace lines are recovered locally (by dropping the line); everything
//! here propagates.

use thiserror::Error;

/// Failures surfaced by the harness.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Conflicting or missing options; no work was performed.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The measurement loop produced zero samples.
    #[error("benchmark '{name}' produced no samples")]
    EmptySamples {
        /// Benchmark that produced nothing
        name: String,
    },

    /// The user callable raised inside the worker.
    #[error("benchmark '{name}' failed: {message}")]
    BenchmarkFailed {
        /// Benchmark that failed
        name: String,
        /// Exact message of the in-child error
        message: String,
        /// Stack captured at the failure site, when available
        stack: Option<String>,
    },

    /// No reply from the worker within the hard deadline.
    #[error("benchmark '{name}' timed out after {timeout_s}s")]
    BenchmarkTimeout {
        /// Benchmark that timed out
        name: String,
        /// Deadline that expired, in seconds
        timeout_s: u64,
    },

    /// The worker child exited before sending a result.
    #[error("worker for '{name}' crashed (exit code {exit_code:?}): {stderr_tail}")]
    WorkerCrashed {
        /// Benchmark whose worker died
        name: String,
        /// Exit code, if the child exited rather than being signaled
        exit_code: Option<i32>,
        /// Tail of the child's stderr
        stderr_tail: String,
    },

    /// A filter expression selected nothing.
    #[error("filter '{filter}' matched no benchmarks, cases, or variants")]
    FilterNoMatch {
        /// The offending filter
        filter: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_names() {
        let err = BenchError::EmptySamples {
            name: "hash_u64".to_string(),
        };
        assert!(err.to_string().contains("hash_u64"));

        let err = BenchError::BenchmarkTimeout {
            name: "slow_io".to_string(),
            timeout_s: 60,
        };
        assert!(err.to_string().contains("60"));
    }

    #[test]
    fn test_crash_report_includes_stderr() {
        let err = BenchError::WorkerCrashed {
            name: "b".to_string(),
            exit_code: Some(101),
            stderr_tail: "thread 'main' panicked".to_string(),
        };
        assert!(err.to_string().contains("panicked"));
    }
}
