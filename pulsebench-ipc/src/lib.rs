#![warn(missing_docs)]
//! PulseBench IPC Protocol
//!
//! Binary protocol for parent-child communication plus the shared data
//! model both sides exchange. Messages are length-prefixed rkyv frames:
//! the parent sends exactly one [`RunMessage`], the child replies with
//! exactly one [`WorkerReply`] before exiting.
//!
//! The [`MeasuredResults`] record defined here is also the consumer
//! contract for external reporters (via serde).

mod framing;
mod messages;
mod options;
mod record;

pub use framing::{FrameError, FrameReader, FrameWriter, MAX_FRAME_SIZE};
pub use messages::{RunMessage, WireSpec, WorkerReply};
pub use options::{RunnerOptions, SETTLE_MS};
pub use record::{Convergence, GcStats, MeasuredResults, PausePoint, TimeStats};

/// Command-line flag that switches a benchmark binary into worker mode
pub const WORKER_FLAG: &str = "--pulse-worker";

/// Environment variable carrying the IPC fd pair as `"<read_fd>,<write_fd>"`
pub const IPC_FD_ENV: &str = "PULSE_IPC_FD";
