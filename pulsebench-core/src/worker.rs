//! Worker Process Entry Point
//!
//! Child side of the orchestrator-worker architecture. The child reads one
//! `RunMessage`, runs the benchmark it names, and writes exactly one
//! `WorkerReply` before exiting 0. Any other exit is treated as a crash by
//! the parent.
//!
//! On Unix the IPC transport is an inherited fd pair published via the
//! `PULSE_IPC_FD` env var, keeping stdout free for runtime trace lines;
//! stdin/stdout is the fallback. A SIGTERM handler requests graceful
//! shutdown, and a watchdog thread hard-terminates the process after five
//! minutes no matter what.

use crate::adaptive::collect_adaptive;
use crate::collector::{Work, collect_prepared};
use crate::error::BenchError;
use crate::measure::pin_to_cpu;
use crate::registry::{BenchArgs, SetupKind, find_benchmark, find_case_loader, find_setup};
use crate::runtime::{NativeRuntime, RuntimeHooks};
use pulsebench_ipc::{
    FrameReader, FrameWriter, IPC_FD_ENV, RunMessage, RunnerOptions, WireSpec, WorkerReply,
};
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(unix)]
use std::os::unix::io::FromRawFd;

/// The child self-terminates after this many seconds regardless of state.
pub const WORKER_LIFETIME_SECS: u64 = 300;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Whether SIGTERM asked this worker to shut down.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

#[cfg(unix)]
fn install_sigterm_handler() {
    // Handler only touches an atomic, so it is async-signal-safe.
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = sigterm_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
    }
}

#[cfg(unix)]
extern "C" fn sigterm_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

#[cfg(not(unix))]
fn install_sigterm_handler() {}

enum IpcTransport {
    #[cfg(unix)]
    Fds { read_fd: i32, write_fd: i32 },
    Stdio,
}

fn detect_transport() -> IpcTransport {
    #[cfg(unix)]
    if let Ok(val) = std::env::var(IPC_FD_ENV) {
        let parts: Vec<&str> = val.split(',').collect();
        if parts.len() == 2 {
            if let (Ok(r), Ok(w)) = (parts[0].parse::<i32>(), parts[1].parse::<i32>()) {
                return IpcTransport::Fds {
                    read_fd: r,
                    write_fd: w,
                };
            }
        }
        eprintln!("pulsebench: invalid {IPC_FD_ENV}={val:?}, falling back to stdio");
    }
    IpcTransport::Stdio
}

/// Worker main: wires up the IPC channel and serves exactly one run.
pub struct WorkerMain {
    reader: FrameReader<Box<dyn std::io::Read>>,
    writer: FrameWriter<Box<dyn std::io::Write>>,
}

impl WorkerMain {
    /// Create a worker over the inherited fd pair, or stdin/stdout.
    pub fn new() -> Self {
        match detect_transport() {
            #[cfg(unix)]
            IpcTransport::Fds { read_fd, write_fd } => {
                let read_file = unsafe { std::fs::File::from_raw_fd(read_fd) };
                let write_file = unsafe { std::fs::File::from_raw_fd(write_fd) };
                Self {
                    reader: FrameReader::new(Box::new(read_file) as Box<dyn std::io::Read>),
                    writer: FrameWriter::new(Box::new(write_file) as Box<dyn std::io::Write>),
                }
            }
            IpcTransport::Stdio => Self {
                reader: FrameReader::new(Box::new(std::io::stdin()) as Box<dyn std::io::Read>),
                writer: FrameWriter::new(Box::new(std::io::stdout()) as Box<dyn std::io::Write>),
            },
        }
    }

    /// Serve one run request and return the process exit code.
    ///
    /// 0 only when a reply was delivered.
    pub fn run(&mut self) -> i32 {
        install_sigterm_handler();
        spawn_lifetime_watchdog();
        let _ = pin_to_cpu(0);

        let message: RunMessage = match self.reader.read() {
            Ok(m) => m,
            Err(e) => {
                eprintln!("pulsebench worker: failed to read run request: {e}");
                return 2;
            }
        };

        let reply = execute(&message);
        match self.writer.write(&reply) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("pulsebench worker: failed to deliver reply: {e}");
                2
            }
        }
    }
}

impl Default for WorkerMain {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_lifetime_watchdog() {
    std::thread::spawn(|| {
        std::thread::sleep(std::time::Duration::from_secs(WORKER_LIFETIME_SECS));
        eprintln!("pulsebench worker: lifetime exceeded, terminating");
        std::process::exit(3);
    });
}

/// Resolve and run the benchmark the message names.
fn execute(message: &RunMessage) -> WorkerReply {
    let mut hooks = NativeRuntime;
    match run_one(&message.spec, &message.runner_name, &message.options, message.params.as_deref(), &mut hooks) {
        Ok(mut results) => {
            let heap_profile = hooks.take_heap_profile();
            for r in &mut results {
                if r.heap_profile.is_none() {
                    r.heap_profile = heap_profile.clone();
                }
            }
            WorkerReply::Result {
                results,
                heap_profile,
            }
        }
        Err(e) => {
            let stack = match &e {
                BenchError::BenchmarkFailed { stack, .. } => stack.clone(),
                _ => None,
            };
            WorkerReply::Error {
                error: e.to_string(),
                stack,
            }
        }
    }
}

fn run_one(
    spec: &WireSpec,
    runner_name: &str,
    options: &RunnerOptions,
    params_json: Option<&str>,
    hooks: &mut dyn RuntimeHooks,
) -> Result<Vec<pulsebench_ipc::MeasuredResults>, BenchError> {
    options.validate().map_err(BenchError::ConfigInvalid)?;

    let bench_id = spec
        .bench_id
        .as_deref()
        .or(spec.variant_id.as_deref())
        .ok_or_else(|| {
            BenchError::ConfigInvalid("run request names no benchmark or variant".to_string())
        })?;

    let bench = find_benchmark(bench_id).ok_or_else(|| BenchError::BenchmarkFailed {
        name: spec.name.clone(),
        message: format!("benchmark not registered: {bench_id}"),
        stack: None,
    })?;

    let params = resolve_params(spec, params_json)?;
    let setup_override = resolve_setup_override(spec)?;

    // The user callable may panic; the panic becomes the error reply, with
    // whatever backtrace the runtime captured.
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut work = Work::prepare(&bench.runnable, params, setup_override)?;
        if runner_name == "adaptive" || options.adaptive {
            collect_adaptive(&spec.name, &mut work, options, hooks)
        } else {
            collect_prepared(&spec.name, &mut work, options, hooks)
        }
    }));

    match outcome {
        Ok(result) => result.map(|r| vec![r]),
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };

            let backtrace = std::backtrace::Backtrace::capture();
            let stack = match backtrace.status() {
                std::backtrace::BacktraceStatus::Captured => Some(backtrace.to_string()),
                _ => None,
            };

            Err(BenchError::BenchmarkFailed {
                name: spec.name.clone(),
                message,
                stack,
            })
        }
    }
}

/// Parameter resolution order: inline case data, then a registered case
/// loader, then the request's own params.
fn resolve_params(
    spec: &WireSpec,
    params_json: Option<&str>,
) -> Result<Option<BenchArgs>, BenchError> {
    if let Some(raw) = &spec.case_data {
        let value = serde_json::from_str(raw).map_err(|e| {
            BenchError::ConfigInvalid(format!("malformed case_data for '{}': {e}", spec.name))
        })?;
        return Ok(Some(value));
    }

    if let Some(loader_id) = &spec.case_loader {
        let loader = find_case_loader(loader_id).ok_or_else(|| {
            BenchError::ConfigInvalid(format!("case loader not registered: {loader_id}"))
        })?;
        let case_id = spec.case_id.as_deref().ok_or_else(|| {
            BenchError::ConfigInvalid("case_loader given without case_id".to_string())
        })?;
        return Ok(Some((loader.load)(case_id)));
    }

    match params_json {
        Some(raw) => {
            let value = serde_json::from_str(raw).map_err(|e| {
                BenchError::ConfigInvalid(format!("malformed params for '{}': {e}", spec.name))
            })?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

fn resolve_setup_override(spec: &WireSpec) -> Result<Option<SetupKind>, BenchError> {
    match &spec.setup_id {
        Some(id) => {
            let def = find_setup(id).ok_or_else(|| {
                BenchError::ConfigInvalid(format!("setup not registered: {id}"))
            })?;
            Ok(Some(def.setup))
        }
        None => Ok(None),
    }
}
