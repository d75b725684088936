//! Worker Orchestrator
//!
//! Runs a single benchmark in an isolated child process. Isolation is the
//! default execution path: in-process runs cross-contaminate code caches,
//! allocation arenas and runtime statistics between benchmarks.
//!
//! Channel layout per child:
//! - stdin: framed `RunMessage` from the parent
//! - fd 3:  framed `WorkerReply` back to the parent (via `PULSE_IPC_FD`)
//! - stdout: free for runtime trace lines; the parent line-buffers it,
//!   feeds every line through the GC parser, and re-emits the rest
//! - stderr: echoed through, with a tail kept for crash reports

use crate::gctrace::{GcEvent, aggregate_gc_stats, parse_gc_line};
use pulsebench_core::BenchError;
use pulsebench_ipc::{
    FrameError, FrameReader, FrameWriter, GcStats, IPC_FD_ENV, MeasuredResults, RunMessage,
    WORKER_FLAG, WorkerReply,
};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::unix::io::FromRawFd;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Hard deadline for a worker reply, measured from request send.
pub const WORKER_TIMEOUT: Duration = Duration::from_secs(60);

/// The fd number the child writes its reply on.
const CHILD_REPLY_FD: i32 = 3;

/// How much of the child's stderr is kept for crash reports.
const STDERR_TAIL_BYTES: usize = 4096;

#[derive(Debug)]
enum PollOutcome {
    Data,
    TimedOut,
    Closed,
    Failed(std::io::Error),
}

/// Wait for readable data on `fd`, up to `timeout_ms`.
fn wait_for_data(fd: i32, timeout_ms: i32) -> PollOutcome {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    let result = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };

    if result < 0 {
        PollOutcome::Failed(std::io::Error::last_os_error())
    } else if result == 0 {
        PollOutcome::TimedOut
    } else if pollfd.revents & libc::POLLIN != 0 {
        PollOutcome::Data
    } else if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        PollOutcome::Closed
    } else {
        PollOutcome::TimedOut
    }
}

fn set_cloexec(fd: i32) {
    unsafe {
        libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
    }
}

/// Handle on a spawned worker child.
pub struct WorkerHandle {
    name: String,
    child: Child,
    reader: FrameReader<File>,
    writer: FrameWriter<ChildStdin>,
    reply_fd: i32,
    timeout: Duration,
    gc_events: Arc<Mutex<Vec<GcEvent>>>,
    stderr_tail: Arc<Mutex<String>>,
    pumps: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawn a worker from the current executable.
    pub fn spawn(name: &str, timeout: Duration, gc_stats: bool) -> Result<Self, BenchError> {
        let binary = std::env::current_exe()
            .map_err(|e| spawn_failure(name, format!("cannot locate current executable: {e}")))?;
        Self::spawn_binary(name, &binary, timeout, gc_stats)
    }

    /// Spawn a worker from an arbitrary benchmark binary (matrix variant
    /// directories and baseline directories use this).
    pub fn spawn_binary(
        name: &str,
        binary: &Path,
        timeout: Duration,
        gc_stats: bool,
    ) -> Result<Self, BenchError> {
        // Dedicated reply pipe so stdout stays a text stream.
        let mut fds = [0i32; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(spawn_failure(
                name,
                format!("pipe: {}", std::io::Error::last_os_error()),
            ));
        }
        let (parent_read, child_write) = (fds[0], fds[1]);
        set_cloexec(parent_read);
        set_cloexec(child_write);

        let mut command = Command::new(binary);
        command
            .arg(WORKER_FLAG)
            .env(IPC_FD_ENV, format!("0,{CHILD_REPLY_FD}"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if gc_stats {
            // Runtime flag: embedded runtimes emit their name-value GC
            // trace to stdout when they see this.
            command.env("PULSE_GC_TRACE", "1");
        }

        // dup2 clears CLOEXEC on the duplicate, so exactly fd 3 survives
        // the exec.
        unsafe {
            command.pre_exec(move || {
                if libc::dup2(child_write, CHILD_REPLY_FD) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                unsafe {
                    libc::close(parent_read);
                    libc::close(child_write);
                }
                return Err(spawn_failure(
                    name,
                    format!("failed to spawn {}: {e}", binary.display()),
                ));
            }
        };
        unsafe {
            libc::close(child_write);
        }

        let stdin = child.stdin.take().expect("stdin was requested as piped");
        let stdout = child.stdout.take().expect("stdout was requested as piped");
        let stderr = child.stderr.take().expect("stderr was requested as piped");

        let gc_events: Arc<Mutex<Vec<GcEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let stderr_tail = Arc::new(Mutex::new(String::new()));

        let events = Arc::clone(&gc_events);
        let stdout_pump = std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                match parse_gc_line(&line) {
                    Some(event) => {
                        if let Ok(mut events) = events.lock() {
                            events.push(event);
                        }
                    }
                    None => println!("{line}"),
                }
            }
        });

        let tail = Arc::clone(&stderr_tail);
        let stderr_pump = std::thread::spawn(move || {
            for line in BufReader::new(stderr).lines() {
                let Ok(line) = line else { break };
                eprintln!("{line}");
                if let Ok(mut tail) = tail.lock() {
                    tail.push_str(&line);
                    tail.push('\n');
                    if tail.len() > STDERR_TAIL_BYTES {
                        let cut = tail.len() - STDERR_TAIL_BYTES;
                        tail.drain(..cut);
                    }
                }
            }
        });

        Ok(Self {
            name: name.to_string(),
            child,
            reader: FrameReader::new(unsafe { File::from_raw_fd(parent_read) }),
            writer: FrameWriter::new(stdin),
            reply_fd: parent_read,
            timeout,
            gc_events,
            stderr_tail,
            pumps: vec![stdout_pump, stderr_pump],
        })
    }

    /// Send the run request and await the single reply.
    ///
    /// On deadline the child gets SIGTERM and the run fails with
    /// `BenchmarkTimeout`. A child death without a reply becomes
    /// `WorkerCrashed` with the exit code and the stderr tail.
    pub fn run(&mut self, message: &RunMessage) -> Result<Vec<MeasuredResults>, BenchError> {
        if let Err(e) = self.writer.write(message) {
            return Err(self.crashed(format!("failed to send run request: {e}")));
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            if !self.reader.has_buffered_data() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    self.terminate();
                    return Err(BenchError::BenchmarkTimeout {
                        name: self.name.clone(),
                        timeout_s: self.timeout.as_secs(),
                    });
                }

                let slice = remaining.min(Duration::from_millis(100));
                match wait_for_data(self.reply_fd, slice.as_millis() as i32) {
                    PollOutcome::Data => {}
                    PollOutcome::TimedOut => {
                        if !self.is_alive() {
                            return Err(self.crashed_with_exit());
                        }
                        continue;
                    }
                    PollOutcome::Closed => return Err(self.crashed_with_exit()),
                    PollOutcome::Failed(e) => {
                        return Err(self.crashed(format!("reply pipe error: {e}")));
                    }
                }
            }

            let reply: WorkerReply = match self.reader.read() {
                Ok(reply) => reply,
                Err(FrameError::EndOfStream) => return Err(self.crashed_with_exit()),
                Err(e) => return Err(self.crashed(format!("ipc error: {e}"))),
            };

            return match reply {
                WorkerReply::Result {
                    mut results,
                    heap_profile,
                } => {
                    for result in &mut results {
                        if result.heap_profile.is_none() {
                            result.heap_profile = heap_profile.clone();
                        }
                    }
                    Ok(results)
                }
                WorkerReply::Error { error, stack } => Err(BenchError::BenchmarkFailed {
                    name: self.name.clone(),
                    message: error,
                    stack,
                }),
            };
        }
    }

    /// Wait for the child to exit, drain its streams, and aggregate the GC
    /// events seen on stdout.
    pub fn finish(mut self) -> GcStats {
        let _ = self.child.wait();
        for pump in self.pumps.drain(..) {
            let _ = pump.join();
        }
        let events = self
            .gc_events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default();
        aggregate_gc_stats(&events)
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// SIGTERM first, then a short grace period, then SIGKILL.
    fn terminate(&mut self) {
        unsafe {
            libc::kill(self.child.id() as i32, libc::SIGTERM);
        }
        for _ in 0..50 {
            if !self.is_alive() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        if self.is_alive() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }

    fn stderr_tail(&self) -> String {
        self.stderr_tail
            .lock()
            .map(|tail| tail.clone())
            .unwrap_or_default()
    }

    fn crashed(&self, detail: String) -> BenchError {
        let mut tail = self.stderr_tail();
        if tail.is_empty() {
            tail = detail;
        } else {
            tail = format!("{detail}\n{tail}");
        }
        BenchError::WorkerCrashed {
            name: self.name.clone(),
            exit_code: None,
            stderr_tail: tail,
        }
    }

    fn crashed_with_exit(&mut self) -> BenchError {
        let exit_code = self.child.wait().ok().and_then(|status| status.code());
        // The pipes are closed now, so the pumps drain and exit.
        for pump in self.pumps.drain(..) {
            let _ = pump.join();
        }
        BenchError::WorkerCrashed {
            name: self.name.clone(),
            exit_code,
            stderr_tail: self.stderr_tail(),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn spawn_failure(name: &str, detail: String) -> BenchError {
    BenchError::WorkerCrashed {
        name: name.to_string(),
        exit_code: None,
        stderr_tail: detail,
    }
}

/// Run one benchmark in a fresh worker spawned from the current executable.
pub fn run_isolated(message: &RunMessage) -> Result<Vec<MeasuredResults>, BenchError> {
    let mut worker = WorkerHandle::spawn(&message.spec.name, WORKER_TIMEOUT, message.options.gc_stats)?;
    finish_run(worker.run(message), worker, message)
}

/// Run one benchmark in a fresh worker spawned from `binary`.
pub fn run_isolated_binary(
    binary: &Path,
    message: &RunMessage,
) -> Result<Vec<MeasuredResults>, BenchError> {
    let mut worker = WorkerHandle::spawn_binary(
        &message.spec.name,
        binary,
        WORKER_TIMEOUT,
        message.options.gc_stats,
    )?;
    finish_run(worker.run(message), worker, message)
}

fn finish_run(
    outcome: Result<Vec<MeasuredResults>, BenchError>,
    worker: WorkerHandle,
    message: &RunMessage,
) -> Result<Vec<MeasuredResults>, BenchError> {
    let mut results = outcome?;
    let gc_stats = worker.finish();
    if message.options.gc_stats {
        for result in &mut results {
            result.gc_stats = Some(gc_stats.clone());
        }
    }
    Ok(results)
}
