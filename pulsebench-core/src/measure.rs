//! Timing Primitives
//!
//! Monotonic iteration timing plus the wall-clock microsecond stamps that
//! accompany every sample. CPU pinning keeps the worker on one core so
//! short measurements are not distorted by migrations.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Monotonic timer for one measurement span.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start timing now.
    #[inline(always)]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed time since start.
    #[inline(always)]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed nanoseconds since start.
    #[inline(always)]
    pub fn elapsed_ns(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    /// Elapsed milliseconds since start, fractional.
    #[inline(always)]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1_000.0
    }
}

/// Wall-clock microseconds since the Unix epoch.
///
/// Used for per-sample timestamps only; never for measuring durations.
#[inline]
pub fn wall_clock_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Pin the current thread to a specific core.
///
/// Avoids core migrations mid-measurement; best effort everywhere else.
#[cfg(target_os = "linux")]
pub fn pin_to_cpu(cpu: usize) -> Result<(), std::io::Error> {
    use std::mem::MaybeUninit;

    unsafe {
        let mut set = MaybeUninit::<libc::cpu_set_t>::zeroed();
        let set_ref = set.assume_init_mut();

        libc::CPU_ZERO(set_ref);
        libc::CPU_SET(cpu, set_ref);

        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), set_ref) == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }
}

/// Pinning is unsupported here; succeed without doing anything.
#[cfg(not(target_os = "linux"))]
pub fn pin_to_cpu(_cpu: usize) -> Result<(), std::io::Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_measures_sleep() {
        let timer = Timer::start();
        std::thread::sleep(Duration::from_millis(10));
        let ms = timer.elapsed_ms();

        assert!(ms >= 5.0);
        assert!(ms < 500.0);
    }

    #[test]
    fn test_timer_monotonic() {
        let timer = Timer::start();
        let a = timer.elapsed_ns();
        let b = timer.elapsed_ns();
        assert!(b >= a);
    }

    #[test]
    fn test_wall_clock_micros_advances() {
        let a = wall_clock_micros();
        std::thread::sleep(Duration::from_millis(2));
        let b = wall_clock_micros();
        assert!(b > a);
    }
}
