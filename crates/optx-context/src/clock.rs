//! # Clocks and the Optimizer Stopwatch
//!
//! The timeout guard never reads the wall clock directly. It asks a [`Clock`] for the
//! current monotonic time, which lets tests substitute a [`ManualClock`] and drive the
//! elapsed time deterministically.
//!
//! A [`Stopwatch`] captures the clock reading once, at construction, and reports the
//! distance to the current reading on every call. It is immutable after construction and
//! cheap to clone, so diagnostic code on other threads may hold a copy and read the
//! elapsed time while the optimizer thread keeps working.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonic time source.
///
/// `now()` returns the time since an arbitrary, fixed origin. Successive calls must never
/// go backwards.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Duration;
}

/// Clock backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A clock that only moves when told to. Millisecond resolution.
///
/// Shared between the test body and the context under test through an `Arc`; the
/// reading is atomic so advancing it from the test never races with the context reading it.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward by `delta`, truncated to whole milliseconds. Saturates at
    /// `u64::MAX` milliseconds.
    pub fn advance(&self, delta: Duration) {
        let delta_ms = whole_millis(delta);
        let _ = self
            .now_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(delta_ms))
            });
    }

    /// Sets the clock reading, truncated to whole milliseconds. Ignored if it would move
    /// the clock backwards.
    pub fn set(&self, now: Duration) {
        self.now_ms.fetch_max(whole_millis(now), Ordering::SeqCst);
    }
}

fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.now_ms.load(Ordering::SeqCst))
    }
}

/// Measures the time elapsed since it was started.
#[derive(Clone)]
pub struct Stopwatch {
    clock: Arc<dyn Clock>,
    started_at: Duration,
}

impl Stopwatch {
    /// Starts a stopwatch on `clock`. The start reading is fixed from here on.
    pub fn start(clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        Self { clock, started_at }
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(self.started_at)
    }

    pub fn elapsed_millis(&self) -> u64 {
        whole_millis(self.elapsed())
    }
}

impl fmt::Debug for Stopwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stopwatch")
            .field("elapsed_ms", &self.elapsed_millis())
            .finish()
    }
}
