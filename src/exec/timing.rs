//! Clocks and timed execution of step stages.

use super::{spawn, Executor, TaskHandle};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Time source used for every duration measured within a step.
///
/// `now` returns the time elapsed since a clock-specific epoch; only the
/// difference between two readings is meaningful.
pub trait Clock: Send + Sync {
    /// Current reading from the clock.
    fn now(&self) -> Duration;
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Duration {
        (**self).now()
    }
}

/// Monotonic clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose epoch is the moment of creation.
    #[must_use]
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

/// Wall clock backed by [`SystemTime`], measured from the Unix epoch.
///
/// Readings may go backwards when the system time is adjusted; measured
/// durations are clamped at zero in that case.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }
}

/// Stopwatch reading a [`Clock`].
///
/// # Examples
/// ```
/// use jeans_engine::exec::{MonotonicClock, Timer};
/// let clock = MonotonicClock::new();
/// let timer = Timer::start(&clock);
/// let elapsed = timer.stop();
/// assert!(elapsed.as_secs() < 1);
/// ```
pub struct Timer<'a> {
    clock: &'a dyn Clock,
    start: Duration,
}

impl<'a> Timer<'a> {
    /// Starts a timer now.
    pub fn start(clock: &'a dyn Clock) -> Self {
        Self {
            clock,
            start: clock.now(),
        }
    }

    /// Time since [`Timer::start`], never negative.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(self.start)
    }

    /// Stops the timer and returns the measured time.
    #[must_use]
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl fmt::Debug for Timer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer").field("start", &self.start).finish()
    }
}

/// A value together with the time it took to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timed<T> {
    /// Produced value.
    pub result: T,
    /// Time spent producing it.
    pub duration: Duration,
}

impl<T> Timed<T> {
    /// Runs `task` and measures it with `clock`.
    pub fn measure<F>(clock: &dyn Clock, task: F) -> Self
    where
        F: FnOnce() -> T,
    {
        let timer = Timer::start(clock);
        let result = task();
        Self {
            result,
            duration: timer.stop(),
        }
    }
}

/// An executor paired with the clock every task is measured with.
#[derive(Clone)]
pub struct TimedExecutor {
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
}

impl TimedExecutor {
    /// Pairs `executor` with `clock`.
    pub fn new(executor: Arc<dyn Executor>, clock: Arc<dyn Clock>) -> Self {
        Self { executor, clock }
    }

    /// The wrapped executor.
    #[must_use]
    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// The clock tasks are measured with.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Submits `task`; the duration covers only its execution, not the time
    /// spent queued.
    pub fn spawn<T, F>(&self, task: F) -> TaskHandle<Timed<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let clock = Arc::clone(&self.clock);
        spawn(self.executor.as_ref(), move || Timed::measure(clock.as_ref(), task))
    }
}

impl fmt::Debug for TimedExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedExecutor").finish_non_exhaustive()
    }
}
