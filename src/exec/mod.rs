//! Task execution for the stages of a generation step.
//!
//! The engine never spawns threads itself. It hands units of work to an
//! [`Executor`] supplied by the caller and awaits the returned
//! [`TaskHandle`]s, so the worker pool, and therefore resource usage, stays
//! under the caller's control.
//!
//! Do not call [`Engine::evolve`](crate::Engine::evolve) from a worker of the
//! same bounded pool the engine executes on: the calling thread blocks until
//! the step completes.

mod timing;

pub use timing::{Clock, MonotonicClock, SystemClock, Timed, TimedExecutor, Timer};

use crate::error::{ConfigError, EngineError};
use futures::channel::oneshot;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread;

/// A unit of work accepted by an [`Executor`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs, usually on worker threads.
///
/// # Examples
/// ```
/// use jeans_engine::exec::{self, Executor, InlineExecutor};
/// use futures::executor::block_on;
///
/// let handle = exec::spawn(&InlineExecutor, || 6 * 7);
/// assert_eq!(block_on(handle).unwrap(), 42);
/// ```
pub trait Executor: Send + Sync {
    /// Schedules `job` for execution.
    fn execute(&self, job: Job);
}

impl<T: Executor + ?Sized> Executor for &T {
    fn execute(&self, job: Job) {
        (**self).execute(job);
    }
}

impl<T: Executor + ?Sized> Executor for Box<T> {
    fn execute(&self, job: Job) {
        (**self).execute(job);
    }
}

impl<T: Executor + ?Sized> Executor for Arc<T> {
    fn execute(&self, job: Job) {
        (**self).execute(job);
    }
}

/// Submits `task` and returns a handle resolving to its output.
///
/// A panic inside `task` is caught on the worker and surfaces as
/// [`EngineError::TaskPanicked`] when the handle is awaited.
pub fn spawn<E, T, F>(executor: &E, task: F) -> TaskHandle<T>
where
    E: Executor + ?Sized,
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (sender, receiver) = oneshot::channel();
    executor.execute(Box::new(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(task));
        // The receiver is gone when the step already failed elsewhere.
        let _ = sender.send(outcome);
    }));
    TaskHandle { receiver }
}

/// Completion handle of a job submitted through [`spawn`].
#[must_use = "a task handle does nothing unless awaited"]
pub struct TaskHandle<T> {
    receiver: oneshot::Receiver<thread::Result<T>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, EngineError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(Ok(value))) => Poll::Ready(Ok(value)),
            Poll::Ready(Ok(Err(payload))) => {
                Poll::Ready(Err(EngineError::from_panic(payload.as_ref())))
            }
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(EngineError::TaskCanceled)),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").finish_non_exhaustive()
    }
}

/// Executes jobs on a rayon thread pool.
#[derive(Debug, Clone, Default)]
pub struct RayonExecutor {
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl RayonExecutor {
    /// Uses rayon's global pool.
    #[must_use]
    pub fn global() -> Self {
        Self { pool: None }
    }

    /// Uses a caller-owned pool.
    #[must_use]
    pub fn new(pool: Arc<rayon::ThreadPool>) -> Self {
        Self { pool: Some(pool) }
    }

    /// Builds a dedicated pool with `threads` workers.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidConcurrency`] when `threads` is zero and
    /// [`ConfigError::ThreadPool`] when the pool cannot be created.
    pub fn with_threads(threads: usize) -> Result<Self, ConfigError> {
        if threads == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("jeans-engine-{idx}"))
            .build()?;
        Ok(Self::new(Arc::new(pool)))
    }
}

impl Executor for RayonExecutor {
    fn execute(&self, job: Job) {
        match &self.pool {
            Some(pool) => pool.spawn(job),
            None => rayon::spawn(job),
        }
    }
}

/// Executes jobs on the blocking pool of a Tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioExecutor {
    /// Uses the runtime behind `handle`.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime of the current context, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, job: Job) {
        // Completion is observed through the task handle.
        drop(self.handle.spawn_blocking(job));
    }
}

/// Runs every job immediately on the submitting thread.
///
/// Useful for deterministic tests and single-threaded environments.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) {
        job();
    }
}
