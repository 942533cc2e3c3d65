//! Delayed task execution.
//!
//! Components that need timers (discovery retries, backoff, sampling
//! timeouts, `Schedule` actions) receive a [`Scheduler`] through their
//! constructor instead of spawning on their own, so tests can drive time
//! by hand.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a scheduled task. Cancelling is best-effort: a task that has
/// already started runs to completion.
#[derive(Clone, Debug, Default)]
pub struct ScheduledTask {
    cancelled: Arc<AtomicBool>,
}

impl ScheduledTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask;
}

/// Scheduler backed by tokio timers.
pub struct TokioScheduler {
    handle: Handle,
    running: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            running: Arc::new(AtomicBool::new(true)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Scheduler on the runtime of the calling context.
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Number of timers not yet fired.
    pub fn pending(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.is_finished());
        tasks.len()
    }

    /// Abort every outstanding timer. Later calls to `schedule` are no-ops.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        tracing::debug!(aborted = tasks.len(), "scheduler shut down");
        for task in tasks {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask {
        let scheduled = ScheduledTask::new();
        if !self.is_running() {
            scheduled.cancel();
            return scheduled;
        }

        let running = Arc::clone(&self.running);
        let token = scheduled.clone();
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if running.load(Ordering::Acquire) && !token.is_cancelled() {
                task();
            }
        });

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.is_finished());
        tasks.push(join);
        scheduled
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn runs_after_delay() {
        let scheduler = TokioScheduler::current();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        scheduler.schedule(
            Duration::from_secs(5),
            Box::new(move || {
                f.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_does_not_run() {
        let scheduler = TokioScheduler::current();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        let handle = scheduler.schedule(
            Duration::from_secs(1),
            Box::new(move || {
                f.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_and_rejects() {
        let scheduler = TokioScheduler::current();
        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let f = Arc::clone(&fired);
            scheduler.schedule(
                Duration::from_secs(1),
                Box::new(move || {
                    f.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        assert_eq!(scheduler.pending(), 3);
        scheduler.shutdown();
        scheduler.shutdown();

        let f = Arc::clone(&fired);
        let late = scheduler.schedule(
            Duration::ZERO,
            Box::new(move || {
                f.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(late.is_cancelled());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 0);
    }
}
