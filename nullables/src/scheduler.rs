//! Nullable scheduler: deterministic timers for testing.

use std::sync::Mutex;
use std::time::Duration;

use tempo_utils::{ScheduledTask, Scheduler, Task};

struct Timer {
    due: Duration,
    seq: u64,
    handle: ScheduledTask,
    task: Task,
}

#[derive(Default)]
struct State {
    now: Duration,
    next_seq: u64,
    timers: Vec<Timer>,
}

/// A scheduler on a virtual clock.
///
/// Time only advances when you tell it to. Tasks run on the caller's thread,
/// in due order (ties in scheduling order), with no lock held, so a task may
/// schedule further tasks.
pub struct NullScheduler {
    state: Mutex<State>,
}

impl NullScheduler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.state.lock().unwrap().now
    }

    /// Remaining delay of every live timer, soonest first.
    pub fn pending_delays(&self) -> Vec<Duration> {
        let state = self.state.lock().unwrap();
        let mut timers: Vec<_> = state
            .timers
            .iter()
            .filter(|t| !t.handle.is_cancelled())
            .map(|t| (t.due, t.seq))
            .collect();
        timers.sort();
        timers.into_iter().map(|(due, _)| due - state.now).collect()
    }

    pub fn pending(&self) -> usize {
        self.pending_delays().len()
    }

    /// Advance the clock by `by`, running every timer that falls due,
    /// including ones scheduled by tasks run along the way. Returns the
    /// number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut ran = 0;
        while let Some(task) = self.pop_due(target) {
            task();
            ran += 1;
        }
        self.state.lock().unwrap().now = target;
        ran
    }

    /// Run the timers that are live right now, regardless of their delay.
    /// Timers they schedule are left pending.
    pub fn fire_pending(&self) -> usize {
        let seq_limit = self.state.lock().unwrap().next_seq;
        let mut ran = 0;
        loop {
            let task = {
                let mut state = self.state.lock().unwrap();
                state.timers.retain(|t| !t.handle.is_cancelled());
                let next = state
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.seq < seq_limit)
                    .min_by_key(|(_, t)| (t.due, t.seq))
                    .map(|(i, _)| i);
                let Some(index) = next else {
                    break;
                };
                let timer = state.timers.swap_remove(index);
                state.now = state.now.max(timer.due);
                timer.task
            };
            task();
            ran += 1;
        }
        ran
    }

    fn pop_due(&self, target: Duration) -> Option<Task> {
        let mut state = self.state.lock().unwrap();
        state.timers.retain(|t| !t.handle.is_cancelled());
        let index = state
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= target)
            .min_by_key(|(_, t)| (t.due, t.seq))
            .map(|(i, _)| i)?;
        let timer = state.timers.swap_remove(index);
        state.now = state.now.max(timer.due);
        Some(timer.task)
    }
}

impl Default for NullScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for NullScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask {
        let handle = ScheduledTask::new();
        let mut state = self.state.lock().unwrap();
        let timer = Timer {
            due: state.now + delay,
            seq: state.next_seq,
            handle: handle.clone(),
            task,
        };
        state.next_seq += 1;
        state.timers.push(timer);
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn log_task(log: &Arc<Mutex<Vec<u32>>>, value: u32) -> Task {
        let log = Arc::clone(log);
        Box::new(move || log.lock().unwrap().push(value))
    }

    #[test]
    fn runs_in_due_order() {
        let scheduler = NullScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        scheduler.schedule(Duration::from_secs(3), log_task(&log, 3));
        scheduler.schedule(Duration::from_secs(1), log_task(&log, 1));
        scheduler.schedule(Duration::from_secs(1), log_task(&log, 2));

        assert_eq!(scheduler.advance(Duration::from_secs(2)), 2);
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
        assert_eq!(scheduler.pending_delays(), vec![Duration::from_secs(1)]);
        scheduler.advance(Duration::from_secs(1));
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(scheduler.now(), Duration::from_secs(3));
    }

    #[test]
    fn cancelled_timer_is_skipped() {
        let scheduler = NullScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = scheduler.schedule(Duration::from_secs(1), log_task(&log, 1));
        handle.cancel();
        assert_eq!(scheduler.advance(Duration::from_secs(5)), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn tasks_may_schedule_more_tasks() {
        let scheduler = Arc::new(NullScheduler::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner_scheduler = Arc::clone(&scheduler);
        let inner_log = Arc::clone(&log);
        scheduler.schedule(
            Duration::from_secs(1),
            Box::new(move || {
                inner_log.lock().unwrap().push(1);
                inner_scheduler.schedule(Duration::from_secs(1), log_task(&inner_log, 2));
            }),
        );

        assert_eq!(scheduler.advance(Duration::from_secs(2)), 2);
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn fire_pending_leaves_new_timers() {
        let scheduler = Arc::new(NullScheduler::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner_scheduler = Arc::clone(&scheduler);
        let inner_log = Arc::clone(&log);
        scheduler.schedule(
            Duration::from_secs(10),
            Box::new(move || {
                inner_scheduler.schedule(Duration::from_secs(10), log_task(&inner_log, 2));
            }),
        );

        assert_eq!(scheduler.fire_pending(), 1);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(scheduler.pending(), 1);
    }
}
