//! Shared utilities for Tempo.

pub mod scheduler;
pub mod stats;

pub use scheduler::{ScheduledTask, Scheduler, Task, TokioScheduler};
pub use stats::StatsCounter;
