//! Dispatch queue trait and aggregate statistics.

use std::time::Duration;

use specq_core::{TaskHandle, TaskId, TaskSpec, TaskState};

use crate::error::QueueError;

/// Completed-task count below which the rolling average is not trusted.
/// A 1-sample average would replicate everything in sight.
pub const MIN_GOOD_SAMPLES: u64 = 6;

/// Aggregate queue statistics, read-only to the scheduler.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    pub workers_connected: usize,
    pub workers_busy: usize,
    pub tasks_waiting: usize,
    pub tasks_running: usize,
    pub tasks_done: u64,
    /// Cumulative execution time of successful tasks.
    pub time_execute_good: Duration,
    /// Cumulative input-transfer time of successful tasks.
    pub time_send_good: Duration,
    /// Cumulative output-transfer time of successful tasks.
    pub time_receive_good: Duration,
}

impl QueueStats {
    /// Rolling average duration of a good task (execution plus transfers),
    /// the basis for the straggler threshold. `None` until enough tasks
    /// have completed for the estimate to mean anything.
    pub fn average_good_duration(&self) -> Option<Duration> {
        if self.tasks_done < MIN_GOOD_SAMPLES {
            return None;
        }
        let total = self.time_execute_good + self.time_send_good + self.time_receive_good;
        if total.is_zero() {
            return None;
        }
        Some(total / self.tasks_done as u32)
    }
}

/// The external collaborator: a distributed task-dispatch queue.
///
/// The speculative scheduler owns the queue handle exclusively and drives it
/// through this seam; no other component submits or cancels against it. The
/// contract is blocking-RPC style: one call at a time, never reentrant.
pub trait DispatchQueue {
    /// Submit a task for execution. Returns the queue-assigned id.
    fn submit(&mut self, spec: TaskSpec) -> Result<TaskId, QueueError>;

    /// Block until a task completes or `timeout` elapses. `Ok(None)` means
    /// timeout; callers loop until [`is_empty`](Self::is_empty).
    fn wait(&mut self, timeout: Duration) -> Result<Option<TaskHandle>, QueueError>;

    /// Remove a task from the pending/running set. Returns the cancelled
    /// handle, or `None` when the queue no longer holds the task (already
    /// finished or never known) — callers must treat that as non-fatal.
    fn cancel_by_id(&mut self, id: TaskId) -> Result<Option<TaskHandle>, QueueError>;

    /// Where the task currently sits. `Running { since }` carries the
    /// commit-start timestamp.
    fn task_state(&self, id: TaskId) -> TaskState;

    /// Aggregate statistics snapshot.
    fn stats(&self) -> QueueStats;

    /// True when no task is pending or running.
    fn is_empty(&self) -> bool;
}
