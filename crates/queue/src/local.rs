//! In-process dispatch queue backend.
//!
//! Stands in for a remote-execution queue: task commands run via `sh -c`
//! on a fixed pool of worker threads. Supports priority-ordered dispatch,
//! cancellation of pending and running tasks, and the aggregate statistics
//! the speculative scheduler reads. File transfer is a no-op — inputs and
//! outputs live on the local filesystem already.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use specq_core::{QueueConfig, TaskHandle, TaskId, TaskResult, TaskSpec, TaskState};

use crate::error::QueueError;
use crate::queue::{DispatchQueue, QueueStats};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Heap entry for the pending set: higher priority first, FIFO within a
/// priority level.
#[derive(Debug, PartialEq, Eq)]
struct PendingEntry {
    priority: i64,
    seq: u64,
    id: TaskId,
}

impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct PendingTask {
    spec: TaskSpec,
    submitted_at: DateTime<Utc>,
}

struct RunningTask {
    spec: TaskSpec,
    submitted_at: DateTime<Utc>,
    since: DateTime<Utc>,
    cancel_flag: Arc<AtomicBool>,
    child: Arc<Mutex<Option<Child>>>,
}

struct WorkerReport {
    id: TaskId,
    result: TaskResult,
    execute_time: Duration,
}

/// Local dispatch queue: N worker threads executing shell commands.
pub struct LocalQueue {
    workers: usize,
    fast_abort: f64,
    next_id: TaskId,
    next_seq: u64,
    heap: BinaryHeap<PendingEntry>,
    pending: HashMap<TaskId, PendingTask>,
    running: HashMap<TaskId, RunningTask>,
    /// Ids cancelled while running; their late worker reports are dropped.
    cancelled: HashSet<TaskId>,
    done: HashSet<TaskId>,
    report_tx: Sender<WorkerReport>,
    report_rx: Receiver<WorkerReport>,
    tasks_done: u64,
    time_execute_good: Duration,
}

impl LocalQueue {
    pub fn new(config: &QueueConfig) -> Result<Self, QueueError> {
        config
            .validate()
            .map_err(|e| QueueError::Create(e.to_string()))?;
        if config.fast_abort > 0.0 {
            debug!(multiplier = config.fast_abort, "fast abort requested (no-op for the local backend)");
        }
        let (report_tx, report_rx) = mpsc::channel();
        Ok(Self {
            workers: config.workers,
            fast_abort: config.fast_abort,
            next_id: 1,
            next_seq: 0,
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            running: HashMap::new(),
            cancelled: HashSet::new(),
            done: HashSet::new(),
            report_tx,
            report_rx,
            tasks_done: 0,
            time_execute_good: Duration::ZERO,
        })
    }

    pub fn fast_abort(&self) -> f64 {
        self.fast_abort
    }

    /// Move pending tasks onto free worker slots, highest priority first.
    fn dispatch(&mut self) {
        while self.running.len() < self.workers {
            let Some(entry) = self.heap.pop() else { break };
            let Some(task) = self.pending.remove(&entry.id) else {
                // cancelled while pending; heap entry is stale
                continue;
            };
            let cancel_flag = Arc::new(AtomicBool::new(false));
            let child = Arc::new(Mutex::new(None));
            let since = Utc::now();
            debug!(id = entry.id, priority = entry.priority, "dispatching task");
            spawn_worker(
                entry.id,
                task.spec.command.clone(),
                self.report_tx.clone(),
                Arc::clone(&child),
                Arc::clone(&cancel_flag),
            );
            self.running.insert(
                entry.id,
                RunningTask {
                    spec: task.spec,
                    submitted_at: task.submitted_at,
                    since,
                    cancel_flag,
                    child,
                },
            );
        }
    }

    fn handle_report(&mut self, report: WorkerReport) -> Option<TaskHandle> {
        let Some(run) = self.running.remove(&report.id) else {
            if self.cancelled.remove(&report.id) {
                // the kill/completion race the scheduler is built to absorb
                debug!(id = report.id, "dropping report for cancelled task");
            } else {
                warn!(id = report.id, "report for unknown task");
            }
            return None;
        };
        self.done.insert(report.id);
        self.tasks_done += 1;
        if report.result.is_success() {
            self.time_execute_good += report.execute_time;
        }
        Some(TaskHandle {
            id: report.id,
            spec: run.spec,
            submitted_at: run.submitted_at,
            commit_start_time: Some(run.since),
            finished_at: Some(Utc::now()),
            result: report.result,
            execute_time: Some(report.execute_time),
        })
    }
}

impl DispatchQueue for LocalQueue {
    fn submit(&mut self, spec: TaskSpec) -> Result<TaskId, QueueError> {
        let id = self.next_id;
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!(id, priority = spec.priority, category = %spec.category, "task submitted");
        self.heap.push(PendingEntry {
            priority: spec.priority,
            seq,
            id,
        });
        self.pending.insert(
            id,
            PendingTask {
                spec,
                submitted_at: Utc::now(),
            },
        );
        self.dispatch();
        Ok(id)
    }

    fn wait(&mut self, timeout: Duration) -> Result<Option<TaskHandle>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.dispatch();
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match self.report_rx.recv_timeout(remaining) {
                Ok(report) => {
                    if let Some(handle) = self.handle_report(report) {
                        return Ok(Some(handle));
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(QueueError::Closed),
            }
        }
    }

    fn cancel_by_id(&mut self, id: TaskId) -> Result<Option<TaskHandle>, QueueError> {
        if let Some(task) = self.pending.remove(&id) {
            self.heap.retain(|e| e.id != id);
            debug!(id, "cancelled pending task");
            return Ok(Some(TaskHandle {
                id,
                spec: task.spec,
                submitted_at: task.submitted_at,
                commit_start_time: None,
                finished_at: Some(Utc::now()),
                result: TaskResult::Cancelled,
                execute_time: None,
            }));
        }
        if let Some(run) = self.running.remove(&id) {
            run.cancel_flag.store(true, AtomicOrdering::Relaxed);
            if let Ok(mut guard) = run.child.lock() {
                if let Some(child) = guard.as_mut() {
                    let _ = child.kill();
                }
            }
            self.cancelled.insert(id);
            debug!(id, "cancelled running task");
            return Ok(Some(TaskHandle {
                id,
                spec: run.spec,
                submitted_at: run.submitted_at,
                commit_start_time: Some(run.since),
                finished_at: Some(Utc::now()),
                result: TaskResult::Cancelled,
                execute_time: None,
            }));
        }
        Ok(None)
    }

    fn task_state(&self, id: TaskId) -> TaskState {
        if self.pending.contains_key(&id) {
            TaskState::Pending
        } else if let Some(run) = self.running.get(&id) {
            TaskState::Running { since: run.since }
        } else if self.done.contains(&id) || self.cancelled.contains(&id) {
            TaskState::Done
        } else {
            TaskState::Unknown
        }
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            workers_connected: self.workers,
            workers_busy: self.running.len(),
            tasks_waiting: self.pending.len(),
            tasks_running: self.running.len(),
            tasks_done: self.tasks_done,
            time_execute_good: self.time_execute_good,
            time_send_good: Duration::ZERO,
            time_receive_good: Duration::ZERO,
        }
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.running.is_empty()
    }
}

impl Drop for LocalQueue {
    fn drop(&mut self) {
        for (_, run) in self.running.drain() {
            run.cancel_flag.store(true, AtomicOrdering::Relaxed);
            if let Ok(mut guard) = run.child.lock() {
                if let Some(child) = guard.as_mut() {
                    let _ = child.kill();
                }
            }
        }
    }
}

fn spawn_worker(
    id: TaskId,
    command: String,
    tx: Sender<WorkerReport>,
    slot: Arc<Mutex<Option<Child>>>,
    cancel_flag: Arc<AtomicBool>,
) {
    thread::spawn(move || {
        let started = Instant::now();
        let spawned = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        let result = match spawned {
            Err(e) => TaskResult::Failed(format!("spawn failed: {}", e)),
            Ok(child) => {
                if let Ok(mut guard) = slot.lock() {
                    *guard = Some(child);
                }
                supervise(&slot, &cancel_flag)
            }
        };
        let _ = tx.send(WorkerReport {
            id,
            result,
            execute_time: started.elapsed(),
        });
    });
}

/// Poll the child until it exits or cancellation is flagged.
fn supervise(slot: &Mutex<Option<Child>>, cancel_flag: &AtomicBool) -> TaskResult {
    loop {
        if cancel_flag.load(AtomicOrdering::Relaxed) {
            if let Ok(mut guard) = slot.lock() {
                if let Some(child) = guard.as_mut() {
                    let _ = child.kill();
                    let _ = child.wait();
                }
                guard.take();
            }
            return TaskResult::Cancelled;
        }
        let status = {
            let mut guard = match slot.lock() {
                Ok(g) => g,
                Err(_) => return TaskResult::Failed("worker slot lock poisoned".to_string()),
            };
            match guard.as_mut() {
                None => return TaskResult::Cancelled,
                Some(child) => match child.try_wait() {
                    Ok(status) => status,
                    Err(e) => {
                        guard.take();
                        return TaskResult::Failed(format!("wait failed: {}", e));
                    }
                },
            }
        };
        match status {
            Some(s) => {
                if let Ok(mut guard) = slot.lock() {
                    guard.take();
                }
                return if s.success() {
                    TaskResult::Success
                } else {
                    TaskResult::Failed(s.to_string())
                };
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_worker() -> LocalQueue {
        LocalQueue::new(&QueueConfig {
            workers: 1,
            fast_abort: 0.0,
        })
        .unwrap()
    }

    #[test]
    fn pending_order_priority_then_fifo() {
        let mut heap = BinaryHeap::new();
        heap.push(PendingEntry { priority: 0, seq: 0, id: 1 });
        heap.push(PendingEntry { priority: 10, seq: 1, id: 2 });
        heap.push(PendingEntry { priority: 0, seq: 2, id: 3 });

        assert_eq!(heap.pop().unwrap().id, 2);
        assert_eq!(heap.pop().unwrap().id, 1);
        assert_eq!(heap.pop().unwrap().id, 3);
    }

    #[test]
    fn zero_workers_rejected() {
        let config = QueueConfig {
            workers: 0,
            fast_abort: 0.0,
        };
        assert!(matches!(LocalQueue::new(&config), Err(QueueError::Create(_))));
    }

    #[test]
    fn submit_and_wait_success() {
        let mut queue = one_worker();
        let id = queue.submit(TaskSpec::new("true")).unwrap();
        let handle = queue
            .wait(Duration::from_secs(10))
            .unwrap()
            .expect("task should complete");
        assert_eq!(handle.id, id);
        assert!(handle.result.is_success());
        assert!(handle.commit_start_time.is_some());
        assert_eq!(queue.stats().tasks_done, 1);
        assert!(queue.is_empty());
        assert_eq!(queue.task_state(id), TaskState::Done);
    }

    #[test]
    fn failed_task_reported_not_retried() {
        let mut queue = one_worker();
        let id = queue.submit(TaskSpec::new("exit 3")).unwrap();
        let handle = queue
            .wait(Duration::from_secs(10))
            .unwrap()
            .expect("task should complete");
        assert_eq!(handle.id, id);
        assert!(matches!(handle.result, TaskResult::Failed(_)));
        assert!(queue.is_empty());
        // failed time does not count toward the good average
        assert_eq!(queue.stats().time_execute_good, Duration::ZERO);
    }

    #[test]
    fn wait_timeout_returns_none() {
        let mut queue = one_worker();
        queue.submit(TaskSpec::new("sleep 5")).unwrap();
        let got = queue.wait(Duration::from_millis(100)).unwrap();
        assert!(got.is_none());
        queue.cancel_by_id(1).unwrap();
    }

    #[test]
    fn cancel_pending_and_running() {
        let mut queue = one_worker();
        let first = queue.submit(TaskSpec::new("sleep 5")).unwrap();
        let second = queue.submit(TaskSpec::new("sleep 5")).unwrap();
        assert_eq!(queue.task_state(second), TaskState::Pending);
        assert!(matches!(queue.task_state(first), TaskState::Running { .. }));

        let cancelled = queue.cancel_by_id(second).unwrap().expect("pending handle");
        assert_eq!(cancelled.result, TaskResult::Cancelled);
        assert!(cancelled.commit_start_time.is_none());

        let cancelled = queue.cancel_by_id(first).unwrap().expect("running handle");
        assert_eq!(cancelled.result, TaskResult::Cancelled);
        assert!(cancelled.commit_start_time.is_some());

        assert!(queue.is_empty());
        // the killed worker's late report must not surface as a completion
        assert!(queue.wait(Duration::from_millis(200)).unwrap().is_none());
        assert_eq!(queue.stats().tasks_done, 0);
    }

    #[test]
    fn cancel_unknown_returns_none() {
        let mut queue = one_worker();
        assert!(queue.cancel_by_id(99).unwrap().is_none());
    }

    #[test]
    fn higher_priority_dispatches_first() {
        let mut queue = one_worker();
        // occupy the single worker
        let blocker = queue.submit(TaskSpec::new("sleep 5")).unwrap();
        let low = queue.submit(TaskSpec::new("true").with_priority(0)).unwrap();
        let high = queue.submit(TaskSpec::new("true").with_priority(10)).unwrap();

        queue.cancel_by_id(blocker).unwrap();
        let handle = queue
            .wait(Duration::from_secs(10))
            .unwrap()
            .expect("a task should complete");
        assert_eq!(handle.id, high);
        assert_eq!(queue.task_state(low), TaskState::Pending);
    }
}
