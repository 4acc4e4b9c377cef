//! The speculative scheduler: submit/wait/cancel protocol over a dispatch
//! queue, with straggler replication and race reconciliation.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use specq_core::{SpeculationMode, TaskCategory, TaskHandle, TaskId, TaskSpec, TaskState};
use specq_queue::{DispatchQueue, QueueStats};

use crate::error::SchedulerError;
use crate::policy::should_replicate;
use crate::tracker::{RaceRole, ReplicationTracker};

/// Wraps a [`DispatchQueue`] and races redundant copies against stragglers.
///
/// Single-threaded and caller-driven: all state mutation happens inside
/// `submit` and `wait`, one call at a time. The queue handle is owned
/// exclusively for the scheduler's lifetime.
pub struct SpeculativeScheduler<Q: DispatchQueue> {
    queue: Q,
    mode: SpeculationMode,
    priority_change: i64,
    /// Live originals, keyed by queue id. Twins never appear here; a race
    /// is removed under its original's id whichever side wins.
    live: HashMap<TaskId, TaskSpec>,
    tracker: ReplicationTracker,
}

impl<Q: DispatchQueue> SpeculativeScheduler<Q> {
    pub fn new(queue: Q, mode: SpeculationMode) -> Self {
        info!(mode = %mode, priority_change = mode.priority_change(), "speculative scheduler created");
        Self {
            queue,
            mode,
            priority_change: mode.priority_change(),
            live: HashMap::new(),
            tracker: ReplicationTracker::new(),
        }
    }

    pub fn mode(&self) -> SpeculationMode {
        self.mode
    }

    /// Submit a task. In backup mode a lower-priority twin goes in right
    /// behind it and the pair is recorded as a race. The returned id is
    /// always the original's — the caller-visible identity.
    pub fn submit(&mut self, spec: TaskSpec) -> Result<TaskId, SchedulerError> {
        let original = self.queue.submit(spec.clone())?;
        if matches!(self.mode, SpeculationMode::Backup) {
            let backup_spec = spec
                .clone()
                .with_category(TaskCategory::Backup)
                .with_priority(spec.priority + self.priority_change);
            let backup = self.queue.submit(backup_spec)?;
            debug!(original, backup, "submitted backup twin");
            self.tracker.record(original, backup);
        }
        self.live.insert(original, spec);
        Ok(original)
    }

    /// One full scheduling step: sweep for stragglers (threshold mode),
    /// block on the queue, reconcile any race the completion resolves.
    /// `Ok(None)` on timeout; callers loop until [`is_empty`](Self::is_empty).
    pub fn wait(&mut self, timeout: Duration) -> Result<Option<TaskHandle>, SchedulerError> {
        // Sweep before blocking so a newly eligible straggler is replicated
        // at the start of this cycle, not only after some other completion.
        if let SpeculationMode::Threshold(multiplier) = self.mode {
            self.sweep_replicas(multiplier)?;
        }

        let Some(handle) = self.queue.wait(timeout)? else {
            return Ok(None);
        };

        if handle.result.is_success() {
            self.reconcile(&handle);
        } else {
            // Reported to the caller as-is; retry, if any, is the queue's
            // concern, and a still-running twin keeps its chance to win.
            warn!(id = handle.id, result = %handle.result, "task failed");
            self.live.remove(&handle.id);
        }

        Ok(Some(handle))
    }

    /// Cancel the finished task's twin, if it has one, and clear the race.
    fn reconcile(&mut self, handle: &TaskHandle) {
        let Some(counterpart) = self.tracker.resolve(handle.id) else {
            // Normal non-speculative completion — or the second report of an
            // already-resolved race, which is deliberately indistinguishable.
            self.live.remove(&handle.id);
            return;
        };

        debug!(
            winner = handle.id,
            loser = counterpart.id,
            winner_role = ?counterpart.role,
            "race resolved, cancelling counterpart"
        );
        match self.queue.cancel_by_id(counterpart.id) {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(id = counterpart.id, "counterpart was not returned by the queue")
            }
            Err(e) => warn!(id = counterpart.id, error = %e, "counterpart cancellation failed"),
        }
        self.tracker.remove_pair(handle.id);

        let original = match counterpart.role {
            RaceRole::Original => handle.id,
            RaceRole::Replica => counterpart.id,
        };
        self.live.remove(&original);
    }

    /// Replicate every live, running, non-raced task that has outlived the
    /// straggler threshold.
    fn sweep_replicas(&mut self, multiplier: f64) -> Result<(), SchedulerError> {
        let Some(average) = self.queue.stats().average_good_duration() else {
            return Ok(());
        };
        let now = Utc::now();

        let stragglers: Vec<(TaskId, TaskSpec)> = self
            .live
            .iter()
            .filter(|(id, _)| !self.tracker.contains(**id))
            .filter_map(|(id, spec)| match self.queue.task_state(*id) {
                TaskState::Running { since }
                    if should_replicate(now, since, average, multiplier) =>
                {
                    Some((*id, spec.clone()))
                }
                _ => None,
            })
            .collect();

        for (id, spec) in stragglers {
            let replica_spec = spec
                .clone()
                .with_category(TaskCategory::Replica)
                .with_priority(spec.priority + self.priority_change);
            let replica = self.queue.submit(replica_spec)?;
            debug!(
                original = id,
                replica,
                average_secs = average.as_secs_f64(),
                multiplier,
                "straggler detected, submitted replica"
            );
            self.tracker.record(id, replica);
        }
        Ok(())
    }

    /// Number of live races, for diagnostics.
    pub fn races(&self) -> usize {
        self.tracker.len()
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// True when the underlying queue has drained — the caller's loop
    /// termination condition.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
