//! Bidirectional original/replica bookkeeping.

use std::collections::HashMap;

use specq_core::TaskId;

/// Which side of a race a task is.
///
/// Stored explicitly so reconciliation never has to infer roles from the
/// display category on the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceRole {
    Original,
    Replica,
}

/// The other half of a race, from the perspective of the id used to look
/// it up. `role` is the role of the *looked-up* task, not the counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counterpart {
    pub id: TaskId,
    pub role: RaceRole,
}

/// Authoritative record of which tasks are racing a twin.
///
/// Every race is stored as two entries (original→replica and
/// replica→original) so lookups from either side are O(1) and removing a
/// race clears both directions in one call.
#[derive(Debug, Default)]
pub struct ReplicationTracker {
    entries: HashMap<TaskId, Counterpart>,
}

impl ReplicationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a race between an original and its freshly submitted replica.
    /// A task may be in at most one race; recording over a live race is a
    /// bug in the caller.
    pub fn record(&mut self, original: TaskId, replica: TaskId) {
        debug_assert!(
            !self.entries.contains_key(&original) && !self.entries.contains_key(&replica),
            "task {} or {} already raced",
            original,
            replica
        );
        self.entries.insert(
            original,
            Counterpart {
                id: replica,
                role: RaceRole::Original,
            },
        );
        self.entries.insert(
            replica,
            Counterpart {
                id: original,
                role: RaceRole::Replica,
            },
        );
    }

    /// Look up the counterpart of `id`, if it is currently racing.
    pub fn resolve(&self, id: TaskId) -> Option<Counterpart> {
        self.entries.get(&id).copied()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Remove the race `id` belongs to, clearing both directions. No-op when
    /// `id` is not racing — reconciliation may arrive after a concurrent
    /// cancellation already cleared the pair.
    pub fn remove_pair(&mut self, id: TaskId) {
        if let Some(counterpart) = self.entries.remove(&id) {
            self.entries.remove(&counterpart.id);
        }
    }

    /// Number of live races (not entries).
    pub fn len(&self) -> usize {
        self.entries.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_symmetry() {
        let mut tracker = ReplicationTracker::new();
        tracker.record(1, 7);

        let fwd = tracker.resolve(1).unwrap();
        assert_eq!(fwd.id, 7);
        assert_eq!(fwd.role, RaceRole::Original);

        let back = tracker.resolve(7).unwrap();
        assert_eq!(back.id, 1);
        assert_eq!(back.role, RaceRole::Replica);
    }

    #[test]
    fn remove_pair_clears_both_directions() {
        let mut tracker = ReplicationTracker::new();
        tracker.record(1, 7);
        tracker.remove_pair(1);
        assert!(tracker.resolve(1).is_none());
        assert!(tracker.resolve(7).is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn remove_pair_by_either_side() {
        let mut tracker = ReplicationTracker::new();
        tracker.record(1, 7);
        tracker.remove_pair(7);
        assert!(tracker.resolve(1).is_none());
        assert!(tracker.resolve(7).is_none());
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut tracker = ReplicationTracker::new();
        tracker.record(1, 7);
        tracker.remove_pair(42);
        assert_eq!(tracker.len(), 1);
        // removing twice is equally harmless
        tracker.remove_pair(1);
        tracker.remove_pair(1);
        assert!(tracker.is_empty());
    }

    #[test]
    fn at_most_one_counterpart_per_task() {
        let mut tracker = ReplicationTracker::new();
        tracker.record(1, 7);
        tracker.record(2, 8);
        assert_eq!(tracker.len(), 2);

        // each id resolves to exactly one counterpart
        assert_eq!(tracker.resolve(1).unwrap().id, 7);
        assert_eq!(tracker.resolve(2).unwrap().id, 8);
        assert!(tracker.contains(7));
        assert!(tracker.contains(8));
    }
}
