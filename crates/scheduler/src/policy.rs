//! Straggler detection policy.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Decide whether a running task is a straggler.
///
/// True iff the task has been running at least `average_good * multiplier`.
/// The threshold is inclusive: a task exactly at the trigger is replicated.
/// Pure so the policy can be tuned and tested without touching the
/// tracker/queue machinery.
pub fn should_replicate(
    now: DateTime<Utc>,
    commit_start: DateTime<Utc>,
    average_good: Duration,
    multiplier: f64,
) -> bool {
    let elapsed = match (now - commit_start).to_std() {
        Ok(d) => d,
        // clock skew put the start in the future; not a straggler
        Err(_) => return false,
    };
    elapsed.as_secs_f64() >= average_good.as_secs_f64() * multiplier
}
