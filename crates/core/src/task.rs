//! Task types shared between the dispatch queue and the speculative scheduler.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique task identifier, assigned by the dispatch queue at submission and
/// stable for the task's lifetime.
pub type TaskId = u64;

/// Why a task exists. Diagnostics only — scheduling decisions never branch
/// on the category label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskCategory {
    /// A caller-submitted task.
    Normal,
    /// A redundant copy submitted together with its original, at reduced priority.
    Backup,
    /// A redundant copy submitted once its original is judged a straggler,
    /// at boosted priority.
    Replica,
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskCategory::Normal => write!(f, "normal"),
            TaskCategory::Backup => write!(f, "backup"),
            TaskCategory::Replica => write!(f, "replica"),
        }
    }
}

/// Final status of a completed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskResult {
    Success,
    Failed(String),
    Cancelled,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskResult::Success)
    }
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskResult::Success => write!(f, "success"),
            TaskResult::Failed(reason) => write!(f, "failed: {}", reason),
            TaskResult::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Where a task sits in the queue's lifecycle.
///
/// `Running.since` is the commit-start timestamp: when the task began
/// executing on a worker. The replica sweep reads elapsed time from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running { since: DateTime<Utc> },
    Done,
    /// The queue has no record of this id (never submitted, or already
    /// returned and forgotten).
    Unknown,
}

/// Direction of a file attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileDirection {
    Input,
    Output,
}

/// A file transferred between the submit side and the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    /// Path on the submitting host.
    pub local: String,
    /// Name the worker sees.
    pub remote: String,
    pub direction: FileDirection,
    /// Whether the worker may keep the file across tasks.
    pub cache: bool,
}

/// Per-task resource request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub cores: u32,
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self { cores: 1 }
    }
}

/// Everything needed to run a task: command, files, resources, and the
/// scheduling metadata (category, priority).
///
/// Cloning a `TaskSpec` and overriding its metadata is how backup and
/// replica copies are made — the clone carries the same command, file
/// specs, and resource request as the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub command: String,
    pub category: TaskCategory,
    pub priority: i64,
    pub files: Vec<FileSpec>,
    pub resources: ResourceRequest,
}

impl TaskSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            category: TaskCategory::Normal,
            priority: 0,
            files: Vec::new(),
            resources: ResourceRequest::default(),
        }
    }

    pub fn with_input(mut self, local: impl Into<String>, remote: impl Into<String>, cache: bool) -> Self {
        self.files.push(FileSpec {
            local: local.into(),
            remote: remote.into(),
            direction: FileDirection::Input,
            cache,
        });
        self
    }

    pub fn with_output(mut self, local: impl Into<String>, remote: impl Into<String>) -> Self {
        self.files.push(FileSpec {
            local: local.into(),
            remote: remote.into(),
            direction: FileDirection::Output,
            cache: false,
        });
        self
    }

    pub fn with_category(mut self, category: TaskCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_cores(mut self, cores: u32) -> Self {
        self.resources = ResourceRequest { cores };
        self
    }
}

/// A completed (or cancelled) task as returned by the dispatch queue.
///
/// Owned by the queue while the task is live; handed back to the caller on
/// `wait` or `cancel_by_id`.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub id: TaskId,
    pub spec: TaskSpec,
    pub submitted_at: DateTime<Utc>,
    /// When execution began on a worker. `None` if the task never started.
    pub commit_start_time: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: TaskResult,
    /// Measured wall-clock execution time, set on success.
    pub execute_time: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_display() {
        assert_eq!(TaskCategory::Normal.to_string(), "normal");
        assert_eq!(TaskCategory::Backup.to_string(), "backup");
        assert_eq!(TaskCategory::Replica.to_string(), "replica");
    }

    #[test]
    fn spec_clone_preserves_payload() {
        let spec = TaskSpec::new("./wq-work infile 800 outfile 500")
            .with_input("wq-work", "wq-work", true)
            .with_input("input.0", "infile", true)
            .with_output("task-000.log", "task.log")
            .with_priority(5);

        let replica = spec
            .clone()
            .with_category(TaskCategory::Replica)
            .with_priority(spec.priority + 10);

        assert_eq!(replica.command, spec.command);
        assert_eq!(replica.files, spec.files);
        assert_eq!(replica.resources, spec.resources);
        assert_eq!(replica.category, TaskCategory::Replica);
        assert_eq!(replica.priority, 15);
        // original untouched
        assert_eq!(spec.category, TaskCategory::Normal);
        assert_eq!(spec.priority, 5);
    }

    #[test]
    fn default_resources_one_core() {
        assert_eq!(ResourceRequest::default().cores, 1);
    }

    #[test]
    fn result_success_check() {
        assert!(TaskResult::Success.is_success());
        assert!(!TaskResult::Failed("exit 1".to_string()).is_success());
        assert!(!TaskResult::Cancelled.is_success());
    }
}
