//! Human-readable progress and final reporting.

use std::fmt::Write as _;
use std::time::Duration;

use specq_core::TaskId;
use specq_queue::QueueStats;

/// The periodic three-row status table the tester prints each wait cycle.
pub struct StatusLine;

impl StatusLine {
    /// Render worker/task counts and the running average task time.
    ///
    /// Unlike the straggler threshold, the displayed average has no minimum
    /// sample count — it is informational only.
    pub fn render(stats: &QueueStats) -> String {
        let avg_secs = if stats.tasks_done > 0 {
            let total =
                stats.time_execute_good + stats.time_send_good + stats.time_receive_good;
            total.as_secs_f64() / stats.tasks_done as f64
        } else {
            0.0
        };
        format!(
            "|      Workers     ||               Tasks                 |\n\
             | Connected | Busy || Waiting | Running | Done | Avg Time |\n\
             | {:>9} | {:>4} || {:>7} | {:>7} | {:>4} | {:>8.2} |",
            stats.workers_connected,
            stats.workers_busy,
            stats.tasks_waiting,
            stats.tasks_running,
            stats.tasks_done,
            avg_secs,
        )
    }
}

/// Accumulates per-task measured execution times for the final report.
#[derive(Debug, Default)]
pub struct TaskTimes {
    entries: Vec<(TaskId, Duration)>,
}

impl TaskTimes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: TaskId, execute_time: Duration) {
        self.entries.push((id, execute_time));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Per-task listing emitted once the live set drains to empty.
    pub fn render_report(&self) -> String {
        let mut out = String::from("Task execution times:\n");
        for (id, time) in &self.entries {
            let _ = writeln!(out, "Taskid {}: {:>6.2}", id, time.as_secs_f64());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_counts_and_average() {
        let stats = QueueStats {
            workers_connected: 12,
            workers_busy: 3,
            tasks_waiting: 7,
            tasks_running: 3,
            tasks_done: 4,
            time_execute_good: Duration::from_secs(40),
            ..Default::default()
        };
        let rendered = StatusLine::render(&stats);
        assert_eq!(rendered.lines().count(), 3);
        assert!(rendered.contains("|        12 |    3 ||       7 |       3 |    4 |    10.00 |"));
    }

    #[test]
    fn status_line_no_completions_yet() {
        let rendered = StatusLine::render(&QueueStats::default());
        assert!(rendered.contains("0.00"));
    }

    #[test]
    fn final_report_lists_each_task() {
        let mut times = TaskTimes::new();
        times.record(3, Duration::from_millis(12_500));
        times.record(1, Duration::from_secs(9));
        assert_eq!(times.len(), 2);

        let report = times.render_report();
        assert!(report.starts_with("Task execution times:"));
        assert!(report.contains("Taskid 3:  12.50"));
        assert!(report.contains("Taskid 1:   9.00"));
    }
}
