//! specq — straggler-mitigation tester.
//!
//! Submits a batch of tasks to a local dispatch queue through the
//! speculative scheduler, redraws queue status in place each wait cycle,
//! and reports per-task execution times once the queue drains.

use std::io::Write as _;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

use specq_core::{QueueConfig, SpeculationMode, TaskSpec};
use specq_queue::{LocalQueue, QueueStats};
use specq_scheduler::{SpeculativeScheduler, StatusLine, TaskTimes};

/// Climb back over the three status rows so the next cycle overwrites them.
const REDRAW_UP: &str = "\x1b[3A";
/// Step below the status table once the queue has drained.
const REDRAW_DONE: &str = "\x1b[3B";

/// Kind of work each task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TaskKind {
    /// Numeric sort over a per-task input file.
    Sort,
    /// Synthetic payload: read input, sleep, write output.
    Dummy,
}

/// Races redundant task copies against stragglers on a local dispatch queue.
#[derive(Parser, Debug)]
#[command(name = "specq", version, about)]
struct Cli {
    /// Kind of task to submit.
    #[arg(value_enum, default_value_t = TaskKind::Sort)]
    kind: TaskKind,

    /// Number of tasks to submit.
    #[arg(short = 'n', long, default_value_t = 10)]
    tasks: usize,

    /// Chance a dummy task runs for 2.5x the base runtime.
    #[arg(short, long, default_value_t = 0.1)]
    chance: f64,

    /// Base dummy task runtime in seconds.
    #[arg(short = 'r', long, default_value_t = 20)]
    runtime: u64,

    /// Wait timeout per scheduling cycle, in seconds (clamped to >= 10).
    #[arg(short = 't', long, default_value_t = 60)]
    wait_timeout: u64,

    /// Fast-abort multiplier, forwarded unchanged to the queue (<= 0 disables).
    #[arg(short = 'f', long, default_value_t = 0.0)]
    fast_abort: f64,

    /// Submit a lower-priority backup twin for every task.
    #[arg(short, long)]
    backup: bool,

    /// Replicate a task once it runs longer than MULTIPLIER times the
    /// average good task duration.
    #[arg(short = 's', long, value_name = "MULTIPLIER")]
    speculate: Option<f64>,

    /// Worker slots in the local queue.
    #[arg(long, env = "SPECQ_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Input file attached to every dummy task.
    #[arg(long, default_value = "input.0")]
    input: String,
}

/// Sort task: real work over a per-task input file, uncached.
fn sort_task(ntask: usize) -> TaskSpec {
    let command = format!(
        "sort -g --parallel=1 -o outfile infile > task-{:03}.log 2>&1",
        ntask
    );
    TaskSpec::new(command)
        .with_input(format!("input{}", ntask), "infile", false)
        .with_output(format!("output.{}", ntask), "outfile")
        .with_output(format!("task-{:03}.log", ntask), "task.log")
        .with_cores(1)
}

/// Dummy task: the specq-work payload with a shared, cacheable input.
fn dummy_task(ntask: usize, cli: &Cli) -> TaskSpec {
    let command = format!(
        "./specq-work infile outfile {} {} > task-{:03}.log 2>&1",
        cli.runtime, cli.chance, ntask
    );
    TaskSpec::new(command)
        .with_input("specq-work", "specq-work", true)
        .with_input(&cli.input, "infile", true)
        .with_output(format!("output.{}", ntask), "outfile")
        .with_output(format!("task-{:03}.log", ntask), "task.log")
        .with_cores(1)
}

/// Status table plus the cursor climb that makes the next print overwrite it.
fn redraw_frame(stats: &QueueStats) -> String {
    format!("{}\n{}", StatusLine::render(stats), REDRAW_UP)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let started = Instant::now();

    let mode = SpeculationMode::from_flags(cli.backup, cli.speculate)
        .context("invalid speculation configuration")?;
    match mode {
        SpeculationMode::Disabled => info!("speculative execution disabled"),
        SpeculationMode::Backup => info!("backup tasks activated"),
        SpeculationMode::Threshold(m) => {
            info!(multiplier = m, "speculative execution activated")
        }
    }

    let wait_timeout = Duration::from_secs(cli.wait_timeout.max(10));
    let config = QueueConfig {
        workers: cli.workers,
        fast_abort: cli.fast_abort,
    };
    let queue = LocalQueue::new(&config).context("cannot create queue")?;
    if cli.fast_abort > 0.0 {
        info!(multiplier = cli.fast_abort, "fast abort activated");
    }

    let mut scheduler = SpeculativeScheduler::new(queue, mode);

    info!(count = cli.tasks, kind = ?cli.kind, "submitting tasks");
    for i in 0..cli.tasks {
        let spec = match cli.kind {
            TaskKind::Sort => sort_task(i),
            TaskKind::Dummy => dummy_task(i, &cli),
        };
        let id = scheduler.submit(spec)?;
        info!(id, "submitted task");
    }

    let mut times = TaskTimes::new();
    while !scheduler.is_empty() {
        if let Some(handle) = scheduler.wait(wait_timeout)? {
            if handle.result.is_success() {
                times.record(handle.id, handle.execute_time.unwrap_or_default());
            } else {
                println!("Task {} failed: {}", handle.id, handle.result);
            }
        }
        print!("{}", redraw_frame(&scheduler.stats()));
        let _ = std::io::stdout().flush();
    }
    println!("{}", REDRAW_DONE);

    println!();
    print!("{}", times.render_report());
    println!("Done");
    println!("Total program time: {:.2} secs", started.elapsed().as_secs_f64());
    Ok(())
}
