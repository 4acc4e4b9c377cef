//! Scheduler error types.

use thiserror::Error;

use specq_core::ConfigError;
use specq_queue::QueueError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}
