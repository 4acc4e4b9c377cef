//! Dispatch queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("cannot create queue: {0}")]
    Create(String),

    #[error("queue closed: worker channel disconnected")]
    Closed,
}
