//! Configuration error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("backup tasks and speculative execution cannot be enabled together")]
    ConflictingModes,

    #[error("invalid speculation multiplier: {0}")]
    InvalidMultiplier(f64),

    #[error("worker count must be at least 1")]
    NoWorkers,
}
