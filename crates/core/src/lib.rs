pub mod config;
pub mod error;
pub mod task;

pub use config::{QueueConfig, SpeculationMode};
pub use error::ConfigError;
pub use task::*;
