pub mod error;
pub mod local;
pub mod queue;

pub use error::QueueError;
pub use local::LocalQueue;
pub use queue::{DispatchQueue, QueueStats, MIN_GOOD_SAMPLES};
