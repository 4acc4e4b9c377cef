pub mod error;
pub mod policy;
pub mod report;
pub mod scheduler;
pub mod tracker;

pub use error::SchedulerError;
pub use policy::should_replicate;
pub use report::{StatusLine, TaskTimes};
pub use scheduler::SpeculativeScheduler;
pub use tracker::{Counterpart, RaceRole, ReplicationTracker};
