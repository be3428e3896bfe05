//! Time windows: scheduling, state and the runtime that drives them.

pub mod runtime;
pub mod scheduler;
pub mod state;

pub use runtime::{RuntimeHandle, SentimentRuntime};
pub use scheduler::{PartitionScheduler, PartitionSummary, SchedulerContext};
pub use state::{WindowEvent, WindowLifecycle, WindowPhase};
