//! Pipeline scheduling and orchestration.
//!
//! The scheduler walks a resolved [`trellis_pipeline::Pipeline`] in
//! dependency waves: whenever every upstream dependency of a job has
//! succeeded, the job is dispatched to a [`trellis_runner::JobRunner`],
//! with sibling jobs running concurrently up to a configured bound. A
//! failed job marks its descendants skipped while independent branches
//! continue, and the whole run is folded into a [`PipelineReport`].

mod error;
mod events;
mod report;
mod scheduler;

pub use error::SchedulerError;
pub use events::{ChannelNotifier, NoopNotifier, PipelineEvent, PipelineNotifier};
pub use report::PipelineReport;
pub use scheduler::{PipelineScheduler, SchedulerConfig};
