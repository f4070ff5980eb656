//! Trellis Pipeline
//!
//! This crate provides the resolved pipeline representation for Trellis.
//! A resolved pipeline is a validated, expanded form of a pipeline
//! configuration that is ready for scheduling.
//!
//! Key differences from `trellis-config`:
//! - Matrix invocations are expanded into concrete sibling job instances
//! - Branch filters have been evaluated against the triggering event
//! - `requires` edges are rewritten to reference expanded instance names
//! - Entry points are identified for scheduling

mod context;
mod graph;
mod pipeline;
mod status;

pub use context::{RunContext, TriggerEvent, TriggerKind};
pub use graph::Graph;
pub use pipeline::{JobInstance, Pipeline};
pub use status::{JobStatus, PipelineStatus, StepStatus};
