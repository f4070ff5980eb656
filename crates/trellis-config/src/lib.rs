//! Trellis Config
//!
//! This crate contains the serializable pipeline definition types for Trellis.
//! A pipeline definition declares named job templates (ordered step sequences
//! with an environment and an execution image), and workflows that wire job
//! invocations into a dependency graph with branch filters, matrix parameter
//! bindings, and optional schedule triggers.
//!
//! Definitions are loaded from JSON files (via the CLI with a path argument)
//! and validated structurally here. The resolver takes these definition types,
//! expands matrix bindings, applies branch filters, and produces the locked
//! pipeline structures that the scheduler executes.

mod error;
mod filter;
mod job;
mod pipeline;
mod step;
mod workflow;

pub use error::ConfigError;
pub use filter::{BranchFilterDef, FilterDef};
pub use job::JobDef;
pub use pipeline::PipelineDef;
pub use step::{RunWhen, StepDef};
pub use workflow::{MatrixDef, ScheduleDef, WorkflowDef, WorkflowJobDef};
