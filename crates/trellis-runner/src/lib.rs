//! Job execution.
//!
//! A [`JobRunner`] takes one resolved job instance and walks its steps in
//! order inside an isolated working directory: checkout, shell commands,
//! cache restore/save, workspace attach/persist, artifact collection, the
//! version guard and release publication. Step failures are captured in
//! the [`JobReport`] rather than returned as errors, so a pipeline can
//! keep scheduling unaffected branches of the graph.

mod command;
mod error;
mod guard;
mod report;
mod runner;
mod template;

pub use error::RunnerError;
pub use guard::version_mismatches;
pub use report::{JobReport, StepReport};
pub use runner::JobRunner;
