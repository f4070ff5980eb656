//! Trellis Resolver
//!
//! Transforms a `PipelineDef` plus a triggering event into schedulable
//! [`Pipeline`]s. Resolution:
//! 1. Selects the workflows the trigger addresses (push vs. schedule)
//! 2. Expands matrix invocations into concrete sibling instances
//! 3. Rewrites `requires` edges to reference expanded instance names
//! 4. Validates the instance graph (no duplicates, no cycles)
//! 5. Prunes invocations whose branch filters reject the triggering
//!    branch, together with everything downstream of them

mod error;
mod resolver;

pub use error::ResolveError;
pub use resolver::{resolve, resolve_workflow};

pub use trellis_pipeline::Pipeline;
