use thiserror::Error;

/// Errors that can occur during pipeline resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
  /// Invocation references a job template that does not exist.
  #[error("workflow '{workflow}' references unknown job '{job}'")]
  UnknownTemplate { workflow: String, job: String },

  /// `requires` names an invocation that does not exist in the workflow.
  #[error("workflow '{workflow}' job '{job}' requires unknown job '{requirement}'")]
  UnknownRequirement {
    workflow: String,
    job: String,
    requirement: String,
  },

  /// Two invocations expanded to the same instance name.
  #[error("workflow '{workflow}' expands duplicate job instance '{name}'")]
  DuplicateInstance { workflow: String, name: String },

  /// Cycle detected in the dependency graph.
  #[error("cycle detected in workflow '{workflow}'")]
  CycleDetected { workflow: String },
}
