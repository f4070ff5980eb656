use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::filter::FilterDef;

/// A named dependency graph of job invocations plus trigger rules.
///
/// A workflow with schedule triggers fires only on schedule events; one
/// without fires on push events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  #[serde(default)]
  pub triggers: Vec<ScheduleDef>,
  pub jobs: Vec<WorkflowJobDef>,
}

/// One job invocation inside a workflow: which template to instantiate,
/// what it requires, when it applies, and how it fans out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowJobDef {
  /// Name of the job template to instantiate.
  pub job: String,

  /// Instance base name; defaults to the template name.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,

  /// Base names of invocations this one depends on. A requirement on a
  /// matrix-expanded invocation targets every sibling instance.
  #[serde(default)]
  pub requires: Vec<String>,

  /// Branch predicate evaluated before instantiation.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub filters: Option<FilterDef>,

  /// Parameter bindings expanded into sibling instances.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub matrix: Option<MatrixDef>,
}

impl WorkflowJobDef {
  /// The base name other invocations use in `requires`.
  pub fn base_name(&self) -> &str {
    self.name.as_deref().unwrap_or(&self.job)
  }
}

/// Matrix parameter bindings: each named parameter lists the values to bind,
/// and the invocation expands to the cartesian product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixDef {
  pub parameters: HashMap<String, Vec<serde_json::Value>>,
}

/// A cron-style schedule trigger. The expression is carried as data: the
/// core consumes schedule fires, it does not compute next-fire times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDef {
  pub cron: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub filters: Option<FilterDef>,
}

impl WorkflowDef {
  /// Structural validation. `name` is only used for error messages.
  pub fn validate(&self, name: &str, job_templates: &HashSet<&str>) -> Result<(), ConfigError> {
    if self.jobs.is_empty() {
      return Err(ConfigError::invalid(format!(
        "workflow '{}' has no jobs",
        name
      )));
    }

    let mut seen = HashSet::new();
    for invocation in &self.jobs {
      if !job_templates.contains(invocation.job.as_str()) {
        return Err(ConfigError::invalid(format!(
          "workflow '{}' references unknown job '{}'",
          name, invocation.job
        )));
      }
      if !seen.insert(invocation.base_name()) {
        return Err(ConfigError::invalid(format!(
          "workflow '{}' instantiates '{}' twice",
          name,
          invocation.base_name()
        )));
      }
      if let Some(matrix) = &invocation.matrix {
        if matrix.parameters.is_empty() {
          return Err(ConfigError::invalid(format!(
            "workflow '{}' job '{}' declares an empty matrix",
            name,
            invocation.base_name()
          )));
        }
        for (param, values) in &matrix.parameters {
          if values.is_empty() {
            return Err(ConfigError::invalid(format!(
              "workflow '{}' job '{}' matrix parameter '{}' has no values",
              name,
              invocation.base_name(),
              param
            )));
          }
        }
      }
    }

    // Requires may only reference invocations of this workflow.
    for invocation in &self.jobs {
      for required in &invocation.requires {
        if !seen.contains(required.as_str()) {
          return Err(ConfigError::invalid(format!(
            "workflow '{}' job '{}' requires unknown job '{}'",
            name,
            invocation.base_name(),
            required
          )));
        }
      }
    }

    for schedule in &self.triggers {
      if schedule.cron.trim().is_empty() {
        return Err(ConfigError::invalid(format!(
          "workflow '{}' has a schedule trigger with an empty cron expression",
          name
        )));
      }
    }

    Ok(())
  }

  /// Whether this workflow is driven by schedule fires rather than pushes.
  pub fn is_scheduled(&self) -> bool {
    !self.triggers.is_empty()
  }
}
