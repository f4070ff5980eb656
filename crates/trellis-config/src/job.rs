use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::step::StepDef;

/// A named job template: an ordered step sequence executed in an isolated
/// environment. Variants are produced by binding matrix parameters to a
/// template; the template itself is immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDef {
  /// Declared execution image (e.g. `python:{{ parameters.version }}`).
  /// Informational to the core: carried on the instance, not interpreted.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image: Option<String>,

  /// Job-level environment variables; values may be templates.
  #[serde(default)]
  pub env: HashMap<String, String>,

  /// Declared parallelism factor, carried as data.
  #[serde(default = "default_parallelism")]
  pub parallelism: u32,

  /// Optional wall-clock limit for the whole job.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,

  pub steps: Vec<StepDef>,
}

fn default_parallelism() -> u32 {
  1
}

impl JobDef {
  /// Structural validation. `name` is only used for error messages.
  pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
    if self.steps.is_empty() {
      return Err(ConfigError::invalid(format!("job '{}' has no steps", name)));
    }
    if self.parallelism == 0 {
      return Err(ConfigError::invalid(format!(
        "job '{}' declares parallelism 0",
        name
      )));
    }

    for (idx, step) in self.steps.iter().enumerate() {
      if let StepDef::Run { command, .. } = step {
        if command.trim().is_empty() {
          return Err(ConfigError::invalid(format!(
            "job '{}' step {} has an empty command",
            name, idx
          )));
        }
      }
      if let StepDef::RestoreCache { keys } = step {
        if keys.is_empty() {
          return Err(ConfigError::invalid(format!(
            "job '{}' step {} restores a cache with no candidate keys",
            name, idx
          )));
        }
      }
    }

    self.validate_guard_placement(name)
  }

  /// The version guard is pure validation and has to run before any step
  /// that mutates state outside the job directory.
  fn validate_guard_placement(&self, name: &str) -> Result<(), ConfigError> {
    let first_mutating = self.steps.iter().position(StepDef::is_mutating);
    let last_guard = self
      .steps
      .iter()
      .rposition(|s| matches!(s, StepDef::CheckVersion { .. }));

    if let (Some(mutating), Some(guard)) = (first_mutating, last_guard) {
      if mutating < guard {
        return Err(ConfigError::invalid(format!(
          "job '{}': check_version at step {} must precede the mutating step at {}",
          name, guard, mutating
        )));
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn job(steps: serde_json::Value) -> JobDef {
    serde_json::from_value(json!({ "steps": steps })).unwrap()
  }

  #[test]
  fn test_defaults() {
    let def = job(json!([{ "type": "checkout" }]));
    assert_eq!(def.parallelism, 1);
    assert!(def.env.is_empty());
    assert!(def.image.is_none());
    assert!(def.validate("build").is_ok());
  }

  #[test]
  fn test_rejects_empty_steps() {
    let def = job(json!([]));
    assert!(def.validate("build").is_err());
  }

  #[test]
  fn test_rejects_empty_command() {
    let def = job(json!([{ "type": "run", "command": "  " }]));
    assert!(def.validate("build").is_err());
  }

  #[test]
  fn test_guard_must_precede_mutating_steps() {
    let bad = job(json!([
      { "type": "checkout" },
      { "type": "save_cache", "key": "k", "paths": ["deps"] },
      { "type": "check_version", "version": "1.0", "files": ["setup.py"] }
    ]));
    assert!(bad.validate("deploy").is_err());

    let good = job(json!([
      { "type": "checkout" },
      { "type": "check_version", "version": "1.0", "files": ["setup.py"] },
      { "type": "save_cache", "key": "k", "paths": ["deps"] }
    ]));
    assert!(good.validate("deploy").is_ok());
  }
}
