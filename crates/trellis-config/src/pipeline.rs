use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::job::JobDef;
use crate::workflow::WorkflowDef;

/// The root of a pipeline document: job templates, workflows wiring them
/// together, and pipeline-level default parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDef {
  pub name: String,

  /// Defaults merged under trigger-supplied parameters.
  #[serde(default)]
  pub parameters: HashMap<String, serde_json::Value>,

  /// Pipeline-wide environment variables, layered under each job's own.
  #[serde(default)]
  pub env: HashMap<String, String>,

  pub jobs: HashMap<String, JobDef>,
  pub workflows: HashMap<String, WorkflowDef>,
}

impl PipelineDef {
  pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
    let def: PipelineDef = serde_json::from_str(raw)?;
    def.validate()?;
    Ok(def)
  }

  /// Structural validation of the whole document. Graph-level checks that
  /// need the expanded instance set (cycles across matrix siblings) live in
  /// the resolver.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.name.trim().is_empty() {
      return Err(ConfigError::invalid("pipeline name is empty"));
    }
    if self.jobs.is_empty() {
      return Err(ConfigError::invalid(format!(
        "pipeline '{}' defines no jobs",
        self.name
      )));
    }
    if self.workflows.is_empty() {
      return Err(ConfigError::invalid(format!(
        "pipeline '{}' defines no workflows",
        self.name
      )));
    }

    for (name, job) in &self.jobs {
      job.validate(name)?;
    }

    let templates: HashSet<&str> = self.jobs.keys().map(String::as_str).collect();
    for (name, workflow) in &self.workflows {
      workflow.validate(name, &templates)?;
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn minimal() -> serde_json::Value {
    json!({
      "name": "notebooker",
      "jobs": {
        "build": {
          "steps": [
            { "type": "checkout" },
            { "type": "run", "command": "make build" }
          ]
        }
      },
      "workflows": {
        "main": { "jobs": [{ "job": "build" }] }
      }
    })
  }

  #[test]
  fn test_parse_minimal() {
    let def = PipelineDef::from_json(&minimal().to_string()).unwrap();
    assert_eq!(def.name, "notebooker");
    assert_eq!(def.jobs.len(), 1);
    assert!(def.parameters.is_empty());
  }

  #[test]
  fn test_rejects_empty_jobs() {
    let mut doc = minimal();
    doc["jobs"] = json!({});
    doc["workflows"] = json!({});
    assert!(PipelineDef::from_json(&doc.to_string()).is_err());
  }

  #[test]
  fn test_rejects_workflow_with_unknown_job() {
    let mut doc = minimal();
    doc["workflows"]["main"]["jobs"][0]["job"] = json!("missing");
    assert!(PipelineDef::from_json(&doc.to_string()).is_err());
  }

  #[test]
  fn test_rejects_malformed_document() {
    assert!(PipelineDef::from_json("{ not json").is_err());
  }

  #[test]
  fn test_pipeline_parameters_carried() {
    let mut doc = minimal();
    doc["parameters"] = json!({ "registry": "docker.io" });
    let def = PipelineDef::from_json(&doc.to_string()).unwrap();
    assert_eq!(def.parameters["registry"], json!("docker.io"));
  }

  #[test]
  fn test_pipeline_env_carried() {
    let mut doc = minimal();
    doc["env"] = json!({ "PIP_INDEX_URL": "https://pypi.internal" });
    let def = PipelineDef::from_json(&doc.to_string()).unwrap();
    assert_eq!(def.env["PIP_INDEX_URL"], "https://pypi.internal");
  }
}
