use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use trellis_config::StepDef;

use crate::graph::Graph;

/// A fully expanded workflow ready for scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
  /// Name of the workflow this pipeline was expanded from.
  pub workflow: String,
  pub jobs: HashMap<String, JobInstance>,
  /// Dependency edges as (dependency, dependent) pairs.
  pub edges: Vec<(String, String)>,
  /// Instance names pruned by branch filters, including their transitive
  /// dependents. Reported, never scheduled.
  pub filtered: Vec<String>,
}

impl Pipeline {
  /// Build the graph structure for traversal.
  pub fn graph(&self) -> Graph {
    Graph::new(&self.jobs, &self.edges)
  }

  pub fn get_job(&self, name: &str) -> Option<&JobInstance> {
    self.jobs.get(name)
  }

  /// True when every invocation was pruned by filters.
  pub fn is_empty(&self) -> bool {
    self.jobs.is_empty()
  }
}

/// One concrete job: a template bound to a parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInstance {
  /// Unique name within the pipeline, e.g. `build-3.9`.
  pub name: String,
  /// Name of the job template this instance was expanded from.
  pub template: String,
  pub image: Option<String>,
  pub env: HashMap<String, String>,
  /// Matrix bindings for this instance; empty when not matrix-expanded.
  pub parameters: HashMap<String, serde_json::Value>,
  pub steps: Vec<StepDef>,
  pub timeout_ms: Option<u64>,
  pub parallelism: u32,
}
