use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Failure policy for a step.
///
/// `OnSuccess` steps are skipped once an earlier step has failed; `Always`
/// steps run regardless, so test reports and other diagnostics can be
/// collected from a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunWhen {
  #[default]
  OnSuccess,
  Always,
}

/// One unit of work inside a job: a built-in action or an opaque command.
///
/// String fields are minijinja templates rendered at execution time against
/// the run context (`branch`, `revision`, `trigger`, `job`, `parameters`),
/// plus a `checksum(path)` function for cache keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepDef {
  /// Materialize the run's source tree into the job directory.
  Checkout,

  /// Run an opaque shell command.
  Run {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    command: String,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    working_dir: Option<String>,
    #[serde(default)]
    when: RunWhen,
  },

  /// Restore the first cache snapshot found among the candidate keys.
  /// A total miss is a no-op, never a failure.
  RestoreCache { keys: Vec<String> },

  /// Store the named paths under one explicit cache key.
  SaveCache { key: String, paths: Vec<String> },

  /// Copy a previously persisted workspace namespace into the job directory.
  AttachWorkspace { namespace: String },

  /// Persist paths from the job directory into a run-scoped namespace.
  /// Write-once per run.
  PersistToWorkspace { namespace: String, paths: Vec<String> },

  /// Collect files for the run report's artifact listing.
  StoreArtifacts {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination: Option<String>,
  },

  /// Collect structured test-result files for the run report.
  StoreTestResults { path: String },

  /// Verify the version identifier appears verbatim in every listed file.
  /// Pure validation: fails the job on any miss, mutates nothing.
  CheckVersion { version: String, files: Vec<String> },

  /// Publish a tagged release through the configured release sink.
  PublishRelease {
    tag: String,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    body_file: Option<String>,
    #[serde(default)]
    assets: Vec<String>,
    #[serde(default = "default_skip_existing")]
    skip_existing: bool,
  },
}

fn default_skip_existing() -> bool {
  true
}

impl StepDef {
  /// Short human-readable label used in reports and events.
  pub fn label(&self) -> String {
    match self {
      StepDef::Checkout => "checkout".to_string(),
      StepDef::Run { name, command, .. } => name
        .clone()
        .unwrap_or_else(|| format!("run: {}", first_line(command))),
      StepDef::RestoreCache { .. } => "restore_cache".to_string(),
      StepDef::SaveCache { .. } => "save_cache".to_string(),
      StepDef::AttachWorkspace { namespace } => format!("attach_workspace: {}", namespace),
      StepDef::PersistToWorkspace { namespace, .. } => {
        format!("persist_to_workspace: {}", namespace)
      }
      StepDef::StoreArtifacts { .. } => "store_artifacts".to_string(),
      StepDef::StoreTestResults { .. } => "store_test_results".to_string(),
      StepDef::CheckVersion { .. } => "check_version".to_string(),
      StepDef::PublishRelease { tag, .. } => format!("publish_release: {}", tag),
    }
  }

  /// Whether this step still runs after an earlier step has failed.
  pub fn runs_always(&self) -> bool {
    matches!(
      self,
      StepDef::Run {
        when: RunWhen::Always,
        ..
      }
    )
  }

  /// Whether this step performs a mutating side effect outside the job
  /// directory. The version guard must precede all of these.
  pub fn is_mutating(&self) -> bool {
    matches!(
      self,
      StepDef::SaveCache { .. } | StepDef::PersistToWorkspace { .. } | StepDef::PublishRelease { .. }
    )
  }
}

fn first_line(command: &str) -> &str {
  command.lines().next().unwrap_or(command).trim()
}
