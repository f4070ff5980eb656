use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trellis_pipeline::{JobStatus, StepStatus};

/// Outcome of a single step within a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
  pub label: String,
  pub status: StepStatus,
  /// Failure message, or a noteworthy success detail such as the cache
  /// key that hit or the publish outcome.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub detail: Option<String>,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
}

impl StepReport {
  /// Report for a step that never ran because an earlier step failed.
  pub(crate) fn skipped(label: impl Into<String>) -> Self {
    let now = Utc::now();
    Self {
      label: label.into(),
      status: StepStatus::Skipped,
      detail: None,
      started_at: now,
      finished_at: now,
    }
  }
}

/// Outcome of one job instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
  pub job: String,
  pub status: JobStatus,
  pub steps: Vec<StepReport>,
  /// Paths recorded by store_artifacts steps, under the run's artifact
  /// root.
  pub artifacts: Vec<PathBuf>,
  /// Paths recorded by store_test_results steps.
  pub test_results: Vec<PathBuf>,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
}

impl JobReport {
  /// Report for a job that never started because an upstream dependency
  /// did not succeed.
  pub fn skipped(job: impl Into<String>) -> Self {
    let now = Utc::now();
    Self {
      job: job.into(),
      status: JobStatus::Skipped,
      steps: Vec::new(),
      artifacts: Vec::new(),
      test_results: Vec::new(),
      started_at: now,
      finished_at: now,
    }
  }
}
