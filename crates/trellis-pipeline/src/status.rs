use serde::{Deserialize, Serialize};

/// Terminal status of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
  Succeeded,
  Failed,
  /// Not executed because an earlier step failed and this one is not
  /// marked always-run.
  Skipped,
}

/// Terminal status of one job instance. Exactly one of these per job,
/// there is no partial-success state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
  Succeeded,
  Failed,
  /// Never started because an upstream dependency did not succeed.
  Skipped,
}

impl JobStatus {
  pub fn is_success(&self) -> bool {
    matches!(self, JobStatus::Succeeded)
  }
}

/// Terminal status of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
  Succeeded,
  Failed,
}

impl PipelineStatus {
  /// Conjunction over instantiated jobs: failed if any job failed.
  /// Skips only arise downstream of a failure, so they never flip a run
  /// to failed on their own.
  pub fn from_jobs<'a>(statuses: impl IntoIterator<Item = &'a JobStatus>) -> Self {
    let any_failed = statuses
      .into_iter()
      .any(|status| matches!(status, JobStatus::Failed));
    if any_failed {
      PipelineStatus::Failed
    } else {
      PipelineStatus::Succeeded
    }
  }
}
