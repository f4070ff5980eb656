use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trellis_pipeline::PipelineStatus;
use trellis_runner::JobReport;

/// Full record of one pipeline run, suitable for persistence or display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
  pub run_id: String,
  pub workflow: String,
  pub status: PipelineStatus,
  /// Per-job reports, ordered by job name.
  pub jobs: Vec<JobReport>,
  /// Invocations excluded before execution by branch filters.
  pub filtered: Vec<String>,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
}

impl PipelineReport {
  /// Look up one job's report by instance name.
  pub fn job(&self, name: &str) -> Option<&JobReport> {
    self.jobs.iter().find(|report| report.job == name)
  }
}
