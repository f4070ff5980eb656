use thiserror::Error;

/// Errors that abort a job outright.
///
/// A failing step is not an error: it is recorded in the job report and
/// the remaining steps are skipped. Only cancellation and trouble
/// provisioning the job's working directories surface here.
#[derive(Debug, Error)]
pub enum RunnerError {
  #[error("job cancelled")]
  Cancelled,

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
