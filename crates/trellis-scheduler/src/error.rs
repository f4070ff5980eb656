use thiserror::Error;
use trellis_runner::RunnerError;

/// Errors that abort a whole pipeline run.
///
/// Job failures are not errors: they surface as statuses in the run
/// report while unaffected branches of the graph keep executing.
#[derive(Debug, Error)]
pub enum SchedulerError {
  #[error("run cancelled")]
  Cancelled,

  #[error("job '{job}' execution error: {source}")]
  Runner {
    job: String,
    #[source]
    source: RunnerError,
  },

  #[error("job task join error: {message}")]
  Join { message: String },
}
