//! Pipeline scheduler implementation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use trellis_pipeline::{Graph, JobStatus, Pipeline, PipelineStatus};
use trellis_runner::{JobReport, JobRunner, RunnerError};

use crate::error::SchedulerError;
use crate::events::{NoopNotifier, PipelineEvent, PipelineNotifier};
use crate::report::PipelineReport;

/// Configuration for the pipeline scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
  /// Upper bound on concurrently executing jobs.
  pub max_parallel_jobs: usize,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self {
      max_parallel_jobs: 4,
    }
  }
}

/// The pipeline scheduler.
///
/// Dispatches a resolved [`Pipeline`] in dependency waves: every job
/// whose upstream dependencies have succeeded runs concurrently, bounded
/// by [`SchedulerConfig::max_parallel_jobs`]. A failed job marks all of
/// its descendants skipped; branches that do not depend on it keep
/// running to completion.
pub struct PipelineScheduler {
  runner: Arc<JobRunner>,
  notifier: Arc<dyn PipelineNotifier>,
  config: SchedulerConfig,
}

impl PipelineScheduler {
  pub fn new(runner: JobRunner) -> Self {
    Self {
      runner: Arc::new(runner),
      notifier: Arc::new(NoopNotifier),
      config: SchedulerConfig::default(),
    }
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn PipelineNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn with_config(mut self, config: SchedulerConfig) -> Self {
    self.config = config;
    self
  }

  /// Execute every job of the pipeline and assemble the run report.
  #[instrument(
    name = "pipeline_run",
    skip(self, pipeline, cancel),
    fields(
      run_id = %self.runner.context().run_id,
      workflow = %pipeline.workflow,
    )
  )]
  pub async fn run(
    &self,
    pipeline: &Pipeline,
    cancel: CancellationToken,
  ) -> Result<PipelineReport, SchedulerError> {
    let started_at = Utc::now();
    let run_id = self.runner.context().run_id.clone();

    info!(
      jobs = pipeline.jobs.len(),
      filtered = pipeline.filtered.len(),
      "pipeline_started"
    );
    self.notifier.notify(PipelineEvent::PipelineStarted {
      run_id: run_id.clone(),
      workflow: pipeline.workflow.clone(),
    });

    let graph = pipeline.graph();
    // A zero bound would never grant a permit and stall the run.
    let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_jobs.max(1)));
    let mut reports: HashMap<String, JobReport> = HashMap::new();

    loop {
      if cancel.is_cancelled() {
        warn!("pipeline cancelled");
        return Err(SchedulerError::Cancelled);
      }

      let ready = find_ready_jobs(pipeline, &graph, &reports);
      if ready.is_empty() {
        break;
      }

      info!(ready = ?ready, "dispatching_ready_jobs");
      let handles = self.dispatch(pipeline, &ready, &run_id, &semaphore, &cancel);

      let results = tokio::select! {
        results = futures::future::join_all(handles) => results,
        _ = cancel.cancelled() => {
          warn!("pipeline cancelled during job execution");
          return Err(SchedulerError::Cancelled);
        }
      };

      for result in results {
        let job_result = result.map_err(|err| SchedulerError::Join {
          message: err.to_string(),
        })?;

        match job_result {
          Ok(report) => {
            if report.status == JobStatus::Failed {
              self.cascade_skips(&report.job, &graph, &mut reports, &run_id);
            }
            reports.insert(report.job.clone(), report);
          }
          Err((_, RunnerError::Cancelled)) => return Err(SchedulerError::Cancelled),
          Err((job, source)) => return Err(SchedulerError::Runner { job, source }),
        }
      }
    }

    let mut jobs: Vec<JobReport> = reports.into_values().collect();
    jobs.sort_by(|a, b| a.job.cmp(&b.job));

    let status = PipelineStatus::from_jobs(jobs.iter().map(|report| &report.status));
    info!(status = ?status, "pipeline_finished");
    self.notifier.notify(PipelineEvent::PipelineFinished {
      run_id: run_id.clone(),
      workflow: pipeline.workflow.clone(),
      status,
    });

    Ok(PipelineReport {
      run_id,
      workflow: pipeline.workflow.clone(),
      status,
      jobs,
      filtered: pipeline.filtered.clone(),
      started_at,
      finished_at: Utc::now(),
    })
  }

  /// Spawn one task per ready job, each gated by the concurrency permit.
  fn dispatch(
    &self,
    pipeline: &Pipeline,
    ready: &[String],
    run_id: &str,
    semaphore: &Arc<Semaphore>,
    cancel: &CancellationToken,
  ) -> Vec<tokio::task::JoinHandle<Result<JobReport, (String, RunnerError)>>> {
    let mut handles = Vec::with_capacity(ready.len());

    for name in ready {
      let Some(job) = pipeline.get_job(name) else {
        continue;
      };
      let job = job.clone();
      let runner = self.runner.clone();
      let notifier = self.notifier.clone();
      let semaphore = semaphore.clone();
      let cancel = cancel.clone();
      let run_id = run_id.to_string();

      handles.push(tokio::spawn(async move {
        let _permit = semaphore
          .acquire_owned()
          .await
          .map_err(|_| (job.name.clone(), RunnerError::Cancelled))?;

        notifier.notify(PipelineEvent::JobStarted {
          run_id: run_id.clone(),
          job: job.name.clone(),
        });

        match runner.run_job(&job, cancel).await {
          Ok(report) => {
            notifier.notify(PipelineEvent::JobFinished {
              run_id,
              job: report.job.clone(),
              status: report.status,
            });
            Ok(report)
          }
          Err(err) => Err((job.name.clone(), err)),
        }
      }));
    }

    handles
  }

  /// Mark every unreported descendant of a failed job as skipped.
  fn cascade_skips(
    &self,
    failed: &str,
    graph: &Graph,
    reports: &mut HashMap<String, JobReport>,
    run_id: &str,
  ) {
    for descendant in graph.descendants(failed) {
      if reports.contains_key(&descendant) {
        continue;
      }
      warn!(job = %descendant, cause = %failed, "job_skipped");
      self.notifier.notify(PipelineEvent::JobSkipped {
        run_id: run_id.to_string(),
        job: descendant.clone(),
        cause: failed.to_string(),
      });
      reports.insert(descendant.clone(), JobReport::skipped(descendant));
    }
  }
}

/// Find jobs whose upstream dependencies have all succeeded and that have
/// not produced a report yet.
fn find_ready_jobs(
  pipeline: &Pipeline,
  graph: &Graph,
  reports: &HashMap<String, JobReport>,
) -> Vec<String> {
  let mut ready: Vec<String> = pipeline
    .jobs
    .keys()
    .filter(|name| !reports.contains_key(*name))
    .filter(|name| {
      graph
        .upstream(name)
        .iter()
        .all(|up| reports.get(up).is_some_and(|report| report.status.is_success()))
    })
    .cloned()
    .collect();
  ready.sort();
  ready
}
