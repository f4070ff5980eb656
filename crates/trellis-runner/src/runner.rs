use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use trellis_cache::CacheStore;
use trellis_config::StepDef;
use trellis_pipeline::{JobInstance, JobStatus, RunContext, StepStatus};
use trellis_publish::{
  publish_with_retry, PublishOutcome, ReleaseRequest, ReleaseSink, RetryPolicy,
};
use trellis_workspace::WorkspaceStore;

use crate::command::run_command;
use crate::error::RunnerError;
use crate::guard::version_mismatches;
use crate::report::{JobReport, StepReport};
use crate::template::StepRenderer;

/// Result of dispatching one step, before timestamps are attached.
struct StepOutcome {
  status: StepStatus,
  detail: Option<String>,
  stored_artifacts: Vec<PathBuf>,
  stored_results: Vec<PathBuf>,
}

impl StepOutcome {
  fn succeeded() -> Self {
    Self {
      status: StepStatus::Succeeded,
      detail: None,
      stored_artifacts: Vec::new(),
      stored_results: Vec::new(),
    }
  }

  fn succeeded_with(detail: impl Into<String>) -> Self {
    Self {
      detail: Some(detail.into()),
      ..Self::succeeded()
    }
  }

  fn failed(detail: impl Into<String>) -> Self {
    Self {
      status: StepStatus::Failed,
      detail: Some(detail.into()),
      stored_artifacts: Vec::new(),
      stored_results: Vec::new(),
    }
  }
}

/// Render a step template, turning failure into a failed step outcome.
fn render_step(renderer: &StepRenderer, template: &str) -> Result<String, StepOutcome> {
  renderer
    .render(template)
    .map_err(|err| StepOutcome::failed(format!("template error: {}", err)))
}

/// Executes one job instance's ordered steps in an isolated working
/// directory under the run root.
///
/// The runner owns no scheduling concerns: it is handed fully resolved
/// job instances one at a time and reports what happened. All side
/// effects flow through the injected cache, workspace and release
/// stores, so tests can substitute in-memory or throwaway backends.
pub struct JobRunner {
  context: RunContext,
  source_dir: PathBuf,
  run_root: PathBuf,
  cache: Arc<dyn CacheStore>,
  workspace: Arc<dyn WorkspaceStore>,
  releases: Arc<dyn ReleaseSink>,
  retry: RetryPolicy,
}

impl JobRunner {
  pub fn new(
    context: RunContext,
    source_dir: impl Into<PathBuf>,
    run_root: impl Into<PathBuf>,
    cache: Arc<dyn CacheStore>,
    workspace: Arc<dyn WorkspaceStore>,
    releases: Arc<dyn ReleaseSink>,
  ) -> Self {
    Self {
      context,
      source_dir: source_dir.into(),
      run_root: run_root.into(),
      cache,
      workspace,
      releases,
      retry: RetryPolicy::default(),
    }
  }

  pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn context(&self) -> &RunContext {
    &self.context
  }

  /// Run every step of the job in order.
  ///
  /// A failing step marks the job failed and skips the remaining steps,
  /// except `run` steps declared `when: always`. Step failures are
  /// reported, not returned: the only error cases are cancellation and
  /// failure to provision the job directory itself.
  #[instrument(
    name = "job_run",
    skip(self, job, cancel),
    fields(run_id = %self.context.run_id, job = %job.name)
  )]
  pub async fn run_job(
    &self,
    job: &JobInstance,
    cancel: CancellationToken,
  ) -> Result<JobReport, RunnerError> {
    let started_at = Utc::now();
    let workdir = self.run_root.join("jobs").join(sanitize(&job.name));
    fs::create_dir_all(&workdir).await?;

    let renderer = StepRenderer::new(&self.context, job, &workdir);
    let deadline = job
      .timeout_ms
      .map(|ms| Instant::now() + Duration::from_millis(ms));

    info!(steps = job.steps.len(), "job_started");

    let mut steps = Vec::with_capacity(job.steps.len());
    let mut artifacts = Vec::new();
    let mut test_results = Vec::new();
    let mut failed = false;

    for step in &job.steps {
      if cancel.is_cancelled() {
        return Err(RunnerError::Cancelled);
      }

      if failed && !step.runs_always() {
        steps.push(StepReport::skipped(step.label()));
        continue;
      }

      let step_started = Utc::now();
      let outcome = self
        .execute_step(job, step, &workdir, &renderer, deadline, &cancel)
        .await?;

      if outcome.status == StepStatus::Failed {
        warn!(
          step = %step.label(),
          detail = outcome.detail.as_deref().unwrap_or(""),
          "step_failed"
        );
        failed = true;
      }

      artifacts.extend(outcome.stored_artifacts);
      test_results.extend(outcome.stored_results);
      steps.push(StepReport {
        label: step.label(),
        status: outcome.status,
        detail: outcome.detail,
        started_at: step_started,
        finished_at: Utc::now(),
      });
    }

    let status = if failed {
      JobStatus::Failed
    } else {
      JobStatus::Succeeded
    };
    info!(status = ?status, "job_finished");

    Ok(JobReport {
      job: job.name.clone(),
      status,
      steps,
      artifacts,
      test_results,
      started_at,
      finished_at: Utc::now(),
    })
  }

  async fn execute_step(
    &self,
    job: &JobInstance,
    step: &StepDef,
    workdir: &Path,
    renderer: &StepRenderer,
    deadline: Option<Instant>,
    cancel: &CancellationToken,
  ) -> Result<StepOutcome, RunnerError> {
    match step {
      StepDef::Checkout => match copy_tree(&self.source_dir, workdir).await {
        Ok(()) => Ok(StepOutcome::succeeded()),
        Err(err) => Ok(StepOutcome::failed(format!("checkout failed: {}", err))),
      },

      StepDef::Run {
        command,
        env,
        working_dir,
        ..
      } => {
        self
          .run_shell_step(job, command, env, working_dir.as_deref(), workdir, renderer, deadline, cancel)
          .await
      }

      StepDef::RestoreCache { keys } => {
        let mut rendered = Vec::with_capacity(keys.len());
        for key in keys {
          match render_step(renderer, key) {
            Ok(key) => rendered.push(key),
            Err(outcome) => return Ok(outcome),
          }
        }
        // Cache trouble degrades to a cold run, never a failure.
        match self.cache.restore(&rendered, workdir).await {
          Ok(Some(hit)) => Ok(StepOutcome::succeeded_with(format!("restored {}", hit))),
          Ok(None) => Ok(StepOutcome::succeeded_with("cache miss")),
          Err(err) => {
            warn!(error = %err, "cache_restore_failed");
            Ok(StepOutcome::succeeded_with("cache unavailable"))
          }
        }
      }

      StepDef::SaveCache { key, paths } => {
        let rendered = match render_step(renderer, key) {
          Ok(key) => key,
          Err(outcome) => return Ok(outcome),
        };
        match self.cache.save(&rendered, workdir, paths).await {
          Ok(()) => Ok(StepOutcome::succeeded_with(format!("saved {}", rendered))),
          Err(err) => {
            warn!(error = %err, "cache_save_failed");
            Ok(StepOutcome::succeeded_with("cache unavailable"))
          }
        }
      }

      StepDef::AttachWorkspace { namespace } => {
        let namespace = match render_step(renderer, namespace) {
          Ok(namespace) => namespace,
          Err(outcome) => return Ok(outcome),
        };
        match self.workspace.attach(&namespace, workdir).await {
          Ok(files) => Ok(StepOutcome::succeeded_with(format!(
            "attached {} files",
            files.len()
          ))),
          Err(err) => Ok(StepOutcome::failed(format!("attach failed: {}", err))),
        }
      }

      StepDef::PersistToWorkspace { namespace, paths } => {
        let namespace = match render_step(renderer, namespace) {
          Ok(namespace) => namespace,
          Err(outcome) => return Ok(outcome),
        };
        match self.workspace.persist(&namespace, workdir, paths).await {
          Ok(()) => Ok(StepOutcome::succeeded_with(format!("persisted {}", namespace))),
          Err(err) => Ok(StepOutcome::failed(format!("persist failed: {}", err))),
        }
      }

      StepDef::StoreArtifacts { path, destination } => {
        self
          .store_files_step(job, workdir, renderer, path, destination.as_deref(), StoreKind::Artifact)
          .await
      }

      StepDef::StoreTestResults { path } => {
        self
          .store_files_step(job, workdir, renderer, path, None, StoreKind::TestResults)
          .await
      }

      StepDef::CheckVersion { version, files } => {
        let version = match render_step(renderer, version) {
          Ok(version) => version,
          Err(outcome) => return Ok(outcome),
        };
        let offending = version_mismatches(workdir, &version, files);
        if offending.is_empty() {
          Ok(StepOutcome::succeeded_with(format!("version {} consistent", version)))
        } else {
          Ok(StepOutcome::failed(format!(
            "version {} missing from: {}",
            version,
            offending.join(", ")
          )))
        }
      }

      StepDef::PublishRelease {
        tag,
        title,
        body_file,
        assets,
        skip_existing,
      } => {
        self
          .publish_step(workdir, renderer, tag, title, body_file.as_deref(), assets, *skip_existing)
          .await
      }
    }
  }

  #[allow(clippy::too_many_arguments)]
  async fn run_shell_step(
    &self,
    job: &JobInstance,
    command: &str,
    step_env: &HashMap<String, String>,
    working_dir: Option<&str>,
    workdir: &Path,
    renderer: &StepRenderer,
    deadline: Option<Instant>,
    cancel: &CancellationToken,
  ) -> Result<StepOutcome, RunnerError> {
    let command = match render_step(renderer, command) {
      Ok(command) => command,
      Err(outcome) => return Ok(outcome),
    };

    let mut env = match renderer.render_env(&job.env) {
      Ok(env) => env,
      Err(err) => return Ok(StepOutcome::failed(format!("template error: {}", err))),
    };
    match renderer.render_env(step_env) {
      Ok(step_env) => env.extend(step_env),
      Err(err) => return Ok(StepOutcome::failed(format!("template error: {}", err))),
    }
    env.insert("CI".to_string(), "true".to_string());
    env.insert("TRELLIS_RUN_ID".to_string(), self.context.run_id.clone());
    env.insert("TRELLIS_BRANCH".to_string(), self.context.branch.clone());
    env.insert("TRELLIS_REVISION".to_string(), self.context.revision.clone());
    env.insert("TRELLIS_JOB".to_string(), job.name.clone());

    let cwd = match working_dir {
      Some(dir) => match render_step(renderer, dir) {
        Ok(dir) => workdir.join(dir),
        Err(outcome) => return Ok(outcome),
      },
      None => workdir.to_path_buf(),
    };

    let timeout = deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
    if timeout.is_some_and(|limit| limit.is_zero()) {
      return Ok(StepOutcome::failed(format!(
        "job timeout of {}ms exceeded",
        job.timeout_ms.unwrap_or(0)
      )));
    }

    let output = run_command(&command, &cwd, &env, timeout, cancel).await?;
    if output.timed_out {
      return Ok(StepOutcome::failed(format!(
        "job timeout of {}ms exceeded",
        job.timeout_ms.unwrap_or(0)
      )));
    }
    if output.success() {
      Ok(StepOutcome::succeeded())
    } else {
      Ok(StepOutcome::failed(format!(
        "exit {}: {}",
        output.exit_code,
        tail(&output.stderr)
      )))
    }
  }

  async fn store_files_step(
    &self,
    job: &JobInstance,
    workdir: &Path,
    renderer: &StepRenderer,
    path: &str,
    destination: Option<&str>,
    kind: StoreKind,
  ) -> Result<StepOutcome, RunnerError> {
    let rendered = match render_step(renderer, path) {
      Ok(path) => path,
      Err(outcome) => return Ok(outcome),
    };
    let source = workdir.join(&rendered);

    let name = match destination {
      Some(destination) => match render_step(renderer, destination) {
        Ok(destination) => destination,
        Err(outcome) => return Ok(outcome),
      },
      None => match source.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => return Ok(StepOutcome::failed(format!("invalid path: {}", rendered))),
      },
    };

    let metadata = match fs::metadata(&source).await {
      Ok(metadata) => metadata,
      // Missing test results only warn; missing artifacts were promised
      // by the job and fail it.
      Err(_) if kind == StoreKind::TestResults => {
        warn!(path = %rendered, "test_results_missing");
        return Ok(StepOutcome::succeeded_with("no test results found"));
      }
      Err(err) => {
        return Ok(StepOutcome::failed(format!(
          "artifact '{}' unreadable: {}",
          rendered, err
        )))
      }
    };

    let target = self
      .run_root
      .join(kind.directory())
      .join(sanitize(&job.name))
      .join(&name);
    let result = async {
      if metadata.is_dir() {
        copy_tree(&source, &target).await
      } else {
        if let Some(parent) = target.parent() {
          fs::create_dir_all(parent).await?;
        }
        fs::copy(&source, &target).await.map(|_| ())
      }
    }
    .await;

    match result {
      Ok(()) => {
        let mut outcome = StepOutcome::succeeded_with(format!("stored {}", name));
        match kind {
          StoreKind::Artifact => outcome.stored_artifacts.push(target),
          StoreKind::TestResults => outcome.stored_results.push(target),
        }
        Ok(outcome)
      }
      Err(err) => Ok(StepOutcome::failed(format!(
        "storing '{}' failed: {}",
        rendered, err
      ))),
    }
  }

  #[allow(clippy::too_many_arguments)]
  async fn publish_step(
    &self,
    workdir: &Path,
    renderer: &StepRenderer,
    tag: &str,
    title: &str,
    body_file: Option<&str>,
    assets: &[String],
    skip_existing: bool,
  ) -> Result<StepOutcome, RunnerError> {
    let tag = match render_step(renderer, tag) {
      Ok(tag) => tag,
      Err(outcome) => return Ok(outcome),
    };
    let title = match render_step(renderer, title) {
      Ok(title) => title,
      Err(outcome) => return Ok(outcome),
    };

    let body = match body_file {
      Some(file) => {
        let file = match render_step(renderer, file) {
          Ok(file) => file,
          Err(outcome) => return Ok(outcome),
        };
        match fs::read_to_string(workdir.join(&file)).await {
          Ok(body) => body,
          Err(err) => {
            return Ok(StepOutcome::failed(format!(
              "release body '{}' unreadable: {}",
              file, err
            )))
          }
        }
      }
      None => String::new(),
    };

    let mut asset_paths = Vec::with_capacity(assets.len());
    for asset in assets {
      match render_step(renderer, asset) {
        Ok(asset) => asset_paths.push(workdir.join(asset)),
        Err(outcome) => return Ok(outcome),
      }
    }

    let request = ReleaseRequest {
      tag: tag.clone(),
      title,
      body,
      assets: asset_paths,
      skip_existing,
    };

    match publish_with_retry(self.releases.as_ref(), &request, self.retry).await {
      Ok(PublishOutcome::Published) => {
        info!(tag = %tag, "release_published");
        Ok(StepOutcome::succeeded_with(format!("published {}", tag)))
      }
      Ok(PublishOutcome::SkippedExisting) => {
        info!(tag = %tag, "release_already_present");
        Ok(StepOutcome::succeeded_with(format!("{} already published", tag)))
      }
      Err(err) => Ok(StepOutcome::failed(format!("publish failed: {}", err))),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreKind {
  Artifact,
  TestResults,
}

impl StoreKind {
  fn directory(&self) -> &'static str {
    match self {
      StoreKind::Artifact => "artifacts",
      StoreKind::TestResults => "test-results",
    }
  }
}

/// Job names may contain matrix separators; keep directory names flat.
fn sanitize(name: &str) -> String {
  name.replace('/', "--")
}

/// Last portion of command output, for failure details.
fn tail(output: &str) -> String {
  const MAX_CHARS: usize = 400;
  let trimmed = output.trim_end();
  let total = trimmed.chars().count();
  if total <= MAX_CHARS {
    trimmed.to_string()
  } else {
    trimmed.chars().skip(total - MAX_CHARS).collect()
  }
}

fn copy_tree<'a>(
  source: &'a Path,
  target: &'a Path,
) -> Pin<Box<dyn Future<Output = std::io::Result<()>> + Send + 'a>> {
  Box::pin(async move {
    fs::create_dir_all(target).await?;
    let mut entries = fs::read_dir(source).await?;
    while let Some(entry) = entries.next_entry().await? {
      let target = target.join(entry.file_name());
      if entry.file_type().await?.is_dir() {
        copy_tree(&entry.path(), &target).await?;
      } else {
        fs::copy(entry.path(), &target).await?;
      }
    }
    Ok(())
  })
}
