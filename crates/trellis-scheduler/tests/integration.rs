//! End-to-end tests driving a pipeline definition through resolution,
//! scheduling and the release gate, against real on-disk stores.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use trellis_cache::FsCacheStore;
use trellis_config::PipelineDef;
use trellis_pipeline::{JobStatus, PipelineStatus, RunContext, TriggerEvent};
use trellis_publish::MemoryReleaseSink;
use trellis_resolver::resolve;
use trellis_runner::JobRunner;
use trellis_scheduler::{PipelineReport, PipelineScheduler};
use trellis_workspace::FsWorkspaceStore;

/// A definition for a small python project: a build matrix feeding a
/// packaging job, a release gated to master, and a nightly scheduled
/// workflow.
///
/// `build_test` is the command run by the build job after installing
/// dependencies; variants export their python version as `$PYTHON`.
fn sample_definition(build_test: &str) -> PipelineDef {
  let document = json!({
    "name": "notebooker",
    "parameters": { "release_version": "0.6.3" },
    "jobs": {
      "build": {
        "image": "python:{{ parameters.python }}",
        "env": { "PYTHON": "{{ parameters.python }}" },
        "steps": [
          { "type": "checkout" },
          { "type": "restore_cache", "keys": [
            "deps-{{ parameters.python }}-{{ checksum(\"poetry.lock\") }}",
            "deps-{{ parameters.python }}-"
          ]},
          { "type": "run", "name": "install", "command": "mkdir -p .venv && cp poetry.lock .venv/stamp" },
          { "type": "save_cache",
            "key": "deps-{{ parameters.python }}-{{ checksum(\"poetry.lock\") }}",
            "paths": [".venv"] },
          { "type": "run", "name": "test", "command": build_test },
          { "type": "store_test_results", "path": "results.xml" }
        ]
      },
      "package": {
        "steps": [
          { "type": "checkout" },
          { "type": "run", "name": "sdist",
            "command": "mkdir -p dist && echo notebooker > dist/notebooker-0.6.3.tar.gz" },
          { "type": "persist_to_workspace", "namespace": "dist", "paths": ["dist"] }
        ]
      },
      "release": {
        "steps": [
          { "type": "checkout" },
          { "type": "attach_workspace", "namespace": "dist" },
          { "type": "check_version",
            "version": "{{ parameters.release_version }}",
            "files": ["setup.py", "notebooker/_version.py"] },
          { "type": "run", "name": "notes",
            "command": "echo \"notebooker {{ parameters.release_version }}\" > notes.md" },
          { "type": "publish_release",
            "tag": "v{{ parameters.release_version }}",
            "title": "notebooker {{ parameters.release_version }}",
            "body_file": "notes.md",
            "assets": ["dist/notebooker-0.6.3.tar.gz"] }
        ]
      }
    },
    "workflows": {
      "build-release": {
        "jobs": [
          { "job": "build", "matrix": { "parameters": { "python": ["3.8", "3.9"] } } },
          { "job": "package", "requires": ["build"] },
          { "job": "release", "requires": ["package"],
            "filters": { "branches": { "only": ["master"] } } }
        ]
      },
      "nightly": {
        "triggers": [{ "cron": "0 2 * * *" }],
        "jobs": [
          { "job": "build", "matrix": { "parameters": { "python": ["3.9"] } } }
        ]
      }
    }
  });

  PipelineDef::from_json(&document.to_string()).unwrap()
}

struct Harness {
  _source: TempDir,
  _data: TempDir,
  source_dir: PathBuf,
  data_dir: PathBuf,
  sink: Arc<MemoryReleaseSink>,
}

impl Harness {
  fn new() -> Self {
    let source = tempfile::tempdir().unwrap();
    std::fs::write(source.path().join("poetry.lock"), "[[package]]\nname = \"pytest\"").unwrap();
    std::fs::write(source.path().join("setup.py"), "setup(version=\"0.6.3\")").unwrap();
    std::fs::create_dir_all(source.path().join("notebooker")).unwrap();
    std::fs::write(
      source.path().join("notebooker").join("_version.py"),
      "__version__ = \"0.6.3\"",
    )
    .unwrap();

    let data = tempfile::tempdir().unwrap();
    Self {
      source_dir: source.path().to_path_buf(),
      data_dir: data.path().to_path_buf(),
      _source: source,
      _data: data,
      sink: Arc::new(MemoryReleaseSink::new()),
    }
  }

  /// Resolve the definition for `event` and run every selected pipeline.
  async fn run(&self, def: &PipelineDef, event: &TriggerEvent) -> Vec<PipelineReport> {
    let pipelines = resolve(def, event).unwrap();
    let mut reports = Vec::new();

    for pipeline in &pipelines {
      let context = RunContext::new(&def.name, &def.parameters, event);
      let run_root = self.data_dir.join("runs").join(&context.run_id);
      let cache = Arc::new(FsCacheStore::new(self.data_dir.join("cache")));
      let workspace = Arc::new(FsWorkspaceStore::new(run_root.join("workspace")));
      let runner = JobRunner::new(
        context,
        &self.source_dir,
        &run_root,
        cache,
        workspace,
        self.sink.clone(),
      );
      let scheduler = PipelineScheduler::new(runner);
      reports.push(
        scheduler
          .run(pipeline, CancellationToken::new())
          .await
          .unwrap(),
      );
    }

    reports
  }
}

#[tokio::test]
async fn test_master_push_builds_matrix_and_publishes_once() {
  let harness = Harness::new();
  let def = sample_definition("test -f .venv/stamp");

  let reports = harness.run(&def, &TriggerEvent::push("master", "abc123")).await;

  assert_eq!(reports.len(), 1);
  let report = &reports[0];
  assert_eq!(report.workflow, "build-release");
  assert_eq!(report.status, PipelineStatus::Succeeded);
  assert!(report.filtered.is_empty());

  for job in ["build-3.8", "build-3.9", "package", "release"] {
    assert_eq!(
      report.job(job).unwrap().status,
      JobStatus::Succeeded,
      "job {} should have succeeded",
      job
    );
  }

  let published = harness.sink.published().await;
  assert_eq!(published.len(), 1);
  assert_eq!(published[0].tag, "v0.6.3");
  assert_eq!(published[0].title, "notebooker 0.6.3");
  assert!(published[0].body.contains("notebooker 0.6.3"));
  assert!(published[0].skip_existing);
  assert_eq!(published[0].assets.len(), 1);
}

#[tokio::test]
async fn test_rerun_is_idempotent_for_the_release() {
  let harness = Harness::new();
  let def = sample_definition("test -f .venv/stamp");
  let event = TriggerEvent::push("master", "abc123");

  let first = harness.run(&def, &event).await;
  assert_eq!(first[0].status, PipelineStatus::Succeeded);

  let second = harness.run(&def, &event).await;
  assert_eq!(second[0].status, PipelineStatus::Succeeded);

  let release = second[0].job("release").unwrap();
  let publish_step = release.steps.last().unwrap();
  assert_eq!(publish_step.detail.as_deref(), Some("v0.6.3 already published"));

  // Still exactly one release.
  assert_eq!(harness.sink.published().await.len(), 1);
}

#[tokio::test]
async fn test_feature_branch_never_instantiates_the_gate() {
  let harness = Harness::new();
  let def = sample_definition("test -f .venv/stamp");

  let reports = harness
    .run(&def, &TriggerEvent::push("feature/plot-embeds", "def456"))
    .await;

  let report = &reports[0];
  assert_eq!(report.status, PipelineStatus::Succeeded);
  assert_eq!(report.filtered, vec!["release".to_string()]);
  assert!(report.job("release").is_none());
  assert_eq!(report.job("package").unwrap().status, JobStatus::Succeeded);
  assert!(harness.sink.published().await.is_empty());
}

#[tokio::test]
async fn test_failed_variant_skips_gate_but_not_siblings() {
  let harness = Harness::new();
  let def = sample_definition("test \"$PYTHON\" != \"3.8\"");

  let reports = harness.run(&def, &TriggerEvent::push("master", "abc123")).await;

  let report = &reports[0];
  assert_eq!(report.status, PipelineStatus::Failed);
  assert_eq!(report.job("build-3.8").unwrap().status, JobStatus::Failed);
  assert_eq!(report.job("build-3.9").unwrap().status, JobStatus::Succeeded);
  assert_eq!(report.job("package").unwrap().status, JobStatus::Skipped);
  assert_eq!(report.job("release").unwrap().status, JobStatus::Skipped);
  assert!(harness.sink.published().await.is_empty());
}

#[tokio::test]
async fn test_schedule_selects_only_cron_workflows() {
  let harness = Harness::new();
  let def = sample_definition("test -f .venv/stamp");

  let reports = harness
    .run(&def, &TriggerEvent::schedule("master", "abc123"))
    .await;

  assert_eq!(reports.len(), 1);
  let report = &reports[0];
  assert_eq!(report.workflow, "nightly");
  assert_eq!(report.status, PipelineStatus::Succeeded);
  assert!(report.job("build-3.9").is_some());
  assert!(report.job("release").is_none());
  assert!(harness.sink.published().await.is_empty());
}

#[tokio::test]
async fn test_second_run_restores_a_warm_cache() {
  let harness = Harness::new();
  let def = sample_definition("test -f .venv/stamp");
  let event = TriggerEvent::push("master", "abc123");

  harness.run(&def, &event).await;
  let second = harness.run(&def, &event).await;

  let build = second[0].job("build-3.9").unwrap();
  let restore = &build.steps[1];
  assert!(
    restore
      .detail
      .as_deref()
      .unwrap()
      .starts_with("restored deps-3.9-"),
    "expected a cache hit, got {:?}",
    restore.detail
  );
}

#[tokio::test]
async fn test_version_guard_blocks_a_mismatched_release() {
  let harness = Harness::new();
  let mut def = sample_definition("test -f .venv/stamp");
  def
    .parameters
    .insert("release_version".to_string(), json!("9.9.9"));

  let reports = harness.run(&def, &TriggerEvent::push("master", "abc123")).await;

  let report = &reports[0];
  assert_eq!(report.status, PipelineStatus::Failed);
  let release = report.job("release").unwrap();
  assert_eq!(release.status, JobStatus::Failed);
  assert!(harness.sink.published().await.is_empty());
}

#[tokio::test]
async fn test_trigger_parameters_flow_into_templates() {
  let harness = Harness::new();
  let def = sample_definition("test -f .venv/stamp");
  let mut event = TriggerEvent::push("master", "abc123");
  event
    .parameters
    .insert("release_version".to_string(), json!("0.7.0"));

  // 0.7.0 is not in the source metadata, so the guard must reject it:
  // proof that the trigger parameter overrode the pipeline default.
  let reports = harness.run(&def, &event).await;
  assert_eq!(reports[0].status, PipelineStatus::Failed);

  let release = reports[0].job("release").unwrap();
  let guard_step = &release.steps[2];
  assert!(guard_step.detail.as_deref().unwrap().contains("0.7.0"));
}
