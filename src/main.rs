use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use trellis_cache::FsCacheStore;
use trellis_config::PipelineDef;
use trellis_pipeline::{PipelineStatus, RunContext, TriggerEvent};
use trellis_publish::FsReleaseSink;
use trellis_resolver::resolve;
use trellis_runner::{version_mismatches, JobRunner};
use trellis_scheduler::{PipelineScheduler, SchedulerConfig};
use trellis_workspace::FsWorkspaceStore;

/// Trellis - a build-matrix pipeline orchestrator
#[derive(Parser)]
#[command(name = "trellis")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.trellis)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Validate a pipeline definition
  Validate {
    /// Path to the pipeline file (JSON)
    config: PathBuf,

    /// Also preview which workflows a trigger on this branch would run
    #[arg(long)]
    branch: Option<String>,

    /// Preview a schedule fire instead of a push
    #[arg(long, requires = "branch")]
    schedule: bool,
  },

  /// Resolve a pipeline definition and execute the matching workflows
  Run {
    /// Path to the pipeline file (JSON)
    config: PathBuf,

    /// Branch the trigger is for
    #[arg(long)]
    branch: String,

    /// Revision identifier recorded on the run
    #[arg(long, default_value = "local")]
    revision: String,

    /// Treat the trigger as a schedule fire instead of a push
    #[arg(long)]
    schedule: bool,

    /// Only execute the named workflow
    #[arg(long)]
    workflow: Option<String>,

    /// Source tree checked out into each job
    #[arg(long, default_value = ".")]
    source_dir: PathBuf,

    /// Trigger parameter overrides (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Also write the run reports to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Upper bound on concurrently executing jobs
    #[arg(long, default_value_t = 4)]
    max_parallel: usize,
  },

  /// Check that a version identifier appears in every listed file
  CheckVersion {
    /// The version identifier to look for
    #[arg(long)]
    version: String,

    /// Directory the files are resolved against
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Files that must contain the version
    files: Vec<String>,
  },
}

struct RunOptions {
  config: PathBuf,
  branch: String,
  revision: String,
  schedule: bool,
  workflow: Option<String>,
  source_dir: PathBuf,
  params: Vec<String>,
  report: Option<PathBuf>,
  max_parallel: usize,
  data_dir: PathBuf,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".trellis"),
  };

  match cli.command {
    Some(Commands::Validate {
      config,
      branch,
      schedule,
    }) => validate(&config, branch.as_deref(), schedule),
    Some(Commands::Run {
      config,
      branch,
      revision,
      schedule,
      workflow,
      source_dir,
      params,
      report,
      max_parallel,
    }) => run_pipeline(RunOptions {
      config,
      branch,
      revision,
      schedule,
      workflow,
      source_dir,
      params,
      report,
      max_parallel,
      data_dir,
    }),
    Some(Commands::CheckVersion {
      version,
      root,
      files,
    }) => check_version(&version, &root, &files),
    None => {
      println!("trellis - use --help to see available commands");
      Ok(())
    }
  }
}

fn validate(config: &Path, branch: Option<&str>, schedule: bool) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let def = load_definition(config).await?;
    println!(
      "{}: {} job template(s), {} workflow(s)",
      def.name,
      def.jobs.len(),
      def.workflows.len()
    );

    let Some(branch) = branch else {
      return Ok(());
    };

    let event = if schedule {
      TriggerEvent::schedule(branch, "preview")
    } else {
      TriggerEvent::push(branch, "preview")
    };
    let pipelines = resolve(&def, &event).context("failed to resolve pipeline")?;
    if pipelines.is_empty() {
      println!("no workflows match {} on {}", event.kind.as_str(), branch);
      return Ok(());
    }

    for pipeline in &pipelines {
      let mut names: Vec<_> = pipeline.jobs.keys().cloned().collect();
      names.sort();
      println!(
        "workflow {}: {} job(s): {}",
        pipeline.workflow,
        names.len(),
        names.join(", ")
      );
      if !pipeline.filtered.is_empty() {
        println!("  filtered: {}", pipeline.filtered.join(", "));
      }
    }
    Ok(())
  })
}

fn run_pipeline(options: RunOptions) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_pipeline_async(options).await })
}

async fn run_pipeline_async(options: RunOptions) -> Result<()> {
  let def = load_definition(&options.config).await?;
  eprintln!("Loaded pipeline: {}", def.name);

  let mut event = if options.schedule {
    TriggerEvent::schedule(&options.branch, &options.revision)
  } else {
    TriggerEvent::push(&options.branch, &options.revision)
  };
  event.parameters = parse_params(&options.params)?;

  let mut pipelines = resolve(&def, &event).context("failed to resolve pipeline")?;
  if let Some(workflow) = &options.workflow {
    pipelines.retain(|pipeline| &pipeline.workflow == workflow);
    if pipelines.is_empty() {
      bail!("workflow '{}' did not match the trigger", workflow);
    }
  }
  eprintln!(
    "Matched {} workflow(s) for {} on {}",
    pipelines.len(),
    event.kind.as_str(),
    event.branch
  );

  let source_dir = options
    .source_dir
    .canonicalize()
    .with_context(|| format!("source directory not found: {}", options.source_dir.display()))?;

  // Ctrl-C cancels in-flight jobs and aborts the run.
  let cancel = CancellationToken::new();
  let ctrl_c = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      ctrl_c.cancel();
    }
  });

  let mut reports = Vec::new();
  for pipeline in &pipelines {
    let context = RunContext::new(&def.name, &def.parameters, &event);
    let run_root = options.data_dir.join("runs").join(&context.run_id);

    let cache = Arc::new(FsCacheStore::new(options.data_dir.join("cache")));
    let workspace = Arc::new(FsWorkspaceStore::new(run_root.join("workspace")));
    let releases = Arc::new(FsReleaseSink::new(options.data_dir.join("releases")));

    let runner = JobRunner::new(context, &source_dir, &run_root, cache, workspace, releases);
    let scheduler = PipelineScheduler::new(runner).with_config(SchedulerConfig {
      max_parallel_jobs: options.max_parallel,
    });

    let report = scheduler
      .run(pipeline, cancel.clone())
      .await
      .with_context(|| format!("workflow '{}' aborted", pipeline.workflow))?;

    eprintln!(
      "Workflow {}: {:?} ({} job(s), {} filtered, run {})",
      report.workflow,
      report.status,
      report.jobs.len(),
      report.filtered.len(),
      report.run_id
    );
    reports.push(report);
  }

  let rendered = serde_json::to_string_pretty(&reports)?;
  if let Some(path) = &options.report {
    tokio::fs::write(path, &rendered)
      .await
      .with_context(|| format!("failed to write report: {}", path.display()))?;
  }
  println!("{}", rendered);

  if reports
    .iter()
    .any(|report| report.status == PipelineStatus::Failed)
  {
    std::process::exit(1);
  }
  Ok(())
}

fn check_version(version: &str, root: &Path, files: &[String]) -> Result<()> {
  if files.is_empty() {
    bail!("no files to check");
  }

  let offending = version_mismatches(root, version, files);
  if offending.is_empty() {
    println!("version {} present in {} file(s)", version, files.len());
    return Ok(());
  }

  for file in &offending {
    eprintln!("missing version {}: {}", version, file);
  }
  std::process::exit(1);
}

async fn load_definition(path: &Path) -> Result<PipelineDef> {
  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read pipeline file: {}", path.display()))?;
  PipelineDef::from_json(&content)
    .with_context(|| format!("invalid pipeline definition: {}", path.display()))
}

fn parse_params(params: &[String]) -> Result<HashMap<String, serde_json::Value>> {
  let mut parsed = HashMap::new();
  for param in params {
    let (key, value) = param
      .split_once('=')
      .with_context(|| format!("parameter '{}' is not KEY=VALUE", param))?;
    let value = serde_json::from_str(value)
      .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    parsed.insert(key.to_string(), value);
  }
  Ok(parsed)
}
