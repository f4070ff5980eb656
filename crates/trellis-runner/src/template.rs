use std::collections::HashMap;
use std::path::Path;

use minijinja::{Environment, ErrorKind, Value};
use serde_json::json;
use trellis_pipeline::{JobInstance, RunContext};

/// Renders step templates against the run and job context.
///
/// Templates see `branch`, `revision`, `trigger`, `run_id`, `job` and the
/// merged `parameters` map, with the job's matrix bindings shadowing the
/// run-level parameters. A `checksum(path)` function hashes a file in the
/// job's working directory, for content-addressed cache keys.
pub(crate) struct StepRenderer {
  env: Environment<'static>,
  context: Value,
}

impl StepRenderer {
  pub fn new(context: &RunContext, job: &JobInstance, workdir: &Path) -> Self {
    let mut env = Environment::new();

    let root = workdir.to_path_buf();
    env.add_function("checksum", move |path: String| checksum_file(&root, &path));

    let mut parameters = context.parameters.clone();
    parameters.extend(job.parameters.clone());

    let context = Value::from_serialize(&json!({
      "branch": context.branch,
      "revision": context.revision,
      "trigger": context.trigger.as_str(),
      "run_id": context.run_id,
      "job": job.name,
      "parameters": parameters,
    }));

    Self { env, context }
  }

  /// Render one template string. Plain strings pass through untouched.
  pub fn render(&self, template: &str) -> Result<String, minijinja::Error> {
    if !template.contains("{{") && !template.contains("{%") {
      return Ok(template.to_string());
    }
    self.env.render_str(template, self.context.clone())
  }

  /// Render every value of an environment map.
  pub fn render_env(
    &self,
    env: &HashMap<String, String>,
  ) -> Result<HashMap<String, String>, minijinja::Error> {
    env
      .iter()
      .map(|(key, value)| Ok((key.clone(), self.render(value)?)))
      .collect()
  }
}

fn checksum_file(root: &Path, path: &str) -> Result<String, minijinja::Error> {
  trellis_cache::manifest_checksum(&root.join(path)).map_err(|err| {
    minijinja::Error::new(
      ErrorKind::InvalidOperation,
      format!("checksum of '{}' failed: {}", path, err),
    )
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use trellis_pipeline::TriggerEvent;

  fn sample_job() -> JobInstance {
    JobInstance {
      name: "build-3.9".to_string(),
      template: "build".to_string(),
      image: None,
      env: HashMap::new(),
      parameters: HashMap::from([("version".to_string(), json!("3.9"))]),
      steps: Vec::new(),
      timeout_ms: None,
      parallelism: 1,
    }
  }

  fn sample_context() -> RunContext {
    let defaults = HashMap::from([
      ("version".to_string(), json!("default")),
      ("registry".to_string(), json!("pypi")),
    ]);
    RunContext::new("notebooker", &defaults, &TriggerEvent::push("master", "abc123"))
  }

  #[test]
  fn test_renders_run_and_job_fields() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = StepRenderer::new(&sample_context(), &sample_job(), dir.path());

    let rendered = renderer
      .render("deps-{{ branch }}-{{ job }}-{{ trigger }}")
      .unwrap();

    assert_eq!(rendered, "deps-master-build-3.9-push");
  }

  #[test]
  fn test_matrix_parameters_shadow_run_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = StepRenderer::new(&sample_context(), &sample_job(), dir.path());

    let rendered = renderer
      .render("{{ parameters.version }}/{{ parameters.registry }}")
      .unwrap();

    assert_eq!(rendered, "3.9/pypi");
  }

  #[test]
  fn test_plain_strings_pass_through() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = StepRenderer::new(&sample_context(), &sample_job(), dir.path());

    assert_eq!(renderer.render("make test").unwrap(), "make test");
  }

  #[test]
  fn test_checksum_hashes_a_workdir_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("poetry.lock"), "locked dependencies").unwrap();
    let renderer = StepRenderer::new(&sample_context(), &sample_job(), dir.path());

    let first = renderer.render("deps-{{ checksum(\"poetry.lock\") }}").unwrap();
    let second = renderer.render("deps-{{ checksum(\"poetry.lock\") }}").unwrap();

    assert_eq!(first, second);
    assert!(first.len() > "deps-".len());
    assert!(!first.contains("{{"));
  }

  #[test]
  fn test_checksum_of_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = StepRenderer::new(&sample_context(), &sample_job(), dir.path());

    let result = renderer.render("{{ checksum(\"no-such.lock\") }}");

    assert!(result.is_err());
  }
}
