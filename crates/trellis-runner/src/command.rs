use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::RunnerError;

/// Captured outcome of one spawned shell command.
#[derive(Debug)]
pub(crate) struct CommandOutput {
  pub exit_code: i32,
  pub stdout: String,
  pub stderr: String,
  pub timed_out: bool,
}

impl CommandOutput {
  pub fn success(&self) -> bool {
    !self.timed_out && self.exit_code == 0
  }

  fn spawn_failure(err: std::io::Error) -> Self {
    Self {
      exit_code: -1,
      stdout: String::new(),
      stderr: format!("failed to spawn: {}", err),
      timed_out: false,
    }
  }

  fn timeout() -> Self {
    Self {
      exit_code: -1,
      stdout: String::new(),
      stderr: String::new(),
      timed_out: true,
    }
  }
}

/// Run a shell command to completion and capture its output.
///
/// Commands execute through `sh -c` in `working_dir`, with `env` layered
/// over the parent environment. A timed-out or unspawnable command is
/// reported as a failed output rather than an error; cancellation drops
/// the child, and `kill_on_drop` reaps it.
pub(crate) async fn run_command(
  command: &str,
  working_dir: &Path,
  env: &HashMap<String, String>,
  timeout: Option<Duration>,
  cancel: &CancellationToken,
) -> Result<CommandOutput, RunnerError> {
  let mut cmd = Command::new("sh");
  cmd
    .arg("-c")
    .arg(command)
    .current_dir(working_dir)
    .envs(env)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

  let child = match cmd.spawn() {
    Ok(child) => child,
    Err(err) => return Ok(CommandOutput::spawn_failure(err)),
  };

  let wait = async {
    match timeout {
      Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(result) => result.map(Some),
        Err(_) => Ok(None),
      },
      None => child.wait_with_output().await.map(Some),
    }
  };

  let completed = tokio::select! {
    result = wait => result,
    _ = cancel.cancelled() => return Err(RunnerError::Cancelled),
  };

  match completed {
    Ok(Some(output)) => Ok(CommandOutput {
      exit_code: output.status.code().unwrap_or(-1),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
      timed_out: false,
    }),
    Ok(None) => Ok(CommandOutput::timeout()),
    Err(err) => Ok(CommandOutput::spawn_failure(err)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_captures_stdout_and_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();

    let output = run_command("echo hello", dir.path(), &HashMap::new(), None, &cancel)
      .await
      .unwrap();

    assert!(output.success());
    assert_eq!(output.exit_code, 0);
    assert_eq!(output.stdout.trim(), "hello");
  }

  #[tokio::test]
  async fn test_nonzero_exit_is_not_success() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();

    let output = run_command(
      "echo broken >&2; exit 3",
      dir.path(),
      &HashMap::new(),
      None,
      &cancel,
    )
    .await
    .unwrap();

    assert!(!output.success());
    assert_eq!(output.exit_code, 3);
    assert_eq!(output.stderr.trim(), "broken");
  }

  #[tokio::test]
  async fn test_env_overlays_parent_environment() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let env = HashMap::from([("TRELLIS_TEST_VALUE".to_string(), "42".to_string())]);

    let output = run_command("echo $TRELLIS_TEST_VALUE", dir.path(), &env, None, &cancel)
      .await
      .unwrap();

    assert_eq!(output.stdout.trim(), "42");
  }

  #[tokio::test]
  async fn test_timeout_reported_on_output() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();

    let output = run_command(
      "sleep 5",
      dir.path(),
      &HashMap::new(),
      Some(Duration::from_millis(50)),
      &cancel,
    )
    .await
    .unwrap();

    assert!(output.timed_out);
    assert!(!output.success());
  }

  #[tokio::test]
  async fn test_cancellation_aborts_the_command() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();

    let handle = cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(20)).await;
      handle.cancel();
    });

    let result = run_command("sleep 5", dir.path(), &HashMap::new(), None, &cancel).await;

    assert!(matches!(result, Err(RunnerError::Cancelled)));
  }
}
