use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{PublishError, PublishOutcome, ReleaseRequest, ReleaseSink};

/// Backoff shape between publish attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
  Constant,
  Linear,
  Exponential,
}

/// Bounded retry policy for transient publish failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub backoff: RetryBackoff,
  pub initial_delay_ms: u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      backoff: RetryBackoff::Exponential,
      initial_delay_ms: 500,
    }
  }
}

impl RetryPolicy {
  /// Delay after the given 1-based failed attempt.
  fn delay(&self, attempt: u32) -> Duration {
    let ms = match self.backoff {
      RetryBackoff::Constant => self.initial_delay_ms,
      RetryBackoff::Linear => self.initial_delay_ms.saturating_mul(attempt as u64),
      RetryBackoff::Exponential => self
        .initial_delay_ms
        .saturating_mul(1u64 << (attempt - 1).min(16)),
    };
    Duration::from_millis(ms)
  }
}

/// Publish with bounded retries.
///
/// Only I/O failures are retried; a conflict is a definitive answer.
/// Re-running after a failure that actually published relies on the
/// request's skip-existing semantics for idempotence.
pub async fn publish_with_retry(
  sink: &dyn ReleaseSink,
  request: &ReleaseRequest,
  policy: RetryPolicy,
) -> Result<PublishOutcome, PublishError> {
  let mut attempt = 1;
  loop {
    match sink.publish(request).await {
      Ok(outcome) => return Ok(outcome),
      Err(PublishError::Io(err)) if attempt < policy.max_attempts => {
        warn!(tag = %request.tag, attempt, error = %err, "publish_retry");
        tokio::time::sleep(policy.delay(attempt)).await;
        attempt += 1;
      }
      Err(err) => return Err(err),
    }
  }
}
