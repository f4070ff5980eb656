use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{PublishError, PublishOutcome, ReleaseRequest, ReleaseSink};

/// In-memory release sink.
///
/// Records publish requests instead of performing them. Suitable for dry
/// runs and testing; it can be armed to fail transiently to exercise
/// retry handling.
#[derive(Debug, Default)]
pub struct MemoryReleaseSink {
  published: Mutex<Vec<ReleaseRequest>>,
  failures_remaining: Mutex<u32>,
}

impl MemoryReleaseSink {
  pub fn new() -> Self {
    Self::default()
  }

  /// Arm the sink to fail the next `count` publishes with a transient
  /// I/O error.
  pub async fn fail_next(&self, count: u32) {
    *self.failures_remaining.lock().await = count;
  }

  /// Requests accepted so far, in order.
  pub async fn published(&self) -> Vec<ReleaseRequest> {
    self.published.lock().await.clone()
  }
}

#[async_trait]
impl ReleaseSink for MemoryReleaseSink {
  async fn publish(&self, request: &ReleaseRequest) -> Result<PublishOutcome, PublishError> {
    {
      let mut failures = self.failures_remaining.lock().await;
      if *failures > 0 {
        *failures -= 1;
        return Err(PublishError::Io(std::io::Error::new(
          std::io::ErrorKind::ConnectionReset,
          "injected transient failure",
        )));
      }
    }

    let mut published = self.published.lock().await;
    if published.iter().any(|existing| existing.tag == request.tag) {
      if request.skip_existing {
        return Ok(PublishOutcome::SkippedExisting);
      }
      return Err(PublishError::Conflict {
        tag: request.tag.clone(),
      });
    }

    published.push(request.clone());
    Ok(PublishOutcome::Published)
  }
}
