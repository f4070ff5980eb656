//! Trellis Publish
//!
//! This crate provides the release sink trait and implementations for
//! Trellis. A release sink is the external endpoint a gate job publishes
//! a tagged release to: tag, title, body, attached assets.
//!
//! Publishing is the one irreversible side effect in a pipeline, so the
//! contract is idempotent-safe: re-publishing an existing tag with
//! `skip_existing` set is a no-op, never corruption, because retries
//! after transient network failure are expected.

mod fs;
mod memory;
mod retry;

pub use fs::FsReleaseSink;
pub use memory::MemoryReleaseSink;
pub use retry::{publish_with_retry, RetryBackoff, RetryPolicy};

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One release to publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseRequest {
  pub tag: String,
  pub title: String,
  pub body: String,
  /// Files to attach to the release.
  pub assets: Vec<PathBuf>,
  /// Treat an already-published tag as success instead of a conflict.
  pub skip_existing: bool,
}

/// What the sink did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
  Published,
  SkippedExisting,
}

/// Error type for publish operations.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
  /// The tag is already published and `skip_existing` was not set.
  #[error("release already exists: {tag}")]
  Conflict { tag: String },

  /// An I/O error occurred while talking to the sink.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Release-hosting endpoint trait.
///
/// Implementations must make a published tag visible atomically: a
/// failed publish leaves no partial release behind.
#[async_trait]
pub trait ReleaseSink: Send + Sync {
  async fn publish(&self, request: &ReleaseRequest) -> Result<PublishOutcome, PublishError>;
}
