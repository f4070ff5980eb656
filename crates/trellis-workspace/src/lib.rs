//! Trellis Workspace
//!
//! This crate provides the run-scoped artifact store shared by jobs within
//! one pipeline run. A job persists named subtrees under a namespace; a
//! downstream job attaches the namespace to read them.
//!
//! Unlike the cache, the workspace is strict: namespaces are write-once,
//! persisted artifacts are immutable, and the dependency edge between
//! producer and consumer is the only synchronization needed.

mod fs;

pub use fs::FsWorkspaceStore;

use std::path::Path;

use async_trait::async_trait;

/// Error type for workspace operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
  /// The namespace has already been persisted in this run.
  #[error("workspace namespace already persisted: {0}")]
  AlreadyPersisted(String),

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Run-scoped artifact store trait.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
  /// Persist `paths` (relative to `source`) under `namespace`.
  ///
  /// Namespaces are write-once per run; persisting one twice is an
  /// error. Persisting is all-or-nothing: a failed or interrupted
  /// persist leaves no partial namespace behind.
  async fn persist(
    &self,
    namespace: &str,
    source: &Path,
    paths: &[String],
  ) -> Result<(), WorkspaceError>;

  /// Copy a previously persisted namespace into `target`, returning the
  /// relative paths of the files it contained. Attaching a namespace
  /// nothing has persisted yields an empty list, not an error.
  async fn attach(&self, namespace: &str, target: &Path) -> Result<Vec<String>, WorkspaceError>;
}
