//! Trellis Cache
//!
//! This crate provides the dependency-cache trait and implementations for
//! Trellis. Cache entries are filesystem snapshots stored under explicit
//! keys; restoring resolves an ordered candidate key list and takes the
//! first hit.
//!
//! The cache is best-effort acceleration only: a total miss is a normal
//! outcome, never a failure, and a cold run must still produce a correct
//! build. Callers treat cache errors as misses.

mod fs;
mod key;

pub use fs::FsCacheStore;
pub use key::manifest_checksum;

use std::path::Path;

use async_trait::async_trait;

/// Error type for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Dependency cache trait.
///
/// Implementations provide the storage backend. Writes under the same key
/// are overwrite-idempotent and reads tolerate staleness, so no locking is
/// required across concurrent jobs.
#[async_trait]
pub trait CacheStore: Send + Sync {
  /// Resolve `keys` in priority order and restore the first hit into
  /// `target`. Returns the key that hit, or `None` on a total miss.
  async fn restore(&self, keys: &[String], target: &Path) -> Result<Option<String>, CacheError>;

  /// Snapshot `paths` (relative to `source`) under `key`, replacing any
  /// existing entry.
  async fn save(&self, key: &str, source: &Path, paths: &[String]) -> Result<(), CacheError>;

  /// Whether a snapshot exists under `key`.
  async fn contains(&self, key: &str) -> Result<bool, CacheError>;
}
