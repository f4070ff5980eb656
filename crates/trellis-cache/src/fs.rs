use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use crate::{CacheError, CacheStore};

/// Filesystem-based cache store.
///
/// Each entry is a directory tree at `{base_path}/{sanitized key}`
/// mirroring the saved paths relative to the job's source directory.
pub struct FsCacheStore {
  base_path: PathBuf,
}

impl FsCacheStore {
  /// Create a new filesystem cache rooted at `base_path`.
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  /// Keys embed branch names, which may contain separators.
  fn key_to_path(&self, key: &str) -> PathBuf {
    self.base_path.join(key.replace('/', "--"))
  }
}

#[async_trait]
impl CacheStore for FsCacheStore {
  async fn restore(&self, keys: &[String], target: &Path) -> Result<Option<String>, CacheError> {
    for key in keys {
      let entry = self.key_to_path(key);
      if fs::try_exists(&entry).await? {
        copy_tree(&entry, target).await?;
        debug!(key = %key, "cache_restored");
        return Ok(Some(key.clone()));
      }
    }
    Ok(None)
  }

  async fn save(&self, key: &str, source: &Path, paths: &[String]) -> Result<(), CacheError> {
    let entry = self.key_to_path(key);

    // Same key means same content by construction, so replacing an
    // existing entry is idempotent.
    if fs::try_exists(&entry).await? {
      fs::remove_dir_all(&entry).await?;
    }
    fs::create_dir_all(&entry).await?;

    for rel in paths {
      let from = source.join(rel);
      let to = entry.join(rel);
      match fs::metadata(&from).await {
        Ok(meta) if meta.is_dir() => copy_tree(&from, &to).await?,
        Ok(_) => {
          if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
          }
          fs::copy(&from, &to).await?;
        }
        Err(_) => {
          // Paths that were never produced are skipped, not fatal.
          warn!(key = %key, path = %rel, "cache_save_path_missing");
        }
      }
    }

    debug!(key = %key, "cache_saved");
    Ok(())
  }

  async fn contains(&self, key: &str) -> Result<bool, CacheError> {
    Ok(fs::try_exists(self.key_to_path(key)).await?)
  }
}

/// Recursively copy a directory tree, merging into existing directories.
fn copy_tree<'a>(
  from: &'a Path,
  to: &'a Path,
) -> Pin<Box<dyn Future<Output = Result<(), std::io::Error>> + Send + 'a>> {
  Box::pin(async move {
    fs::create_dir_all(to).await?;
    let mut entries = fs::read_dir(from).await?;
    while let Some(entry) = entries.next_entry().await? {
      let source = entry.path();
      let target = to.join(entry.file_name());
      if entry.file_type().await?.is_dir() {
        copy_tree(&source, &target).await?;
      } else {
        fs::copy(&source, &target).await?;
      }
    }
    Ok(())
  })
}
