use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::{WorkspaceError, WorkspaceStore};

/// Filesystem-based workspace store, rooted at one pipeline run's
/// directory.
///
/// Each namespace is a directory at `{base_path}/{sanitized namespace}`.
/// Persisting stages into a sibling directory first and renames into
/// place, so an interrupted persist never leaves a readable partial
/// namespace.
pub struct FsWorkspaceStore {
  base_path: PathBuf,
}

impl FsWorkspaceStore {
  /// Create a workspace store rooted at `base_path`.
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  fn namespace_to_path(&self, namespace: &str) -> PathBuf {
    self.base_path.join(namespace.replace('/', "--"))
  }
}

#[async_trait]
impl WorkspaceStore for FsWorkspaceStore {
  async fn persist(
    &self,
    namespace: &str,
    source: &Path,
    paths: &[String],
  ) -> Result<(), WorkspaceError> {
    let entry = self.namespace_to_path(namespace);
    if fs::try_exists(&entry).await? {
      return Err(WorkspaceError::AlreadyPersisted(namespace.to_string()));
    }

    let stage = self
      .base_path
      .join(format!(".stage-{}", namespace.replace('/', "--")));
    if fs::try_exists(&stage).await? {
      fs::remove_dir_all(&stage).await?;
    }

    let staged = stage_paths(&stage, source, paths).await;
    if let Err(err) = staged {
      let _ = fs::remove_dir_all(&stage).await;
      return Err(err);
    }

    fs::rename(&stage, &entry).await?;
    debug!(namespace = %namespace, "workspace_persisted");
    Ok(())
  }

  async fn attach(&self, namespace: &str, target: &Path) -> Result<Vec<String>, WorkspaceError> {
    let entry = self.namespace_to_path(namespace);
    if !fs::try_exists(&entry).await? {
      debug!(namespace = %namespace, "workspace_attach_empty");
      return Ok(Vec::new());
    }

    copy_tree(&entry, target).await?;

    let mut files = Vec::new();
    collect_files(&entry, &entry, &mut files).await?;
    files.sort();
    debug!(namespace = %namespace, files = files.len(), "workspace_attached");
    Ok(files)
  }
}

/// Copy the declared paths into the staging directory. Unlike the cache,
/// a missing path is an error: the producer declared it.
async fn stage_paths(stage: &Path, source: &Path, paths: &[String]) -> Result<(), WorkspaceError> {
  fs::create_dir_all(stage).await?;
  for rel in paths {
    let from = source.join(rel);
    let to = stage.join(rel);
    let meta = fs::metadata(&from).await?;
    if meta.is_dir() {
      copy_tree(&from, &to).await?;
    } else {
      if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).await?;
      }
      fs::copy(&from, &to).await?;
    }
  }
  Ok(())
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

/// Collect file paths under `dir` relative to `root`.
fn collect_files<'a>(
  root: &'a Path,
  dir: &'a Path,
  out: &'a mut Vec<String>,
) -> Pin<Box<dyn Future<Output = Result<(), std::io::Error>> + Send + 'a>> {
  Box::pin(async move {
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if entry.file_type().await?.is_dir() {
        collect_files(root, &path, out).await?;
      } else if let Ok(rel) = path.strip_prefix(root) {
        out.push(rel.to_string_lossy().into_owned());
      }
    }
    Ok(())
  })
}
