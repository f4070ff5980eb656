use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::info;

use crate::{PublishError, PublishOutcome, ReleaseRequest, ReleaseSink};

/// Filesystem-based release sink.
///
/// Each release is a directory at `{base_path}/{tag}` holding a
/// `RELEASE.md` with the title and body plus an `assets/` directory with
/// the attached files. The directory is staged and renamed into place, so
/// a release either exists completely or not at all.
pub struct FsReleaseSink {
  base_path: PathBuf,
}

impl FsReleaseSink {
  /// Create a release sink rooted at `base_path`.
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  fn tag_to_path(&self, tag: &str) -> PathBuf {
    self.base_path.join(tag.replace('/', "--"))
  }
}

#[async_trait]
impl ReleaseSink for FsReleaseSink {
  async fn publish(&self, request: &ReleaseRequest) -> Result<PublishOutcome, PublishError> {
    let release_dir = self.tag_to_path(&request.tag);
    if fs::try_exists(&release_dir).await? {
      if request.skip_existing {
        info!(tag = %request.tag, "release_exists_skipped");
        return Ok(PublishOutcome::SkippedExisting);
      }
      return Err(PublishError::Conflict {
        tag: request.tag.clone(),
      });
    }

    let stage = self
      .base_path
      .join(format!(".stage-{}", request.tag.replace('/', "--")));
    if fs::try_exists(&stage).await? {
      fs::remove_dir_all(&stage).await?;
    }

    if let Err(err) = write_release(&stage, request).await {
      let _ = fs::remove_dir_all(&stage).await;
      return Err(err.into());
    }

    fs::rename(&stage, &release_dir).await?;
    info!(tag = %request.tag, assets = request.assets.len(), "release_published");
    Ok(PublishOutcome::Published)
  }
}

async fn write_release(stage: &Path, request: &ReleaseRequest) -> Result<(), std::io::Error> {
  fs::create_dir_all(stage).await?;
  let notes = format!("# {}\n\n{}\n", request.title, request.body);
  fs::write(stage.join("RELEASE.md"), notes).await?;

  let assets_dir = stage.join("assets");
  fs::create_dir_all(&assets_dir).await?;
  for asset in &request.assets {
    let name = asset.file_name().ok_or_else(|| {
      std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("asset has no file name: {}", asset.display()),
      )
    })?;
    fs::copy(asset, assets_dir.join(name)).await?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request(dir: &std::path::Path, skip_existing: bool) -> ReleaseRequest {
    ReleaseRequest {
      tag: "0.6.3".to_string(),
      title: "notebooker 0.6.3".to_string(),
      body: "changelog excerpt".to_string(),
      assets: vec![dir.join("notebooker-0.6.3.tar.gz")],
      skip_existing,
    }
  }

  async fn seed_assets(dir: &std::path::Path) {
    fs::write(dir.join("notebooker-0.6.3.tar.gz"), "sdist")
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn test_publish_writes_notes_and_assets() {
    let releases = tempfile::tempdir().unwrap();
    let dist = tempfile::tempdir().unwrap();
    seed_assets(dist.path()).await;

    let sink = FsReleaseSink::new(releases.path());
    let outcome = sink.publish(&request(dist.path(), true)).await.unwrap();
    assert_eq!(outcome, PublishOutcome::Published);

    let notes = fs::read_to_string(releases.path().join("0.6.3/RELEASE.md"))
      .await
      .unwrap();
    assert!(notes.contains("notebooker 0.6.3"));
    assert!(notes.contains("changelog excerpt"));
    let asset = releases.path().join("0.6.3/assets/notebooker-0.6.3.tar.gz");
    assert!(fs::try_exists(&asset).await.unwrap());
  }

  #[tokio::test]
  async fn test_republish_skips_existing() {
    let releases = tempfile::tempdir().unwrap();
    let dist = tempfile::tempdir().unwrap();
    seed_assets(dist.path()).await;

    let sink = FsReleaseSink::new(releases.path());
    sink.publish(&request(dist.path(), true)).await.unwrap();
    let outcome = sink.publish(&request(dist.path(), true)).await.unwrap();
    assert_eq!(outcome, PublishOutcome::SkippedExisting);
  }

  #[tokio::test]
  async fn test_republish_without_skip_is_conflict() {
    let releases = tempfile::tempdir().unwrap();
    let dist = tempfile::tempdir().unwrap();
    seed_assets(dist.path()).await;

    let sink = FsReleaseSink::new(releases.path());
    sink.publish(&request(dist.path(), false)).await.unwrap();
    let result = sink.publish(&request(dist.path(), false)).await;
    assert!(matches!(result, Err(PublishError::Conflict { .. })));
  }

  #[tokio::test]
  async fn test_failed_publish_leaves_nothing() {
    let releases = tempfile::tempdir().unwrap();
    let dist = tempfile::tempdir().unwrap();
    // Asset file never created, so the copy fails.

    let sink = FsReleaseSink::new(releases.path());
    let result = sink.publish(&request(dist.path(), true)).await;
    assert!(matches!(result, Err(PublishError::Io(_))));
    assert!(!fs::try_exists(releases.path().join("0.6.3")).await.unwrap());

    // The tag is still publishable once the asset exists.
    seed_assets(dist.path()).await;
    let outcome = sink.publish(&request(dist.path(), true)).await.unwrap();
    assert_eq!(outcome, PublishOutcome::Published);
  }
}
