use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a file's contents.
///
/// Cache keys embed this so that editing a dependency manifest moves the
/// key, while unchanged content keeps hitting the warm entry.
pub fn manifest_checksum(path: &Path) -> io::Result<String> {
  let bytes = std::fs::read(path)?;
  let mut hasher = Sha256::new();
  hasher.update(&bytes);
  Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_checksum_tracks_content() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("poetry.lock");

    std::fs::write(&manifest, "requests==2.28.0\n").unwrap();
    let first = manifest_checksum(&manifest).unwrap();
    let again = manifest_checksum(&manifest).unwrap();
    assert_eq!(first, again);

    std::fs::write(&manifest, "requests==2.31.0\n").unwrap();
    let changed = manifest_checksum(&manifest).unwrap();
    assert_ne!(first, changed);
  }

  #[test]
  fn test_checksum_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(manifest_checksum(&dir.path().join("absent.lock")).is_err());
  }
}
