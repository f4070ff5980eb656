use std::path::Path;

/// Check that `version` appears verbatim in every declared metadata file.
///
/// Returns the offending entries: files the version string is missing
/// from, and files that could not be read at all. An empty result means
/// the guard passes. The check is read-only so it can run before any
/// mutating release step.
pub fn version_mismatches(root: &Path, version: &str, files: &[String]) -> Vec<String> {
  let mut offending = Vec::new();
  for file in files {
    match std::fs::read_to_string(root.join(file)) {
      Ok(contents) if contents.contains(version) => {}
      _ => offending.push(file.clone()),
    }
  }
  offending
}

#[cfg(test)]
mod tests {
  use super::*;

  fn declared(files: &[&str]) -> Vec<String> {
    files.iter().map(|file| file.to_string()).collect()
  }

  #[test]
  fn test_passes_when_every_file_carries_the_version() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("setup.py"), "version=\"0.6.3\"").unwrap();
    std::fs::write(dir.path().join("_version.py"), "__version__ = \"0.6.3\"").unwrap();

    let offending = version_mismatches(
      dir.path(),
      "0.6.3",
      &declared(&["setup.py", "_version.py"]),
    );

    assert!(offending.is_empty());
  }

  #[test]
  fn test_names_the_file_missing_the_version() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("setup.py"), "version=\"0.6.3\"").unwrap();
    std::fs::write(dir.path().join("_version.py"), "__version__ = \"0.6.2\"").unwrap();

    let offending = version_mismatches(
      dir.path(),
      "0.6.3",
      &declared(&["setup.py", "_version.py"]),
    );

    assert_eq!(offending, vec!["_version.py".to_string()]);
  }

  #[test]
  fn test_unreadable_file_counts_as_a_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("setup.py"), "version=\"0.6.3\"").unwrap();

    let offending = version_mismatches(
      dir.path(),
      "0.6.3",
      &declared(&["setup.py", "docs/conf.py"]),
    );

    assert_eq!(offending, vec!["docs/conf.py".to_string()]);
  }

  #[test]
  fn test_reports_every_offending_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("setup.py"), "version=\"0.6.2\"").unwrap();
    std::fs::write(dir.path().join("_version.py"), "__version__ = \"0.6.2\"").unwrap();

    let offending = version_mismatches(
      dir.path(),
      "0.6.3",
      &declared(&["setup.py", "_version.py"]),
    );

    assert_eq!(offending.len(), 2);
  }
}
