use serde::{Deserialize, Serialize};

/// Branch predicate gating the instantiation of a workflow job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDef {
  #[serde(default)]
  pub branches: BranchFilterDef,
}

/// Branch allow/deny lists. Patterns are exact names or prefix globs with a
/// trailing `*` (e.g. `feature/*`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchFilterDef {
  #[serde(default)]
  pub only: Vec<String>,
  #[serde(default)]
  pub ignore: Vec<String>,
}

impl FilterDef {
  /// Evaluate the predicate against the current branch.
  pub fn matches(&self, branch: &str) -> bool {
    self.branches.matches(branch)
  }
}

impl BranchFilterDef {
  /// An empty `only` list admits every branch; `ignore` is applied after.
  pub fn matches(&self, branch: &str) -> bool {
    if !self.only.is_empty() && !self.only.iter().any(|p| pattern_matches(p, branch)) {
      return false;
    }
    !self.ignore.iter().any(|p| pattern_matches(p, branch))
  }
}

fn pattern_matches(pattern: &str, branch: &str) -> bool {
  if let Some(prefix) = pattern.strip_suffix('*') {
    branch.starts_with(prefix)
  } else {
    branch == pattern
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn only(patterns: &[&str]) -> FilterDef {
    FilterDef {
      branches: BranchFilterDef {
        only: patterns.iter().map(|s| s.to_string()).collect(),
        ignore: Vec::new(),
      },
    }
  }

  #[test]
  fn test_empty_filter_matches_everything() {
    let filter = FilterDef::default();
    assert!(filter.matches("master"));
    assert!(filter.matches("feature/x"));
  }

  #[test]
  fn test_only_exact() {
    let filter = only(&["master"]);
    assert!(filter.matches("master"));
    assert!(!filter.matches("develop"));
    assert!(!filter.matches("feature/x"));
  }

  #[test]
  fn test_only_glob() {
    let filter = only(&["master", "release/*"]);
    assert!(filter.matches("master"));
    assert!(filter.matches("release/1.2"));
    assert!(filter.matches("release/1.2/hotfix"));
    assert!(!filter.matches("feature/release"));
  }

  #[test]
  fn test_ignore_overrides_only() {
    let filter = FilterDef {
      branches: BranchFilterDef {
        only: vec!["release/*".to_string()],
        ignore: vec!["release/wip*".to_string()],
      },
    };
    assert!(filter.matches("release/1.0"));
    assert!(!filter.matches("release/wip-2"));
  }

  #[test]
  fn test_ignore_without_only() {
    let filter = FilterDef {
      branches: BranchFilterDef {
        only: Vec::new(),
        ignore: vec!["dependabot/*".to_string()],
      },
    };
    assert!(filter.matches("master"));
    assert!(!filter.matches("dependabot/pip/urllib3"));
  }
}
