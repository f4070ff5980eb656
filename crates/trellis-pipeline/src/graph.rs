use std::collections::{HashMap, HashSet, VecDeque};

/// Dependency graph over job instances, for traversal and analysis.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Adjacency list: instance name -> downstream instance names.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: instance name -> upstream instance names.
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Instances with no incoming edges, sorted for deterministic dispatch.
  entry_points: Vec<String>,
}

impl Graph {
  /// Build a graph from named instances and (dependency, dependent) edges.
  pub fn new<T>(nodes: &HashMap<String, T>, edges: &[(String, String)]) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for name in nodes.keys() {
      adjacency.entry(name.clone()).or_default();
      reverse_adjacency.entry(name.clone()).or_default();
    }

    for (from, to) in edges {
      adjacency.entry(from.clone()).or_default().push(to.clone());
      reverse_adjacency
        .entry(to.clone())
        .or_default()
        .push(from.clone());
    }

    let mut entry_points: Vec<String> = nodes
      .keys()
      .filter(|name| reverse_adjacency.get(*name).is_none_or(|v| v.is_empty()))
      .cloned()
      .collect();
    entry_points.sort();

    Self {
      adjacency,
      reverse_adjacency,
      entry_points,
    }
  }

  /// Instances with no incoming edges.
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Direct dependents of an instance.
  pub fn downstream(&self, name: &str) -> &[String] {
    self.adjacency.get(name).map(|v| v.as_slice()).unwrap_or(&[])
  }

  /// Direct dependencies of an instance.
  pub fn upstream(&self, name: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(name)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Every instance reachable from `name` through downstream edges,
  /// excluding `name` itself. Sorted for deterministic reporting.
  pub fn descendants(&self, name: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = self.downstream(name).iter().cloned().collect();

    while let Some(next) = queue.pop_front() {
      if seen.insert(next.clone()) {
        queue.extend(self.downstream(&next).iter().cloned());
      }
    }

    let mut out: Vec<String> = seen.into_iter().collect();
    out.sort();
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn diamond() -> Graph {
    // install -> {lint, test} -> release
    let nodes: HashMap<String, ()> = ["install", "lint", "test", "release"]
      .into_iter()
      .map(|n| (n.to_string(), ()))
      .collect();
    let edges = vec![
      ("install".to_string(), "lint".to_string()),
      ("install".to_string(), "test".to_string()),
      ("lint".to_string(), "release".to_string()),
      ("test".to_string(), "release".to_string()),
    ];
    Graph::new(&nodes, &edges)
  }

  #[test]
  fn test_entry_points() {
    let graph = diamond();
    assert_eq!(graph.entry_points(), &["install".to_string()]);
  }

  #[test]
  fn test_upstream_downstream() {
    let graph = diamond();
    let mut downstream = graph.downstream("install").to_vec();
    downstream.sort();
    assert_eq!(downstream, vec!["lint".to_string(), "test".to_string()]);

    let mut upstream = graph.upstream("release").to_vec();
    upstream.sort();
    assert_eq!(upstream, vec!["lint".to_string(), "test".to_string()]);

    assert!(graph.upstream("install").is_empty());
    assert!(graph.downstream("release").is_empty());
  }

  #[test]
  fn test_descendants() {
    let graph = diamond();
    assert_eq!(
      graph.descendants("install"),
      vec![
        "lint".to_string(),
        "release".to_string(),
        "test".to_string()
      ]
    );
    assert_eq!(graph.descendants("lint"), vec!["release".to_string()]);
    assert!(graph.descendants("release").is_empty());
  }

  #[test]
  fn test_disconnected_nodes_are_entry_points() {
    let nodes: HashMap<String, ()> = [("a".to_string(), ()), ("b".to_string(), ())]
      .into_iter()
      .collect();
    let graph = Graph::new(&nodes, &[]);
    assert_eq!(
      graph.entry_points(),
      &["a".to_string(), "b".to_string()]
    );
  }
}
