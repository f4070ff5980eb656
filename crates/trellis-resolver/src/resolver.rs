use std::collections::{HashMap, HashSet};

use trellis_config::{PipelineDef, WorkflowDef, WorkflowJobDef};
use trellis_pipeline::{Graph, JobInstance, Pipeline, TriggerEvent, TriggerKind};

use crate::error::ResolveError;

/// Expand every workflow of `def` that the triggering event addresses.
///
/// Push events select workflows without schedule triggers; schedule fires
/// select workflows with at least one trigger whose filters admit the
/// branch. Pipelines are returned in workflow-name order.
pub fn resolve(def: &PipelineDef, event: &TriggerEvent) -> Result<Vec<Pipeline>, ResolveError> {
  let mut names: Vec<&String> = def
    .workflows
    .iter()
    .filter(|(_, workflow)| workflow_matches(workflow, event))
    .map(|(name, _)| name)
    .collect();
  names.sort();

  names
    .into_iter()
    .map(|name| resolve_workflow(def, name, &def.workflows[name], event))
    .collect()
}

/// Expand one workflow into a schedulable pipeline.
pub fn resolve_workflow(
  def: &PipelineDef,
  name: &str,
  workflow: &WorkflowDef,
  event: &TriggerEvent,
) -> Result<Pipeline, ResolveError> {
  // Expand invocations into instances, tracking base name -> instance
  // names for the requires rewrite.
  let mut jobs: HashMap<String, JobInstance> = HashMap::new();
  let mut instances_of: HashMap<&str, Vec<String>> = HashMap::new();

  for invocation in &workflow.jobs {
    let template = def
      .jobs
      .get(&invocation.job)
      .ok_or_else(|| ResolveError::UnknownTemplate {
        workflow: name.to_string(),
        job: invocation.job.clone(),
      })?;

    for (instance_name, parameters) in expand_invocation(invocation) {
      if jobs.contains_key(&instance_name) {
        return Err(ResolveError::DuplicateInstance {
          workflow: name.to_string(),
          name: instance_name,
        });
      }

      instances_of
        .entry(invocation.base_name())
        .or_default()
        .push(instance_name.clone());

      // Pipeline-wide env sits under the template's own.
      let mut env = def.env.clone();
      env.extend(template.env.clone());

      jobs.insert(
        instance_name.clone(),
        JobInstance {
          name: instance_name,
          template: invocation.job.clone(),
          image: template.image.clone(),
          env,
          parameters,
          steps: template.steps.clone(),
          timeout_ms: template.timeout_ms,
          parallelism: template.parallelism,
        },
      );
    }
  }

  // Rewrite requires edges. Depending on a matrix invocation means
  // depending on every sibling instance.
  let mut edges: Vec<(String, String)> = Vec::new();
  for invocation in &workflow.jobs {
    let Some(dependents) = instances_of.get(invocation.base_name()) else {
      continue;
    };
    for requirement in &invocation.requires {
      let dependencies = instances_of.get(requirement.as_str()).ok_or_else(|| {
        ResolveError::UnknownRequirement {
          workflow: name.to_string(),
          job: invocation.base_name().to_string(),
          requirement: requirement.clone(),
        }
      })?;
      for dependency in dependencies {
        for dependent in dependents {
          edges.push((dependency.clone(), dependent.clone()));
        }
      }
    }
  }

  // A cycle in the declared graph is a definition error even if pruning
  // would remove it.
  if has_cycle(&jobs, &edges) {
    return Err(ResolveError::CycleDetected {
      workflow: name.to_string(),
    });
  }

  // Prune instances excluded by branch filters, along with everything
  // downstream of them.
  let graph = Graph::new(&jobs, &edges);
  let mut pruned: HashSet<String> = HashSet::new();
  for invocation in &workflow.jobs {
    let admitted = invocation
      .filters
      .as_ref()
      .is_none_or(|filters| filters.branches.matches(&event.branch));
    if admitted {
      continue;
    }
    if let Some(instances) = instances_of.get(invocation.base_name()) {
      for instance in instances {
        pruned.extend(graph.descendants(instance));
        pruned.insert(instance.clone());
      }
    }
  }

  jobs.retain(|name, _| !pruned.contains(name));
  edges.retain(|(from, to)| !pruned.contains(from) && !pruned.contains(to));

  let mut filtered: Vec<String> = pruned.into_iter().collect();
  filtered.sort();

  Ok(Pipeline {
    workflow: name.to_string(),
    jobs,
    edges,
    filtered,
  })
}

/// Whether a workflow is selected by the trigger.
fn workflow_matches(workflow: &WorkflowDef, event: &TriggerEvent) -> bool {
  match event.kind {
    TriggerKind::Push => !workflow.is_scheduled(),
    TriggerKind::Schedule => workflow.triggers.iter().any(|trigger| {
      trigger
        .filters
        .as_ref()
        .is_none_or(|filters| filters.branches.matches(&event.branch))
    }),
  }
}

/// Expand an invocation into (instance name, parameter binding) pairs.
///
/// A plain invocation yields itself with an empty binding. A matrix
/// invocation yields the cartesian product of its parameter values,
/// suffixing the base name with each bound value in parameter-name order.
fn expand_invocation(
  invocation: &WorkflowJobDef,
) -> Vec<(String, HashMap<String, serde_json::Value>)> {
  let base = invocation.base_name();
  let Some(matrix) = &invocation.matrix else {
    return vec![(base.to_string(), HashMap::new())];
  };

  let mut params: Vec<&String> = matrix.parameters.keys().collect();
  params.sort();

  let mut expanded: Vec<(String, HashMap<String, serde_json::Value>)> =
    vec![(base.to_string(), HashMap::new())];
  for param in params {
    let values = &matrix.parameters[param];
    let mut next = Vec::with_capacity(expanded.len() * values.len());
    for (name, binding) in &expanded {
      for value in values {
        let mut bound = binding.clone();
        bound.insert(param.clone(), value.clone());
        next.push((format!("{}-{}", name, value_label(value)), bound));
      }
    }
    expanded = next;
  }
  expanded
}

/// Human-readable form of a matrix value for instance naming.
fn value_label(value: &serde_json::Value) -> String {
  match value {
    serde_json::Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

/// DFS with three-color marking; a back edge to an in-progress node is a
/// cycle.
fn has_cycle(jobs: &HashMap<String, JobInstance>, edges: &[(String, String)]) -> bool {
  let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
  for name in jobs.keys() {
    adjacency.insert(name.as_str(), Vec::new());
  }
  for (from, to) in edges {
    if let Some(neighbors) = adjacency.get_mut(from.as_str()) {
      neighbors.push(to.as_str());
    }
  }

  // 0 = unvisited, 1 = in progress, 2 = done
  let mut color: HashMap<&str, u8> = jobs.keys().map(|name| (name.as_str(), 0u8)).collect();

  fn dfs<'a>(
    node: &'a str,
    adjacency: &HashMap<&str, Vec<&'a str>>,
    color: &mut HashMap<&'a str, u8>,
  ) -> bool {
    color.insert(node, 1);

    if let Some(neighbors) = adjacency.get(node) {
      for &neighbor in neighbors {
        match color.get(neighbor) {
          Some(1) => return true,
          Some(0) => {
            if dfs(neighbor, adjacency, color) {
              return true;
            }
          }
          _ => {}
        }
      }
    }

    color.insert(node, 2);
    false
  }

  let names: Vec<&str> = jobs.keys().map(String::as_str).collect();
  for name in names {
    if color.get(name) == Some(&0) && dfs(name, &adjacency, &mut color) {
      return true;
    }
  }
  false
}
