use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What caused a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
  Push,
  Schedule,
}

impl TriggerKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      TriggerKind::Push => "push",
      TriggerKind::Schedule => "schedule",
    }
  }
}

/// A triggering event: a push to a branch or a schedule fire.
///
/// Both resolve to "run the matching workflows against `branch` at
/// `revision`".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
  pub kind: TriggerKind,
  pub branch: String,
  pub revision: String,

  /// Parameters supplied by the trigger, layered over pipeline defaults.
  #[serde(default)]
  pub parameters: HashMap<String, serde_json::Value>,
}

impl TriggerEvent {
  pub fn push(branch: impl Into<String>, revision: impl Into<String>) -> Self {
    Self {
      kind: TriggerKind::Push,
      branch: branch.into(),
      revision: revision.into(),
      parameters: HashMap::new(),
    }
  }

  pub fn schedule(branch: impl Into<String>, revision: impl Into<String>) -> Self {
    Self {
      kind: TriggerKind::Schedule,
      branch: branch.into(),
      revision: revision.into(),
      parameters: HashMap::new(),
    }
  }
}

/// Identity and inputs of one pipeline run, shared by every job in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
  pub run_id: String,
  pub pipeline: String,
  pub trigger: TriggerKind,
  pub branch: String,
  pub revision: String,
  pub started_at: DateTime<Utc>,
  pub parameters: HashMap<String, serde_json::Value>,
}

impl RunContext {
  /// Mint a fresh run for `event`, merging pipeline defaults under
  /// trigger-supplied parameters.
  pub fn new(
    pipeline: impl Into<String>,
    defaults: &HashMap<String, serde_json::Value>,
    event: &TriggerEvent,
  ) -> Self {
    let mut parameters = defaults.clone();
    parameters.extend(event.parameters.clone());

    Self {
      run_id: uuid::Uuid::new_v4().to_string(),
      pipeline: pipeline.into(),
      trigger: event.kind,
      branch: event.branch.clone(),
      revision: event.revision.clone(),
      started_at: Utc::now(),
      parameters,
    }
  }
}
