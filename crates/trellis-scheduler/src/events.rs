//! Run events and notifiers for observability.
//!
//! Events are emitted while a pipeline executes so consumers can observe
//! progress, persist state, stream to UIs, etc.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use trellis_pipeline::{JobStatus, PipelineStatus};

/// Events emitted during a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
  /// The pipeline has started executing.
  PipelineStarted { run_id: String, workflow: String },

  /// A job instance has started executing.
  JobStarted { run_id: String, job: String },

  /// A job instance has finished with a terminal status.
  JobFinished {
    run_id: String,
    job: String,
    status: JobStatus,
  },

  /// A job instance was skipped because an upstream dependency did not
  /// succeed.
  JobSkipped {
    run_id: String,
    job: String,
    cause: String,
  },

  /// The pipeline has finished with a terminal status.
  PipelineFinished {
    run_id: String,
    workflow: String,
    status: PipelineStatus,
  },
}

/// Trait for receiving pipeline events.
///
/// The scheduler calls `notify` for each event - implementations decide
/// what to do with them (persist, broadcast, log, ignore, etc.).
pub trait PipelineNotifier: Send + Sync {
  fn notify(&self, event: PipelineEvent);
}

/// A no-op notifier that discards all events.
///
/// Useful for tests or when event observation is not needed.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl PipelineNotifier for NoopNotifier {
  fn notify(&self, _event: PipelineEvent) {
    // Intentionally empty
  }
}

/// A notifier that sends events to an unbounded channel.
///
/// Unbounded so a slow consumer never blocks scheduling; the event volume
/// is small (one per job transition), so memory growth is unlikely in
/// practice.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<PipelineEvent>) -> Self {
    Self { sender }
  }
}

impl PipelineNotifier for ChannelNotifier {
  fn notify(&self, event: PipelineEvent) {
    // Ignore send errors - receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
