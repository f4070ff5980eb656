use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("malformed pipeline document: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("invalid pipeline definition: {reason}")]
  Invalid { reason: String },
}

impl ConfigError {
  pub(crate) fn invalid(reason: impl Into<String>) -> Self {
    Self::Invalid {
      reason: reason.into(),
    }
  }
}
