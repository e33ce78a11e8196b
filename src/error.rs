//! Error types shared by every store tier.

use thiserror::Error;

/// Failures surfaced by the storage layer.
///
/// Remote failures are recoverable: the hybrid store turns them into a local
/// fallback and only reports them when the local tier fails too.
#[derive(Debug, Error)]
pub enum StoreError {
  /// Network failure or non-success response from the remote API
  #[error("Remote request to {endpoint} failed: {message}")]
  Remote {
    endpoint: String,
    status: Option<u16>,
    message: String,
  },

  /// Local persistence failed (serialization, quota, database)
  #[error("Local persistence error: {0}")]
  Persistence(String),

  /// Programmer error detected while building a store
  #[error("Configuration error: {0}")]
  Configuration(String),

  /// Payload could not be decoded into a record
  #[error("Failed to decode {entity}: {message}")]
  Decode {
    entity: &'static str,
    message: String,
  },

  #[error("Definition not found: {0}")]
  DefinitionNotFound(String),

  /// Run state machine violation
  #[error("Invalid run transition: {0}")]
  InvalidTransition(String),

  /// A change feed could not be started
  #[error("Change feed unavailable: {0}")]
  FeedUnavailable(String),

  /// Operation not offered by this tier
  #[error("Unsupported: {0}")]
  Unsupported(String),
}

impl StoreError {
  pub fn remote(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Remote {
      endpoint: endpoint.into(),
      status: None,
      message: message.into(),
    }
  }

  /// True for failures the hybrid store recovers from by falling back.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::Remote { .. })
  }
}

impl From<rusqlite::Error> for StoreError {
  fn from(e: rusqlite::Error) -> Self {
    Self::Persistence(e.to_string())
  }
}

pub type Result<T> = std::result::Result<T, StoreError>;
