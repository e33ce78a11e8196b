//! Core traits and types for stored records.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Trait for entities that can be stored.
///
/// The storage layer never looks inside a record beyond its identity; everything
/// else is carried as serialized JSON.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Identity of this record (e.g., run id). May be empty for records not yet
  /// assigned an id by the backend.
  fn record_id(&self) -> String;

  /// Entity type name used in logs and errors (e.g., "run", "suite")
  fn entity_type() -> &'static str;
}

/// Where `save_item` puts a record that is not stored yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertMode {
  /// New records go to the end of the list
  #[default]
  Append,
  /// New records go to the front, so capacity eviction drops the oldest
  Prepend,
}

/// Source of the data returned by a hybrid operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
  /// Served by the remote API
  Remote,
  /// Remote failed, served by the local cache
  Fallback,
}

/// Result of a hybrid operation along with the tier that produced it.
#[derive(Debug, Clone)]
pub struct Served<T> {
  pub data: T,
  pub source: Source,
}

impl<T> Served<T> {
  pub fn remote(data: T) -> Self {
    Self {
      data,
      source: Source::Remote,
    }
  }

  pub fn fallback(data: T) -> Self {
    Self {
      data,
      source: Source::Fallback,
    }
  }
}
