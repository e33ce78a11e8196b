//! The uniform store contract and its per-entity configuration.

mod hybrid;

use async_trait::async_trait;

pub use hybrid::{FallbackHook, HybridStore};

use crate::cache::{InsertMode, Record};
use crate::error::{Result, StoreError};
use crate::feed::{ChangeCallback, Subscription};
use crate::remote::Transforms;

/// CRUD plus change-feed contract shared by every store tier.
#[async_trait]
pub trait EntityStore<T: Record>: Send + Sync {
  /// Current snapshot of all records.
  async fn get_items(&self) -> Result<Vec<T>>;

  /// Insert or replace the record with the same identity.
  async fn save_item(&self, item: T) -> Result<T>;

  /// Remove the record with `id`.
  async fn delete_item(&self, id: &str) -> Result<bool>;

  /// Look up a record. A missing record is `Ok(None)`, not an error.
  async fn get_item_by_id(&self, id: &str) -> Result<Option<T>>;

  /// Start a change feed. Events keep flowing until the returned handle is
  /// unsubscribed or dropped.
  fn subscribe(&self, callback: ChangeCallback<T>) -> Result<Subscription>;

  /// Prepare the backing storage (e.g., seed default items).
  async fn initialize(&self) -> Result<()>;
}

/// Per-entity store configuration.
pub struct StoreConfig<T: Record> {
  /// Local storage key holding the JSON array
  pub storage_key: String,
  /// Remote collection path relative to the API base URL
  pub endpoint: String,
  /// Seed data used while the storage key is unset
  pub default_items: Vec<T>,
  pub insert_mode: InsertMode,
  /// Capacity of the local list; `None` means unbounded
  pub max_items: Option<usize>,
  /// Wire format hooks for the remote tier
  pub transforms: Transforms<T>,
}

impl<T: Record> StoreConfig<T> {
  pub fn new(storage_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
    Self {
      storage_key: storage_key.into(),
      endpoint: endpoint.into(),
      default_items: Vec::new(),
      insert_mode: InsertMode::Append,
      max_items: None,
      transforms: Transforms::none(),
    }
  }

  pub fn with_default_items(mut self, items: Vec<T>) -> Self {
    self.default_items = items;
    self
  }

  pub fn with_insert_mode(mut self, mode: InsertMode) -> Self {
    self.insert_mode = mode;
    self
  }

  pub fn with_max_items(mut self, max_items: usize) -> Self {
    self.max_items = Some(max_items);
    self
  }

  pub fn with_transforms(mut self, transforms: Transforms<T>) -> Self {
    self.transforms = transforms;
    self
  }

  /// Reject configurations that can never work.
  pub fn validate(&self) -> Result<()> {
    if self.storage_key.trim().is_empty() {
      return Err(StoreError::Configuration(format!(
        "{} store needs a storage key",
        T::entity_type()
      )));
    }
    let endpoint = self.endpoint.trim();
    if endpoint.is_empty()
      || endpoint.starts_with('/')
      || endpoint.ends_with('/')
      || endpoint.contains(['?', '#', ' '])
    {
      return Err(StoreError::Configuration(format!(
        "malformed endpoint for {}: {:?}",
        T::entity_type(),
        self.endpoint
      )));
    }
    if self.max_items == Some(0) {
      return Err(StoreError::Configuration(format!(
        "{} store capacity must be at least 1",
        T::entity_type()
      )));
    }
    Ok(())
  }
}

impl<T: Record> Clone for StoreConfig<T> {
  fn clone(&self) -> Self {
    Self {
      storage_key: self.storage_key.clone(),
      endpoint: self.endpoint.clone(),
      default_items: self.default_items.clone(),
      insert_mode: self.insert_mode,
      max_items: self.max_items,
      transforms: self.transforms.clone(),
    }
  }
}
