//! Typed CRUD store over one key of a [`KeyValueStore`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::storage::KeyValueStore;
use super::traits::{InsertMode, Record};
use crate::clock::{Scheduler, TokioScheduler};
use crate::error::{Result, StoreError};
use crate::feed::{start_feed, ChangeCallback, Subscription};
use crate::store::{EntityStore, StoreConfig};

/// Default polling interval of the local change feed.
pub const LOCAL_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Local cache store for one record type.
///
/// Reads never fail: a missing or unreadable key yields the default items.
/// Writes are read-modify-write of the whole list and are serialized per store
/// instance.
pub struct LocalStore<T: Record> {
  inner: Arc<LocalInner<T>>,
}

struct LocalInner<T: Record> {
  storage: Arc<dyn KeyValueStore>,
  storage_key: String,
  default_items: Vec<T>,
  insert_mode: InsertMode,
  max_items: Option<usize>,
  scheduler: Arc<dyn Scheduler>,
  poll_interval: Duration,
  write_gate: Mutex<()>,
}

impl<T: Record> LocalStore<T> {
  /// Create a store over `storage` using the local part of `config`.
  pub fn new(storage: Arc<dyn KeyValueStore>, config: &StoreConfig<T>) -> Result<Self> {
    Self::with_feed(
      storage,
      config,
      Arc::new(TokioScheduler),
      LOCAL_POLL_INTERVAL,
    )
  }

  /// Create a store whose change feed uses `scheduler` and `poll_interval`.
  pub fn with_feed(
    storage: Arc<dyn KeyValueStore>,
    config: &StoreConfig<T>,
    scheduler: Arc<dyn Scheduler>,
    poll_interval: Duration,
  ) -> Result<Self> {
    config.validate()?;
    if poll_interval.is_zero() {
      return Err(StoreError::Configuration(
        "polling interval must be greater than zero".to_string(),
      ));
    }

    Ok(Self {
      inner: Arc::new(LocalInner {
        storage,
        storage_key: config.storage_key.clone(),
        default_items: config.default_items.clone(),
        insert_mode: config.insert_mode,
        max_items: config.max_items,
        scheduler,
        poll_interval,
        write_gate: Mutex::new(()),
      }),
    })
  }

  pub fn storage_key(&self) -> &str {
    &self.inner.storage_key
  }

  /// Read the stored list, degrading to the defaults on any failure.
  fn read_list(&self) -> Vec<T> {
    let key = &self.inner.storage_key;
    match self.inner.storage.get(key) {
      Ok(Some(raw)) => match serde_json::from_str(&raw) {
        Ok(list) => list,
        Err(e) => {
          warn!(key = %key, error = %e, "Stored list is unreadable, using defaults");
          self.inner.default_items.clone()
        }
      },
      Ok(None) => self.inner.default_items.clone(),
      Err(e) => {
        warn!(key = %key, error = %e, "Failed to read local storage, using defaults");
        self.inner.default_items.clone()
      }
    }
  }

  fn write_list(&self, list: &[T]) -> Result<()> {
    let raw = serde_json::to_string(list).map_err(|e| {
      StoreError::Persistence(format!("Failed to serialize {}: {}", T::entity_type(), e))
    })?;
    self.inner.storage.set(&self.inner.storage_key, &raw)
  }

  /// Place `item` into `list` by identity, then enforce the capacity.
  fn upsert(&self, list: &mut Vec<T>, item: T) {
    let id = item.record_id();
    match list.iter().position(|existing| existing.record_id() == id) {
      Some(index) => list[index] = item,
      None => match self.inner.insert_mode {
        InsertMode::Append => list.push(item),
        InsertMode::Prepend => list.insert(0, item),
      },
    }

    if let Some(max) = self.inner.max_items {
      if list.len() > max {
        let excess = list.len() - max;
        // Evict from the end opposite to insertion, i.e. the oldest records
        match self.inner.insert_mode {
          // Departs from plain tail truncation, which would drop the new record
          InsertMode::Append => {
            list.drain(..excess);
          }
          InsertMode::Prepend => list.truncate(max),
        }
        debug!(
          key = %self.inner.storage_key,
          evicted = excess,
          "Evicted records over capacity"
        );
      }
    }
  }
}

impl<T: Record> Clone for LocalStore<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

#[async_trait]
impl<T: Record> EntityStore<T> for LocalStore<T> {
  async fn get_items(&self) -> Result<Vec<T>> {
    Ok(self.read_list())
  }

  async fn save_item(&self, item: T) -> Result<T> {
    let _gate = self.inner.write_gate.lock().await;
    let mut list = self.read_list();
    self.upsert(&mut list, item.clone());
    self.write_list(&list)?;
    Ok(item)
  }

  async fn delete_item(&self, id: &str) -> Result<bool> {
    let _gate = self.inner.write_gate.lock().await;
    let mut list = self.read_list();
    list.retain(|item| item.record_id() != id);
    self.write_list(&list)?;
    Ok(true)
  }

  async fn get_item_by_id(&self, id: &str) -> Result<Option<T>> {
    Ok(self.read_list().into_iter().find(|item| item.record_id() == id))
  }

  fn subscribe(&self, callback: ChangeCallback<T>) -> Result<Subscription> {
    start_feed(
      Arc::new(self.clone()),
      self.inner.scheduler.as_ref(),
      self.inner.poll_interval,
      callback,
    )
  }

  async fn initialize(&self) -> Result<()> {
    let _gate = self.inner.write_gate.lock().await;
    if !self.inner.storage.contains(&self.inner.storage_key)? {
      debug!(key = %self.inner.storage_key, "Seeding local storage with defaults");
      self.write_list(&self.inner.default_items)?;
    }
    Ok(())
  }
}
