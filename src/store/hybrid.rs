//! Remote-first store that falls back to the local cache.

use async_trait::async_trait;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

use super::EntityStore;
use crate::cache::{Record, Served};
use crate::error::Result;
use crate::feed::{ChangeCallback, Subscription};

/// Observer told about every fallback, with the remote failure as reason.
pub type FallbackHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Composition of a remote and a local store.
///
/// Every operation tries the remote tier first. A remote failure is logged and
/// the same operation is replayed against the local tier, whose result (or
/// error) is what the caller sees.
pub struct HybridStore<T: Record> {
  remote: Arc<dyn EntityStore<T>>,
  local: Arc<dyn EntityStore<T>>,
  on_fallback: Option<FallbackHook>,
}

impl<T: Record> HybridStore<T> {
  pub fn new(remote: Arc<dyn EntityStore<T>>, local: Arc<dyn EntityStore<T>>) -> Self {
    Self {
      remote,
      local,
      on_fallback: None,
    }
  }

  pub fn with_fallback_hook(mut self, hook: FallbackHook) -> Self {
    self.on_fallback = Some(hook);
    self
  }

  /// Like `get_items`, but also reports which tier answered.
  pub async fn get_items_with_source(&self) -> Result<Served<Vec<T>>> {
    self
      .attempt("get_items", self.remote.get_items(), || {
        self.local.get_items()
      })
      .await
  }

  /// Like `save_item`, but also reports which tier answered.
  pub async fn save_item_with_source(&self, item: T) -> Result<Served<T>> {
    let fallback_item = item.clone();
    self
      .attempt("save_item", self.remote.save_item(item), || {
        self.local.save_item(fallback_item)
      })
      .await
  }

  /// Run `remote`; on failure, run the lazily built `local` operation.
  async fn attempt<U, R, L, LF>(&self, op: &str, remote: R, local: L) -> Result<Served<U>>
  where
    R: Future<Output = Result<U>>,
    L: FnOnce() -> LF,
    LF: Future<Output = Result<U>>,
  {
    match remote.await {
      Ok(data) => Ok(Served::remote(data)),
      Err(e) => {
        self.report_fallback(op, &e.to_string());
        local().await.map(Served::fallback)
      }
    }
  }

  fn report_fallback(&self, op: &str, reason: &str) {
    warn!(
      entity = T::entity_type(),
      op,
      reason,
      "Remote store failed, using local cache"
    );
    if let Some(hook) = &self.on_fallback {
      if catch_unwind(AssertUnwindSafe(|| hook(reason))).is_err() {
        error!(entity = T::entity_type(), op, "Fallback hook panicked");
      }
    }
  }
}

impl<T: Record> Clone for HybridStore<T> {
  fn clone(&self) -> Self {
    Self {
      remote: Arc::clone(&self.remote),
      local: Arc::clone(&self.local),
      on_fallback: self.on_fallback.clone(),
    }
  }
}

#[async_trait]
impl<T: Record> EntityStore<T> for HybridStore<T> {
  async fn get_items(&self) -> Result<Vec<T>> {
    Ok(self.get_items_with_source().await?.data)
  }

  async fn save_item(&self, item: T) -> Result<T> {
    Ok(self.save_item_with_source(item).await?.data)
  }

  async fn delete_item(&self, id: &str) -> Result<bool> {
    let served = self
      .attempt("delete_item", self.remote.delete_item(id), || {
        self.local.delete_item(id)
      })
      .await?;
    Ok(served.data)
  }

  async fn get_item_by_id(&self, id: &str) -> Result<Option<T>> {
    let served = self
      .attempt("get_item_by_id", self.remote.get_item_by_id(id), || {
        self.local.get_item_by_id(id)
      })
      .await?;
    Ok(served.data)
  }

  /// Events come from whichever feed starts first; there is no later switch.
  /// Never fails: with both feeds down the handle is a no-op.
  fn subscribe(&self, callback: ChangeCallback<T>) -> Result<Subscription> {
    match self.remote.subscribe(Arc::clone(&callback)) {
      Ok(subscription) => return Ok(subscription),
      Err(e) => self.report_fallback("subscribe", &e.to_string()),
    }

    match self.local.subscribe(callback) {
      Ok(subscription) => Ok(subscription),
      Err(e) => {
        error!(
          entity = T::entity_type(),
          error = %e,
          "Local change feed failed too, subscription is inert"
        );
        Ok(Subscription::noop())
      }
    }
  }

  async fn initialize(&self) -> Result<()> {
    if let Err(e) = self.remote.initialize().await {
      self.report_fallback("initialize", &e.to_string());
    }
    self.local.initialize().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{LocalStore, MemoryStorage, Source};
  use crate::error::StoreError;
  use crate::feed::ChangeEvent;
  use crate::store::StoreConfig;
  use serde::{Deserialize, Serialize};
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Item {
    id: String,
    v: i32,
  }

  impl Record for Item {
    fn record_id(&self) -> String {
      self.id.clone()
    }

    fn entity_type() -> &'static str {
      "item"
    }
  }

  fn item(id: &str, v: i32) -> Item {
    Item {
      id: id.to_string(),
      v,
    }
  }

  /// In-memory tier that can be switched into failure mode.
  #[derive(Default)]
  struct FakeTier {
    items: Mutex<Vec<Item>>,
    down: bool,
    calls: AtomicUsize,
    subscriptions: AtomicUsize,
  }

  impl FakeTier {
    fn up(items: Vec<Item>) -> Arc<Self> {
      Arc::new(Self {
        items: Mutex::new(items),
        ..Default::default()
      })
    }

    fn down() -> Arc<Self> {
      Arc::new(Self {
        down: true,
        ..Default::default()
      })
    }

    fn check(&self) -> Result<()> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if self.down {
        Err(StoreError::remote("items", "connection refused"))
      } else {
        Ok(())
      }
    }
  }

  #[async_trait]
  impl EntityStore<Item> for FakeTier {
    async fn get_items(&self) -> Result<Vec<Item>> {
      self.check()?;
      Ok(self.items.lock().unwrap().clone())
    }

    async fn save_item(&self, item: Item) -> Result<Item> {
      self.check()?;
      self.items.lock().unwrap().push(item.clone());
      Ok(item)
    }

    async fn delete_item(&self, id: &str) -> Result<bool> {
      self.check()?;
      let mut items = self.items.lock().unwrap();
      let before = items.len();
      items.retain(|i| i.id != id);
      Ok(items.len() < before)
    }

    async fn get_item_by_id(&self, id: &str) -> Result<Option<Item>> {
      self.check()?;
      Ok(self.items.lock().unwrap().iter().find(|i| i.id == id).cloned())
    }

    fn subscribe(&self, _callback: ChangeCallback<Item>) -> Result<Subscription> {
      self.subscriptions.fetch_add(1, Ordering::SeqCst);
      if self.down {
        Err(StoreError::FeedUnavailable("no timer".into()))
      } else {
        Ok(Subscription::noop())
      }
    }

    async fn initialize(&self) -> Result<()> {
      self.check()
    }
  }

  fn recording_hook() -> (FallbackHook, Arc<Mutex<Vec<String>>>) {
    let reasons = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reasons);
    let hook: FallbackHook = Arc::new(move |reason: &str| {
      sink.lock().unwrap().push(reason.to_string());
    });
    (hook, reasons)
  }

  fn noop_callback() -> ChangeCallback<Item> {
    Arc::new(|_: ChangeEvent<Item>| {})
  }

  #[tokio::test]
  async fn test_remote_answers_when_up() {
    let remote = FakeTier::up(vec![item("r", 1)]);
    let local = FakeTier::up(vec![item("l", 1)]);
    let store = HybridStore::<Item>::new(remote, local.clone());

    let served = store.get_items_with_source().await.unwrap();
    assert_eq!(served.source, Source::Remote);
    assert_eq!(served.data, vec![item("r", 1)]);
    assert_eq!(local.calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_fallback_reports_reason_once() {
    let storage = Arc::new(MemoryStorage::new());
    let local = LocalStore::new(
      storage,
      &StoreConfig::new("items", "items").with_default_items(vec![item("x", 1)]),
    )
    .unwrap();
    let (hook, reasons) = recording_hook();
    let store = HybridStore::<Item>::new(FakeTier::down(), Arc::new(local)).with_fallback_hook(hook);

    let served = store.get_items_with_source().await.unwrap();
    assert_eq!(served.source, Source::Fallback);
    assert_eq!(served.data, vec![item("x", 1)]);

    let reasons = reasons.lock().unwrap();
    assert_eq!(reasons.len(), 1);
    assert!(reasons[0].contains("connection refused"));
  }

  #[tokio::test]
  async fn test_fallback_matches_local_result() {
    let local = FakeTier::up(vec![item("a", 1), item("b", 2)]);
    let store = HybridStore::<Item>::new(FakeTier::down(), local.clone());

    assert_eq!(store.get_items().await.unwrap(), local.get_items().await.unwrap());
    assert_eq!(store.get_item_by_id("b").await.unwrap(), Some(item("b", 2)));
    assert_eq!(store.get_item_by_id("nope").await.unwrap(), None);
    assert!(store.delete_item("a").await.unwrap());

    let saved = store.save_item(item("c", 3)).await.unwrap();
    assert_eq!(saved, item("c", 3));
    assert_eq!(local.items.lock().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn test_both_tiers_failing_surfaces_local_error() {
    let local_storage = Arc::new(MemoryStorage::with_quota(4));
    let local = LocalStore::new(local_storage, &StoreConfig::new("items", "items")).unwrap();
    let store = HybridStore::<Item>::new(FakeTier::down(), Arc::new(local));

    let err = store.save_item(item("big", 1)).await.unwrap_err();
    assert!(matches!(err, StoreError::Persistence(_)));
  }

  #[tokio::test]
  async fn test_remote_delete_false_is_not_a_fallback() {
    let remote = FakeTier::up(vec![]);
    let local = FakeTier::up(vec![item("a", 1)]);
    let (hook, reasons) = recording_hook();
    let store = HybridStore::<Item>::new(remote, local.clone()).with_fallback_hook(hook);

    assert!(!store.delete_item("a").await.unwrap());
    assert!(reasons.lock().unwrap().is_empty());
    assert_eq!(local.items.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_panicking_hook_does_not_break_fallback() {
    let hook: FallbackHook = Arc::new(|_: &str| panic!("observer bug"));
    let store =
      HybridStore::<Item>::new(FakeTier::down(), FakeTier::up(vec![item("x", 1)])).with_fallback_hook(hook);

    assert_eq!(store.get_items().await.unwrap(), vec![item("x", 1)]);
  }

  #[tokio::test]
  async fn test_subscribe_prefers_remote_feed() {
    let remote = FakeTier::up(vec![]);
    let local = FakeTier::up(vec![]);
    let store = HybridStore::<Item>::new(remote.clone(), local.clone());

    let _subscription = store.subscribe(noop_callback()).unwrap();
    assert_eq!(remote.subscriptions.load(Ordering::SeqCst), 1);
    assert_eq!(local.subscriptions.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_subscribe_falls_back_to_local_feed() {
    let local = FakeTier::up(vec![]);
    let (hook, reasons) = recording_hook();
    let store = HybridStore::<Item>::new(FakeTier::down(), local.clone()).with_fallback_hook(hook);

    let _subscription = store.subscribe(noop_callback()).unwrap();
    assert_eq!(local.subscriptions.load(Ordering::SeqCst), 1);
    assert_eq!(reasons.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_subscribe_never_fails() {
    let store = HybridStore::<Item>::new(FakeTier::down(), FakeTier::down());
    let subscription = store.subscribe(noop_callback()).unwrap();
    subscription.unsubscribe();
    assert!(!subscription.is_active());
  }

  #[test]
  fn test_subscribe_outside_runtime_is_noop() {
    let scheduler: Arc<dyn crate::clock::Scheduler> = Arc::new(crate::clock::ManualScheduler::new());
    let tier = || {
      LocalStore::with_feed(
        Arc::new(MemoryStorage::new()),
        &StoreConfig::new("items", "items"),
        scheduler.clone(),
        std::time::Duration::from_secs(1),
      )
      .unwrap()
    };
    let store = HybridStore::<Item>::new(Arc::new(tier()), Arc::new(tier()));

    let subscription = store.subscribe(noop_callback()).unwrap();
    assert!(!subscription.is_active());
  }

  #[tokio::test]
  async fn test_initialize_seeds_local_even_if_remote_fails() {
    let storage = Arc::new(MemoryStorage::new());
    let local = LocalStore::new(
      storage.clone(),
      &StoreConfig::new("items", "items").with_default_items(vec![item("seed", 1)]),
    )
    .unwrap();
    let store = HybridStore::<Item>::new(FakeTier::down(), Arc::new(local));

    store.initialize().await.unwrap();
    assert!(crate::cache::KeyValueStore::contains(storage.as_ref(), "items").unwrap());
  }
}
