//! Polling subscriptions that turn snapshots into change events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::diff::{ChangeEvent, PollState};
use crate::cache::Record;
use crate::clock::Scheduler;
use crate::error::{Result, StoreError};
use crate::store::EntityStore;

/// Callback invoked for every change event.
pub type ChangeCallback<T> = Arc<dyn Fn(ChangeEvent<T>) + Send + Sync>;

/// Handle to a running change feed.
///
/// Dropping the handle unsubscribes, so keep it alive for as long as events
/// are wanted.
#[must_use = "dropping a Subscription stops its change feed"]
pub struct Subscription {
  active: Arc<AtomicBool>,
  task: Mutex<Option<JoinHandle<()>>>,
}

impl Subscription {
  /// A subscription that never delivers anything.
  pub fn noop() -> Self {
    Self {
      active: Arc::new(AtomicBool::new(false)),
      task: Mutex::new(None),
    }
  }

  /// Stop polling. No callback starts after this returns, including callbacks
  /// from a poll that was already in flight. Calling it again is harmless.
  pub fn unsubscribe(&self) {
    self.active.store(false, Ordering::SeqCst);
    if let Ok(mut task) = self.task.lock() {
      if let Some(handle) = task.take() {
        handle.abort();
      }
    }
  }

  pub fn is_active(&self) -> bool {
    self.active.load(Ordering::SeqCst)
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.unsubscribe();
  }
}

impl std::fmt::Debug for Subscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("active", &self.is_active())
      .finish_non_exhaustive()
  }
}

/// Start polling `source` every `period` and report differences to `callback`.
///
/// Each tick spawns its own poll. A poll slower than the period does not hold
/// back the next tick, so overlapping polls can deliver events out of order.
pub fn start_feed<T: Record>(
  source: Arc<dyn EntityStore<T>>,
  scheduler: &dyn Scheduler,
  period: Duration,
  callback: ChangeCallback<T>,
) -> Result<Subscription> {
  let runtime = tokio::runtime::Handle::try_current()
    .map_err(|e| StoreError::FeedUnavailable(format!("no async runtime: {}", e)))?;
  let mut ticker = scheduler.ticker(period)?;
  let active = Arc::new(AtomicBool::new(true));
  let state = Arc::new(Mutex::new(PollState::<T>::new()));
  let entity = T::entity_type();

  let loop_active = Arc::clone(&active);
  let handle = runtime.spawn(async move {
    while ticker.tick().await {
      if !loop_active.load(Ordering::SeqCst) {
        break;
      }

      let source = Arc::clone(&source);
      let state = Arc::clone(&state);
      let callback = Arc::clone(&callback);
      let active = Arc::clone(&loop_active);
      tokio::spawn(async move {
        let items = match source.get_items().await {
          Ok(items) => items,
          Err(e) => {
            error!(entity, error = %e, "Polling error in subscribe");
            return;
          }
        };

        let events = match state.lock() {
          Ok(mut state) => state.advance(items),
          Err(_) => return,
        };
        if !events.is_empty() {
          debug!(entity, count = events.len(), "Change feed detected changes");
        }

        for event in events {
          // Results of a poll that outlived unsubscribe are discarded
          if !active.load(Ordering::SeqCst) {
            return;
          }
          callback(event);
        }
      });
    }
  });

  Ok(Subscription {
    active,
    task: Mutex::new(Some(handle)),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{LocalStore, MemoryStorage};
  use crate::clock::ManualScheduler;
  use crate::feed::ChangeKind;
  use crate::store::StoreConfig;
  use async_trait::async_trait;
  use serde::{Deserialize, Serialize};
  use std::collections::VecDeque;
  use tokio::sync::mpsc;
  use tokio::time::timeout;

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

  fn store() -> LocalStore<Item> {
    let config = StoreConfig::new("items", "items");
    LocalStore::new(Arc::new(MemoryStorage::new()), &config).unwrap()
  }

  fn source(store: &LocalStore<Item>) -> Arc<dyn EntityStore<Item>> {
    Arc::new(store.clone())
  }

  /// Reads `store` at call time, then holds the snapshot for the next queued delay.
  struct SlowSource {
    store: LocalStore<Item>,
    delays: Mutex<VecDeque<Duration>>,
  }

  impl SlowSource {
    fn new(store: &LocalStore<Item>, delays: &[u64]) -> Arc<dyn EntityStore<Item>> {
      Arc::new(Self {
        store: store.clone(),
        delays: Mutex::new(delays.iter().map(|ms| Duration::from_millis(*ms)).collect()),
      })
    }
  }

  #[async_trait]
  impl EntityStore<Item> for SlowSource {
    async fn get_items(&self) -> Result<Vec<Item>> {
      let snapshot = self.store.get_items().await?;
      let delay = self.delays.lock().unwrap().pop_front().unwrap_or_default();
      tokio::time::sleep(delay).await;
      Ok(snapshot)
    }

    async fn save_item(&self, item: Item) -> Result<Item> {
      self.store.save_item(item).await
    }

    async fn delete_item(&self, id: &str) -> Result<bool> {
      self.store.delete_item(id).await
    }

    async fn get_item_by_id(&self, id: &str) -> Result<Option<Item>> {
      self.store.get_item_by_id(id).await
    }

    fn subscribe(&self, _callback: ChangeCallback<Item>) -> Result<Subscription> {
      Ok(Subscription::noop())
    }

    async fn initialize(&self) -> Result<()> {
      Ok(())
    }
  }

  fn channel_callback() -> (ChangeCallback<Item>, mpsc::UnboundedReceiver<ChangeEvent<Item>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: ChangeCallback<Item> = Arc::new(move |event: ChangeEvent<Item>| {
      let _ = tx.send(event);
    });
    (callback, rx)
  }

  async fn next(rx: &mut mpsc::UnboundedReceiver<ChangeEvent<Item>>) -> ChangeEvent<Item> {
    timeout(Duration::from_secs(1), rx.recv())
      .await
      .expect("timed out waiting for event")
      .expect("channel closed")
  }

  async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<ChangeEvent<Item>>) {
    assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
  }

  #[tokio::test]
  async fn test_feed_reports_insert_update_delete() {
    let store = store();
    let scheduler = ManualScheduler::new();
    let (callback, mut rx) = channel_callback();
    let sub = start_feed(source(&store), &scheduler, Duration::from_secs(1), callback).unwrap();

    // Empty store: first tick has nothing to report
    scheduler.advance();
    assert_quiet(&mut rx).await;

    store.save_item(item("a", 1)).await.unwrap();
    scheduler.advance();
    assert_eq!(next(&mut rx).await, ChangeEvent::insert(item("a", 1)));

    store.save_item(item("a", 2)).await.unwrap();
    scheduler.advance();
    assert_eq!(next(&mut rx).await, ChangeEvent::update(item("a", 2)));

    store.delete_item("a").await.unwrap();
    scheduler.advance();
    let event = next(&mut rx).await;
    assert_eq!(event.kind, ChangeKind::Delete);
    assert_eq!(event.item, item("a", 2));

    sub.unsubscribe();
  }

  #[tokio::test]
  async fn test_first_tick_inserts_existing_items() {
    let store = store();
    store.save_item(item("x", 1)).await.unwrap();
    store.save_item(item("y", 1)).await.unwrap();

    let scheduler = ManualScheduler::new();
    let (callback, mut rx) = channel_callback();
    let _sub = start_feed(
      source(&store),
      &scheduler,
      Duration::from_secs(1),
      callback,
    )
    .unwrap();

    scheduler.advance();
    assert_eq!(next(&mut rx).await, ChangeEvent::insert(item("x", 1)));
    assert_eq!(next(&mut rx).await, ChangeEvent::insert(item("y", 1)));
  }

  #[tokio::test]
  async fn test_unsubscribe_stops_callbacks() {
    let store = store();
    let scheduler = ManualScheduler::new();
    let (callback, mut rx) = channel_callback();
    let sub = start_feed(
      source(&store),
      &scheduler,
      Duration::from_secs(1),
      callback,
    )
    .unwrap();
    assert!(sub.is_active());

    sub.unsubscribe();
    sub.unsubscribe();
    assert!(!sub.is_active());

    store.save_item(item("a", 1)).await.unwrap();
    scheduler.advance();
    assert_quiet(&mut rx).await;
    assert_eq!(scheduler.live_timers(), 0);
  }

  #[tokio::test]
  async fn test_poll_in_flight_at_unsubscribe_is_discarded() {
    let store = store();
    store.save_item(item("a", 1)).await.unwrap();
    let scheduler = ManualScheduler::new();
    let (callback, mut rx) = channel_callback();
    let sub = start_feed(
      SlowSource::new(&store, &[100]),
      &scheduler,
      Duration::from_secs(1),
      callback,
    )
    .unwrap();

    scheduler.advance();
    tokio::time::sleep(Duration::from_millis(20)).await;
    sub.unsubscribe();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_quiet(&mut rx).await;
  }

  #[tokio::test]
  async fn test_overlapping_polls_can_deliver_stale_events() {
    let store = store();
    store.save_item(item("a", 1)).await.unwrap();
    let scheduler = ManualScheduler::new();
    let (callback, mut rx) = channel_callback();
    let _sub = start_feed(
      SlowSource::new(&store, &[100, 0]),
      &scheduler,
      Duration::from_secs(1),
      callback,
    )
    .unwrap();

    // First poll reads a=1 and stalls
    scheduler.advance();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Second poll reads a=2 and finishes first
    store.save_item(item("a", 2)).await.unwrap();
    scheduler.advance();
    assert_eq!(next(&mut rx).await, ChangeEvent::insert(item("a", 2)));

    // The stalled poll still lands and rolls the value back
    assert_eq!(next(&mut rx).await, ChangeEvent::update(item("a", 1)));
    assert_quiet(&mut rx).await;
  }

  #[test]
  fn test_start_feed_without_runtime_fails() {
    let scheduler = ManualScheduler::new();
    let (callback, _rx) = channel_callback();
    let result = start_feed(
      source(&store()),
      &scheduler,
      Duration::from_secs(1),
      callback,
    );
    assert!(matches!(result, Err(StoreError::FeedUnavailable(_))));
    assert_eq!(scheduler.live_timers(), 0);
  }

  #[tokio::test]
  async fn test_dropping_subscription_stops_timer() {
    let scheduler = ManualScheduler::new();
    let (callback, _rx) = channel_callback();
    let sub = start_feed(
      source(&store()),
      &scheduler,
      Duration::from_secs(1),
      callback,
    )
    .unwrap();
    assert_eq!(scheduler.live_timers(), 1);

    drop(sub);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(scheduler.live_timers(), 0);
  }

  #[tokio::test]
  async fn test_independent_subscriptions() {
    let store = store();
    store.save_item(item("a", 1)).await.unwrap();
    let scheduler = ManualScheduler::new();

    let (first_cb, mut first_rx) = channel_callback();
    let (second_cb, mut second_rx) = channel_callback();
    let _first = start_feed(
      source(&store),
      &scheduler,
      Duration::from_secs(1),
      first_cb,
    )
    .unwrap();
    let _second = start_feed(
      source(&store),
      &scheduler,
      Duration::from_secs(1),
      second_cb,
    )
    .unwrap();

    assert_eq!(scheduler.advance(), 2);
    assert_eq!(next(&mut first_rx).await.kind, ChangeKind::Insert);
    assert_eq!(next(&mut second_rx).await.kind, ChangeKind::Insert);
  }

  #[test]
  fn test_noop_subscription_is_inactive() {
    let sub = Subscription::noop();
    assert!(!sub.is_active());
    sub.unsubscribe();
  }
}
