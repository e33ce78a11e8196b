//! Composition root: one store per entity, picked by backend mode.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::catalogue::{definition_config, executor_config, run_config, suite_config};
use super::runs::{RunLauncher, RunOptions};
use super::types::{Definition, Executor, Run, RunOutcome, Suite};
use crate::cache::{KeyValueStore, LocalStore, Record};
use crate::clock::{Clock, Scheduler, SystemClock, TokioScheduler};
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::feed::{ChangeCallback, Subscription};
use crate::remote::{ClusterClient, RemoteStore};
use crate::store::{EntityStore, FallbackHook, HybridStore, StoreConfig};

/// Which tiers back the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
  /// Remote API first, local cache on failure
  Hybrid,
  /// Local cache only
  Local,
}

/// Collaborators injected into [`Stores::build`].
pub struct StoreDeps {
  pub storage: Arc<dyn KeyValueStore>,
  pub scheduler: Arc<dyn Scheduler>,
  pub clock: Arc<dyn Clock>,
  pub on_fallback: Option<FallbackHook>,
}

impl StoreDeps {
  /// Production wiring over `storage`.
  pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
    Self {
      storage,
      scheduler: Arc::new(TokioScheduler),
      clock: Arc::new(SystemClock),
      on_fallback: None,
    }
  }
}

/// The four entity stores plus the run workflow.
#[derive(Clone)]
pub struct Stores {
  pub executors: Arc<dyn EntityStore<Executor>>,
  pub definitions: Arc<dyn EntityStore<Definition>>,
  pub runs: Arc<dyn EntityStore<Run>>,
  pub suites: Arc<dyn EntityStore<Suite>>,
  launcher: RunLauncher,
  cluster: Option<ClusterClient>,
  mode: BackendMode,
}

/// Everything needed to build one store of either mode.
struct Builder<'a> {
  config: &'a Config,
  deps: &'a StoreDeps,
  http: Option<reqwest::Client>,
}

impl Builder<'_> {
  fn build<T: Record>(&self, store_config: StoreConfig<T>) -> Result<Arc<dyn EntityStore<T>>> {
    let local = LocalStore::with_feed(
      Arc::clone(&self.deps.storage),
      &store_config,
      Arc::clone(&self.deps.scheduler),
      self.config.polling.local_interval(),
    )?;

    let Some(http) = &self.http else {
      return Ok(Arc::new(local));
    };

    let remote = RemoteStore::with_feed(
      http.clone(),
      &self.config.api.base_url,
      &store_config,
      Arc::clone(&self.deps.scheduler),
      self.config.polling.remote_interval(),
    )?;
    let mut hybrid = HybridStore::<T>::new(Arc::new(remote), Arc::new(local));
    if let Some(hook) = &self.deps.on_fallback {
      hybrid = hybrid.with_fallback_hook(Arc::clone(hook));
    }
    Ok(Arc::new(hybrid))
  }
}

impl Stores {
  /// Build every entity store for the mode selected by `config.api.enabled`.
  pub fn build(config: &Config, deps: StoreDeps) -> Result<Self> {
    let mode = if config.api.enabled {
      BackendMode::Hybrid
    } else {
      BackendMode::Local
    };

    let http = match mode {
      BackendMode::Hybrid => Some(
        reqwest::Client::builder()
          .timeout(Duration::from_secs(config.api.timeout_secs))
          .build()
          .map_err(|e| StoreError::Configuration(format!("Failed to build HTTP client: {}", e)))?,
      ),
      BackendMode::Local => None,
    };
    let cluster = match &http {
      Some(http) => Some(ClusterClient::new(http.clone(), &config.api.base_url)?),
      None => None,
    };

    let builder = Builder {
      config,
      deps: &deps,
      http,
    };
    let executors = builder.build(executor_config())?;
    let definitions = builder.build(definition_config())?;
    let runs = builder.build(run_config())?;
    let suites = builder.build(suite_config(Arc::clone(&deps.clock)))?;

    let launcher = RunLauncher::new(
      Arc::clone(&definitions),
      Arc::clone(&runs),
      Arc::clone(&deps.clock),
    );

    info!(?mode, "Stores ready");
    Ok(Self {
      executors,
      definitions,
      runs,
      suites,
      launcher,
      cluster,
      mode,
    })
  }

  pub fn mode(&self) -> BackendMode {
    self.mode
  }

  /// Seed every local cache that has never been written.
  pub async fn initialize(&self) -> Result<()> {
    futures::try_join!(
      self.executors.initialize(),
      self.definitions.initialize(),
      self.runs.initialize(),
      self.suites.initialize(),
    )?;
    Ok(())
  }

  pub async fn create_run(&self, definition_id: &str, options: RunOptions) -> Result<Run> {
    self.launcher.create_run(definition_id, options).await
  }

  pub async fn retry_run(&self, run_id: &str) -> Result<Option<Run>> {
    self.launcher.retry_run(run_id).await
  }

  pub async fn finish_run(&self, run_id: &str, outcome: RunOutcome) -> Result<Option<Run>> {
    self.launcher.finish_run(run_id, outcome).await
  }

  /// Change feed over runs.
  pub fn subscribe_to_runs(&self, callback: ChangeCallback<Run>) -> Result<Subscription> {
    self.runs.subscribe(callback)
  }

  /// Cluster endpoints, only reachable through the job backend.
  pub fn cluster(&self) -> Result<&ClusterClient> {
    self.cluster.as_ref().ok_or_else(|| {
      StoreError::Unsupported("cluster integration not available in local mode".to_string())
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::clock::{FixedClock, ManualScheduler};
  use crate::feed::{ChangeEvent, ChangeKind};
  use axum::routing::get;
  use axum::{Json, Router};
  use chrono::{TimeZone, Utc};
  use serde_json::json;
  use std::sync::Mutex;

  fn deps(storage: Arc<MemoryStorage>, scheduler: Arc<ManualScheduler>) -> StoreDeps {
    StoreDeps {
      storage,
      scheduler,
      clock: Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
      )),
      on_fallback: None,
    }
  }

  fn local_config() -> Config {
    let mut config = Config::default();
    config.api.enabled = false;
    config
  }

  async fn unreachable_base() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/api", addr)
  }

  #[tokio::test]
  async fn test_local_mode_serves_seed_data() {
    let storage = Arc::new(MemoryStorage::new());
    let stores = Stores::build(
      &local_config(),
      deps(storage.clone(), Arc::new(ManualScheduler::new())),
    )
    .unwrap();

    assert_eq!(stores.mode(), BackendMode::Local);
    assert!(!storage.contains("sparktest_runs").unwrap());

    stores.initialize().await.unwrap();
    for key in [
      "sparktest_executors",
      "sparktest_definitions",
      "sparktest_runs",
      "sparktest_test_suites",
    ] {
      assert!(storage.contains(key).unwrap(), "{} not seeded", key);
    }
    assert_eq!(stores.suites.get_items().await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_cluster_unsupported_in_local_mode() {
    let stores = Stores::build(
      &local_config(),
      deps(Arc::new(MemoryStorage::new()), Arc::new(ManualScheduler::new())),
    )
    .unwrap();
    assert!(matches!(stores.cluster(), Err(StoreError::Unsupported(_))));
  }

  #[tokio::test]
  async fn test_hybrid_mode_falls_back_when_backend_down() {
    let mut config = Config::default();
    config.api.base_url = unreachable_base().await;

    let fallbacks = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&fallbacks);
    let mut deps = deps(Arc::new(MemoryStorage::new()), Arc::new(ManualScheduler::new()));
    deps.on_fallback = Some(Arc::new(move |_: &str| *counter.lock().unwrap() += 1));

    let stores = Stores::build(&config, deps).unwrap();
    assert_eq!(stores.mode(), BackendMode::Hybrid);
    assert!(stores.cluster().is_ok());

    let run = stores
      .create_run("api-tests", RunOptions::default())
      .await
      .unwrap();
    let runs = stores.runs.get_items().await.unwrap();
    assert_eq!(runs[0].id, run.id);
    // Definition lookup, run save and the listing each fell back once
    assert_eq!(*fallbacks.lock().unwrap(), 3);
  }

  #[tokio::test]
  async fn test_hybrid_mode_reads_backend() {
    let router = Router::new().route(
      "/api/test-runs",
      get(|| async {
        Json(json!([
          {"id": "r1", "name": "Remote", "image": "i", "commands": ["x"],
           "status": "completed", "created_at": "2024-05-01T10:00:00Z"}
        ]))
      }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, router).await.unwrap();
    });

    let mut config = Config::default();
    config.api.base_url = format!("http://{}/api", addr);
    let stores = Stores::build(
      &config,
      deps(Arc::new(MemoryStorage::new()), Arc::new(ManualScheduler::new())),
    )
    .unwrap();

    let runs = stores.runs.get_items().await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].name, "Remote");
    assert_eq!(runs[0].command, vec!["x"]);
  }

  #[tokio::test]
  async fn test_subscribe_to_runs_reports_new_run() {
    let scheduler = Arc::new(ManualScheduler::new());
    let stores = Stores::build(
      &local_config(),
      deps(Arc::new(MemoryStorage::new()), scheduler.clone()),
    )
    .unwrap();
    stores.initialize().await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ChangeEvent<Run>>();
    let subscription = stores
      .subscribe_to_runs(Arc::new(move |event: ChangeEvent<Run>| {
        let _ = tx.send(event);
      }))
      .unwrap();

    // First tick reports the seeded runs as inserts
    scheduler.advance();
    for _ in 0..2 {
      let event = rx.recv().await.unwrap();
      assert_eq!(event.kind, ChangeKind::Insert);
    }

    let run = stores
      .create_run("unit-tests", RunOptions::default())
      .await
      .unwrap();
    scheduler.advance();
    let event = rx.recv().await.unwrap();
    assert_eq!(event, ChangeEvent::insert(run));

    subscription.unsubscribe();
  }
}
