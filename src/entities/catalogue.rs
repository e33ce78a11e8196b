//! Storage keys, endpoints and wire transforms of each entity.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::api_types::{ApiRun, ApiSuite};
use super::samples;
use super::types::{Definition, Executor, Run, Suite};
use crate::cache::{InsertMode, Record};
use crate::clock::Clock;
use crate::error::{Result, StoreError};
use crate::remote::Transforms;
use crate::store::StoreConfig;

/// Locally kept runs; older ones are evicted first.
pub const MAX_LOCAL_RUNS: usize = 50;

impl Record for Executor {
  fn record_id(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "executor"
  }
}

impl Record for Definition {
  fn record_id(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "definition"
  }
}

impl Record for Run {
  fn record_id(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "run"
  }
}

impl Record for Suite {
  fn record_id(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "suite"
  }
}

pub fn executor_config() -> StoreConfig<Executor> {
  StoreConfig::new("sparktest_executors", "test-executors")
    .with_default_items(samples::executors())
}

pub fn definition_config() -> StoreConfig<Definition> {
  StoreConfig::new("sparktest_definitions", "test-definitions")
    .with_default_items(samples::definitions())
}

pub fn run_config() -> StoreConfig<Run> {
  StoreConfig::new("sparktest_runs", "test-runs")
    .with_default_items(samples::runs())
    .with_insert_mode(InsertMode::Prepend)
    .with_max_items(MAX_LOCAL_RUNS)
    .with_transforms(run_transforms())
}

/// Suite defaults for missing timestamps come from `clock`.
pub fn suite_config(clock: Arc<dyn Clock>) -> StoreConfig<Suite> {
  StoreConfig::new("sparktest_test_suites", "test-suites")
    .with_default_items(samples::suites())
    .with_transforms(suite_transforms(clock))
}

fn decode_error<T: Record>(e: serde_json::Error) -> StoreError {
  StoreError::Decode {
    entity: T::entity_type(),
    message: e.to_string(),
  }
}

/// Split a response array into entries, skipping the ones that don't decode.
fn entries<W: serde::de::DeserializeOwned, T: Record>(body: Value) -> Result<Vec<W>> {
  let list: Vec<Value> = serde_json::from_value(body).map_err(decode_error::<T>)?;
  Ok(
    list
      .into_iter()
      .filter_map(|entry| match serde_json::from_value(entry) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
          warn!(entity = T::entity_type(), error = %e, "Skipping malformed entry");
          None
        }
      })
      .collect(),
  )
}

fn run_transforms() -> Transforms<Run> {
  Transforms::none()
    .with_request(|run: &Run| serde_json::to_value(ApiRun::from(run)).map_err(decode_error::<Run>))
    .with_response(|body| {
      let api_runs: Vec<ApiRun> = entries::<ApiRun, Run>(body)?;
      let total = api_runs.len();
      let mut runs: Vec<Run> = api_runs.into_iter().filter_map(ApiRun::into_run).collect();
      if runs.len() < total {
        debug!(dropped = total - runs.len(), "Dropped runs without a valid created_at");
      }
      runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
      Ok(runs)
    })
}

fn suite_transforms(clock: Arc<dyn Clock>) -> Transforms<Suite> {
  Transforms::none()
    .with_request(|suite: &Suite| {
      serde_json::to_value(ApiSuite::for_request(suite)).map_err(decode_error::<Suite>)
    })
    .with_response(move |body| {
      let now = clock.now();
      Ok(
        entries::<ApiSuite, Suite>(body)?
          .into_iter()
          .map(|api| api.into_suite(now))
          .collect(),
      )
    })
}
