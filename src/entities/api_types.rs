//! Wire shapes of runs and suites as the job backend speaks them (snake_case).
//!
//! Kept apart from the domain types so the backend's naming and looser
//! typing stay out of the rest of the crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::types::{ExecutionMode, Run, RunStatus, Suite};
use crate::remote::{legacy_id_to_uuid, NIL_UUID};

/// Parse a backend timestamp, accepting RFC 3339 with or without offset.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
  let raw = raw.trim();
  if raw.is_empty() {
    return None;
  }
  DateTime::parse_from_rfc3339(raw)
    .map(|dt| dt.with_timezone(&Utc))
    .ok()
    .or_else(|| {
      chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
    })
}

fn string_map(value: Option<Value>) -> BTreeMap<String, String> {
  match value {
    Some(Value::Object(map)) => map
      .into_iter()
      .map(|(k, v)| match v {
        Value::String(s) => (k, s),
        other => (k, other.to_string()),
      })
      .collect(),
    _ => BTreeMap::new(),
  }
}

// ============================================================================
// Runs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRun {
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub image: String,
  #[serde(default, alias = "command")]
  pub commands: Vec<String>,
  #[serde(default)]
  pub status: String,
  #[serde(default)]
  pub created_at: Option<String>,
  #[serde(default, alias = "test_definition_id")]
  pub definition_id: Option<String>,
  #[serde(default)]
  pub executor_id: Option<String>,
  #[serde(default)]
  pub suite_id: Option<String>,
  #[serde(default)]
  pub variables: Option<Value>,
  #[serde(default)]
  pub artifacts: Option<Vec<String>>,
  #[serde(default)]
  pub duration: Option<u64>,
  #[serde(default)]
  pub retries: Option<u32>,
  #[serde(default)]
  pub logs: Option<Vec<String>>,
  #[serde(default)]
  pub k8s_job_name: Option<String>,
  #[serde(default)]
  pub completed: Option<String>,
  #[serde(default)]
  pub failed: Option<String>,
}

impl ApiRun {
  /// Convert to a domain run. Runs without a usable `created_at` are dropped.
  pub fn into_run(self) -> Option<Run> {
    let created_at = self.created_at.as_deref().and_then(parse_timestamp)?;
    Some(Run {
      id: self.id,
      name: self.name,
      image: self.image,
      command: self.commands,
      status: RunStatus::from_backend(&self.status),
      created_at,
      definition_id: self.definition_id,
      executor_id: self.executor_id,
      suite_id: self.suite_id,
      variables: string_map(self.variables),
      artifacts: self.artifacts.unwrap_or_default(),
      duration: self.duration,
      retries: self.retries,
      logs: self.logs.unwrap_or_default(),
      k8s_job_name: self.k8s_job_name,
      completed: self.completed.as_deref().and_then(parse_timestamp),
      failed: self.failed.as_deref().and_then(parse_timestamp),
    })
  }
}

impl From<&Run> for ApiRun {
  fn from(run: &Run) -> Self {
    Self {
      id: run.id.clone(),
      name: run.name.clone(),
      image: run.image.clone(),
      commands: run.command.clone(),
      status: run.status.as_str().to_string(),
      created_at: Some(run.created_at.to_rfc3339()),
      definition_id: run.definition_id.clone(),
      executor_id: run.executor_id.clone(),
      suite_id: run.suite_id.clone(),
      variables: serde_json::to_value(&run.variables).ok(),
      artifacts: Some(run.artifacts.clone()),
      duration: run.duration,
      retries: run.retries,
      logs: Some(run.logs.clone()),
      k8s_job_name: run.k8s_job_name.clone(),
      completed: run.completed.map(|at| at.to_rfc3339()),
      failed: run.failed.map(|at| at.to_rfc3339()),
    }
  }
}

// ============================================================================
// Suites
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSuite {
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub test_definition_ids: Option<Vec<String>>,
  #[serde(default)]
  pub execution_mode: Option<ExecutionMode>,
  #[serde(default)]
  pub created_at: Option<String>,
  #[serde(default)]
  pub labels: Option<Vec<String>>,
}

impl ApiSuite {
  /// Fill the gaps the backend leaves; a missing `created_at` becomes `now`.
  pub fn into_suite(self, now: DateTime<Utc>) -> Suite {
    Suite {
      id: self.id,
      name: self.name,
      description: self.description.unwrap_or_default(),
      test_definition_ids: self.test_definition_ids.unwrap_or_default(),
      created_at: self
        .created_at
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or(now),
      execution_mode: self.execution_mode.unwrap_or_default(),
      labels: self.labels.unwrap_or_default(),
    }
  }

  /// Request body for the backend, which only accepts UUID identifiers.
  pub fn for_request(suite: &Suite) -> Self {
    let id = if suite.id.is_empty() {
      NIL_UUID.to_string()
    } else {
      suite.id.clone()
    };
    Self {
      id,
      name: suite.name.clone(),
      description: Some(suite.description.clone()),
      test_definition_ids: Some(
        suite
          .test_definition_ids
          .iter()
          .map(|id| legacy_id_to_uuid(id))
          .collect(),
      ),
      execution_mode: Some(suite.execution_mode),
      created_at: Some(suite.created_at.to_rfc3339()),
      labels: Some(suite.labels.clone()),
    }
  }
}
