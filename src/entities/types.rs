//! Dashboard entities as stored locally (camelCase JSON).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, StoreError};

/// Container image that runs test commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Executor {
  pub id: String,
  pub name: String,
  pub image: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub command: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub supported_file_types: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub env: Option<BTreeMap<String, String>>,
  pub created_at: DateTime<Utc>,
}

/// Reusable description of a test job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  pub image: String,
  #[serde(default)]
  pub commands: Vec<String>,
  pub created_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub executor_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub variables: Option<BTreeMap<String, String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub labels: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source: Option<String>,
}

/// Lifecycle of a run. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
  #[default]
  Running,
  Completed,
  Failed,
}

impl RunStatus {
  pub fn is_terminal(self) -> bool {
    !matches!(self, RunStatus::Running)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      RunStatus::Running => "running",
      RunStatus::Completed => "completed",
      RunStatus::Failed => "failed",
    }
  }

  /// Map a backend status string. Anything not finished counts as running.
  pub fn from_backend(status: &str) -> Self {
    match status.to_ascii_lowercase().as_str() {
      "completed" | "succeeded" | "success" => RunStatus::Completed,
      "failed" | "error" => RunStatus::Failed,
      _ => RunStatus::Running,
    }
  }
}

/// How a finished run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
  Completed,
  Failed,
}

/// One execution of a definition.
///
/// `definition_id` and `executor_id` are soft references and may dangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
  pub id: String,
  pub name: String,
  pub image: String,
  #[serde(default)]
  pub command: Vec<String>,
  #[serde(default)]
  pub status: RunStatus,
  pub created_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub definition_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub executor_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub suite_id: Option<String>,
  #[serde(default)]
  pub variables: BTreeMap<String, String>,
  #[serde(default)]
  pub artifacts: Vec<String>,
  /// Seconds
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duration: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retries: Option<u32>,
  #[serde(default)]
  pub logs: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub k8s_job_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub completed: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub failed: Option<DateTime<Utc>>,
}

impl Run {
  /// Move a running run into a terminal state, stamping when it ended.
  pub fn finish(&mut self, outcome: RunOutcome, at: DateTime<Utc>) -> Result<()> {
    if self.status.is_terminal() {
      return Err(StoreError::InvalidTransition(format!(
        "run {} is already {}",
        self.id,
        self.status.as_str()
      )));
    }

    let seconds = (at - self.created_at).num_seconds().max(0) as u64;
    self.duration = Some(seconds);
    match outcome {
      RunOutcome::Completed => {
        self.status = RunStatus::Completed;
        self.completed = Some(at);
      }
      RunOutcome::Failed => {
        self.status = RunStatus::Failed;
        self.failed = Some(at);
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
  #[default]
  Sequential,
  Parallel,
}

/// Named group of definitions run together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suite {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub test_definition_ids: Vec<String>,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub execution_mode: ExecutionMode,
  #[serde(default)]
  pub labels: Vec<String>,
}
