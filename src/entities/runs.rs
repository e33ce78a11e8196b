//! Creating, retrying and finishing runs.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::info;

use super::types::{Definition, Run, RunOutcome, RunStatus};
use crate::clock::Clock;
use crate::error::{Result, StoreError};
use crate::store::EntityStore;

/// First log line of every new run.
pub const START_LOG_LINE: &str = "> Starting test...";

/// Overrides for a new run. `None` fields come from the definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
  /// Defaults to `"<definition name> Run"`
  pub name: Option<String>,
  /// Defaults to the definition's image
  pub image: Option<String>,
  /// Defaults to the definition's commands
  pub commands: Option<Vec<String>>,
}

/// Hands out `test-<millis>` ids that never repeat within the process.
pub struct RunIds {
  clock: Arc<dyn Clock>,
  last: AtomicI64,
}

impl RunIds {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      clock,
      last: AtomicI64::new(i64::MIN),
    }
  }

  /// Current time in millis, bumped past the previous id on collision.
  pub fn next(&self) -> String {
    let now = self.clock.now().timestamp_millis();
    let mut previous = self.last.load(Ordering::SeqCst);
    loop {
      let candidate = now.max(previous.saturating_add(1));
      match self
        .last
        .compare_exchange(previous, candidate, Ordering::SeqCst, Ordering::SeqCst)
      {
        Ok(_) => return format!("test-{}", candidate),
        Err(actual) => previous = actual,
      }
    }
  }
}

/// Run workflow on top of the definition and run stores.
#[derive(Clone)]
pub struct RunLauncher {
  definitions: Arc<dyn EntityStore<Definition>>,
  runs: Arc<dyn EntityStore<Run>>,
  clock: Arc<dyn Clock>,
  ids: Arc<RunIds>,
}

impl RunLauncher {
  pub fn new(
    definitions: Arc<dyn EntityStore<Definition>>,
    runs: Arc<dyn EntityStore<Run>>,
    clock: Arc<dyn Clock>,
  ) -> Self {
    let ids = Arc::new(RunIds::new(Arc::clone(&clock)));
    Self {
      definitions,
      runs,
      clock,
      ids,
    }
  }

  /// Materialize a running run from a definition and persist it.
  ///
  /// Fails with [`StoreError::DefinitionNotFound`] when the definition is
  /// unknown to both tiers.
  pub async fn create_run(&self, definition_id: &str, options: RunOptions) -> Result<Run> {
    let definition = self
      .definitions
      .get_item_by_id(definition_id)
      .await?
      .ok_or_else(|| StoreError::DefinitionNotFound(definition_id.to_string()))?;

    let run = Run {
      id: self.ids.next(),
      name: options
        .name
        .unwrap_or_else(|| format!("{} Run", definition.name)),
      image: options.image.unwrap_or(definition.image),
      command: options.commands.unwrap_or(definition.commands),
      status: RunStatus::Running,
      created_at: self.clock.now(),
      definition_id: Some(definition.id),
      executor_id: definition.executor_id,
      suite_id: None,
      variables: definition.variables.unwrap_or_default(),
      artifacts: Vec::new(),
      duration: None,
      retries: None,
      logs: vec![START_LOG_LINE.to_string()],
      k8s_job_name: None,
      completed: None,
      failed: None,
    };

    let saved = self.runs.save_item(run).await?;
    info!(run_id = %saved.id, definition_id, "Created run");
    Ok(saved)
  }

  /// Start a fresh run repeating a finished one. The original is left as is.
  ///
  /// Returns `Ok(None)` for unknown runs.
  pub async fn retry_run(&self, run_id: &str) -> Result<Option<Run>> {
    let Some(previous) = self.runs.get_item_by_id(run_id).await? else {
      return Ok(None);
    };
    if !previous.status.is_terminal() {
      return Err(StoreError::InvalidTransition(format!(
        "run {} is still running",
        run_id
      )));
    }

    let retry = Run {
      id: self.ids.next(),
      name: previous.name,
      image: previous.image,
      command: previous.command,
      status: RunStatus::Running,
      created_at: self.clock.now(),
      definition_id: previous.definition_id,
      executor_id: previous.executor_id,
      suite_id: None,
      variables: previous.variables,
      artifacts: Vec::new(),
      duration: None,
      retries: Some(previous.retries.unwrap_or(0) + 1),
      logs: vec![START_LOG_LINE.to_string()],
      k8s_job_name: None,
      completed: None,
      failed: None,
    };

    let saved = self.runs.save_item(retry).await?;
    info!(run_id = %saved.id, retry_of = run_id, "Retrying run");
    Ok(Some(saved))
  }

  /// Move a running run to a terminal state and persist it.
  pub async fn finish_run(&self, run_id: &str, outcome: RunOutcome) -> Result<Option<Run>> {
    let Some(mut run) = self.runs.get_item_by_id(run_id).await? else {
      return Ok(None);
    };
    run.finish(outcome, self.clock.now())?;
    self.runs.save_item(run).await.map(Some)
  }
}
