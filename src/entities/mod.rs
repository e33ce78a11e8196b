//! Dashboard entities (executors, definitions, runs, suites) and their stores.

mod api_types;
mod catalogue;
mod runs;
mod samples;
mod stores;
mod types;

pub use api_types::{parse_timestamp, ApiRun, ApiSuite};
pub use catalogue::{definition_config, executor_config, run_config, suite_config, MAX_LOCAL_RUNS};
pub use runs::{RunIds, RunLauncher, RunOptions, START_LOG_LINE};
pub use stores::{BackendMode, StoreDeps, Stores};
pub use types::{Definition, ExecutionMode, Executor, Run, RunOutcome, RunStatus, Suite};
