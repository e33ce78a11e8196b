use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use sparkdeck::cache::{KeyValueStore, SqliteStorage};
use sparkdeck::commands::EntityKind;
use sparkdeck::config::Config;
use sparkdeck::entities::{RunOptions, StoreDeps, Stores};
use sparkdeck::feed::{ChangeCallback, ChangeEvent, Subscription};
use sparkdeck::logging;

#[derive(Parser, Debug)]
#[command(name = "sparkdeck")]
#[command(about = "Manage test executors, definitions, runs and suites")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/sparkdeck/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Use the local cache only, never the job backend
  #[arg(long, global = true)]
  local: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Seed empty local caches with sample data
  Init,
  /// List all records of an entity
  List { entity: EntityKind },
  /// Show one record
  Show { entity: EntityKind, id: String },
  /// Delete one record
  Delete { entity: EntityKind, id: String },
  /// Start a run from a definition
  Run {
    definition_id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    image: Option<String>,
    /// Command and arguments, replacing the definition's commands
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    command: Option<Vec<String>>,
  },
  /// Start a new run repeating a finished one
  Retry { run_id: String },
  /// Print change events as JSON lines until Ctrl-C
  Watch { entity: EntityKind },
  /// Check the job backend's cluster connection
  Health,
  /// Fetch the logs of a run's job
  Logs { run_id: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let text =
    serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to encode output: {}", e))?;
  println!("{}", text);
  Ok(())
}

fn print_line<T: Serialize>(value: &T) {
  match serde_json::to_string(value) {
    Ok(line) => println!("{}", line),
    Err(e) => tracing::error!(error = %e, "Failed to encode change event"),
  }
}

async fn list(stores: &Stores, entity: EntityKind) -> Result<()> {
  match entity {
    EntityKind::Executors => print_json(&stores.executors.get_items().await?),
    EntityKind::Definitions => print_json(&stores.definitions.get_items().await?),
    EntityKind::Runs => print_json(&stores.runs.get_items().await?),
    EntityKind::Suites => print_json(&stores.suites.get_items().await?),
  }
}

async fn show(stores: &Stores, entity: EntityKind, id: &str) -> Result<()> {
  let found = match entity {
    EntityKind::Executors => stores.executors.get_item_by_id(id).await?.map(|i| print_json(&i)),
    EntityKind::Definitions => stores.definitions.get_item_by_id(id).await?.map(|i| print_json(&i)),
    EntityKind::Runs => stores.runs.get_item_by_id(id).await?.map(|i| print_json(&i)),
    EntityKind::Suites => stores.suites.get_item_by_id(id).await?.map(|i| print_json(&i)),
  };
  found.unwrap_or_else(|| Err(eyre!("No {} with id {}", entity, id)))
}

async fn delete(stores: &Stores, entity: EntityKind, id: &str) -> Result<()> {
  let deleted = match entity {
    EntityKind::Executors => stores.executors.delete_item(id).await?,
    EntityKind::Definitions => stores.definitions.delete_item(id).await?,
    EntityKind::Runs => stores.runs.delete_item(id).await?,
    EntityKind::Suites => stores.suites.delete_item(id).await?,
  };
  print_json(&serde_json::json!({ "entity": entity.name(), "id": id, "deleted": deleted }))
}

fn printer<T: Serialize + 'static>() -> ChangeCallback<T> {
  Arc::new(|event: ChangeEvent<T>| print_line(&event))
}

fn watch(stores: &Stores, entity: EntityKind) -> Result<Subscription> {
  let subscription = match entity {
    EntityKind::Executors => stores.executors.subscribe(printer())?,
    EntityKind::Definitions => stores.definitions.subscribe(printer())?,
    EntityKind::Runs => stores.subscribe_to_runs(printer())?,
    EntityKind::Suites => stores.suites.subscribe(printer())?,
  };
  Ok(subscription)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let mut config = Config::load(args.config.as_deref())?;
  if args.local {
    config.api.enabled = false;
  }
  let _log_guard = logging::init(&config.log)?;

  let cache_path = match &config.cache.path {
    Some(path) => path.clone(),
    None => SqliteStorage::default_path()?,
  };
  debug!(path = %cache_path.display(), "Opening local cache");
  let storage: Arc<dyn KeyValueStore> = Arc::new(SqliteStorage::open(&cache_path)?);

  let stores = Stores::build(&config, StoreDeps::new(storage))?;

  match args.command {
    Command::Init => {
      stores.initialize().await?;
      print_json(&serde_json::json!({ "initialized": true, "mode": format!("{:?}", stores.mode()) }))?;
    }
    Command::List { entity } => list(&stores, entity).await?,
    Command::Show { entity, id } => show(&stores, entity, &id).await?,
    Command::Delete { entity, id } => delete(&stores, entity, &id).await?,
    Command::Run {
      definition_id,
      name,
      image,
      command,
    } => {
      let options = RunOptions {
        name,
        image,
        commands: command,
      };
      print_json(&stores.create_run(&definition_id, options).await?)?;
    }
    Command::Retry { run_id } => match stores.retry_run(&run_id).await? {
      Some(run) => print_json(&run)?,
      None => return Err(eyre!("No run with id {}", run_id)),
    },
    Command::Watch { entity } => {
      let subscription = watch(&stores, entity)?;
      tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("Failed to wait for Ctrl-C: {}", e))?;
      subscription.unsubscribe();
    }
    Command::Health => print_json(&stores.cluster()?.health().await?)?,
    Command::Logs { run_id } => print_json(&stores.cluster()?.run_logs(&run_id).await?)?,
  }

  Ok(())
}
