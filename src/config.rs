use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::remote::parse_base_url;

pub const DEFAULT_API_URL: &str = "http://localhost:3001/api";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub polling: PollingConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Use the job backend, falling back to the local cache (hybrid mode)
  #[serde(default = "default_true")]
  pub enabled: bool,
  #[serde(default = "default_api_url")]
  pub base_url: String,
  /// Per-request timeout
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      base_url: default_api_url(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// SQLite file for the local cache (default: $XDG_DATA_HOME/sparkdeck/cache.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
  #[serde(default = "default_remote_interval_ms")]
  pub remote_interval_ms: u64,
  #[serde(default = "default_local_interval_ms")]
  pub local_interval_ms: u64,
}

impl Default for PollingConfig {
  fn default() -> Self {
    Self {
      remote_interval_ms: default_remote_interval_ms(),
      local_interval_ms: default_local_interval_ms(),
    }
  }
}

impl PollingConfig {
  pub fn remote_interval(&self) -> Duration {
    Duration::from_millis(self.remote_interval_ms)
  }

  pub fn local_interval(&self) -> Duration {
    Duration::from_millis(self.local_interval_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Filter directive used when RUST_LOG is unset
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Write logs to this file instead of stderr
  pub file: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      file: None,
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_api_url() -> String {
  DEFAULT_API_URL.to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_remote_interval_ms() -> u64 {
  5_000
}

fn default_local_interval_ms() -> u64 {
  10_000
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./sparkdeck.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/sparkdeck/config.yaml
  ///
  /// Without any file the built-in defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };
    config.apply_env(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("sparkdeck.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("sparkdeck").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    // An empty file means "all defaults"
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Apply SPARKDECK_API_URL and SPARKDECK_USE_API.
  fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(url) = var("SPARKDECK_API_URL") {
      self.api.base_url = url;
    }
    if let Some(flag) = var("SPARKDECK_USE_API") {
      self.api.enabled = match flag.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        other => return Err(eyre!("SPARKDECK_USE_API must be true or false, got {:?}", other)),
      };
    }
    Ok(())
  }

  pub fn validate(&self) -> Result<()> {
    if self.api.enabled {
      parse_base_url(&self.api.base_url).map_err(|e| eyre!("{}", e))?;
    }
    if self.polling.remote_interval_ms == 0 || self.polling.local_interval_ms == 0 {
      return Err(eyre!("Polling intervals must be greater than zero"));
    }
    Ok(())
  }
}
