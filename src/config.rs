//! Configuration loading for agentmesh.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Get the agentmesh home directory (~/.agentmesh).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".agentmesh"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from an explicit file.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}. Run 'agentmesh settings init' first.",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Load settings or return defaults if the file is missing or broken.
pub fn load_settings_or_default(path: Option<&Path>) -> Settings {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match get_settings_path() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Failed to resolve settings path: {}, using defaults", e);
                return Settings::default();
            }
        },
    };

    if !path.exists() {
        tracing::debug!("No settings at {}, using defaults", path.display());
        return Settings::default();
    }

    load_settings(&path).unwrap_or_else(|e| {
        tracing::warn!("Failed to load settings: {}, using defaults", e);
        Settings::default()
    })
}

/// Write settings as pretty JSON, creating parent directories.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    validate_settings(settings)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(settings)?)?;
    tracing::info!("Wrote settings to {}", path.display());
    Ok(())
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.agents.max_queue_size == 0 {
        return Err(Error::Config("agents.max_queue_size must be at least 1".to_string()));
    }
    if settings.agents.poll_interval_ms == 0 {
        return Err(Error::Config("agents.poll_interval_ms must be at least 1".to_string()));
    }
    if settings.context.max_versions == 0 {
        return Err(Error::Config("context.max_versions must be at least 1".to_string()));
    }
    Ok(())
}

/// Agent runtime defaults.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AgentSettings {
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

fn default_max_queue_size() -> usize {
    100
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_stop_timeout_ms() -> u64 {
    5000
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            poll_interval_ms: default_poll_interval_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl AgentSettings {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Shared context store settings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ContextSettings {
    #[serde(default = "default_max_versions")]
    pub max_versions: usize,
    /// Tree the store starts from and returns to on `clear`.
    #[serde(default)]
    pub seed: Map<String, Value>,
}

fn default_max_versions() -> usize {
    10
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_versions: default_max_versions(),
            seed: Map::new(),
        }
    }
}

/// Logging configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LoggingSettings {
    #[serde(default = "default_log_directive")]
    pub directive: String,
    #[serde(default)]
    pub file: bool,
    pub dir: Option<PathBuf>,
}

fn default_log_directive() -> String {
    "info,agentmesh=debug".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directive: default_log_directive(),
            file: false,
            dir: None,
        }
    }
}

/// agentmesh settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub agents: AgentSettings,

    #[serde(default)]
    pub context: ContextSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}
