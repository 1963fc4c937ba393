//! TOML-based configuration persistence for the console.
//!
//! Reads and writes [`ConsoleConfig`] at the platform-appropriate path:
//! - Windows:  `%APPDATA%\CanPanel\config.toml`
//! - Linux:    `~/.config/canpanel/config.toml`
//! - macOS:    `~/Library/Application Support/CanPanel/config.toml`
//!
//! Every field carries a serde default so the console runs correctly on
//! first start (no file yet) and after upgrades that add fields.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level console configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub panel: PanelConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub console: ConsoleSection,
}

/// Where the panel controller listens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PanelConfig {
    /// `host:port` of the panel's TCP listener.
    #[serde(default = "default_address")]
    pub address: String,
    /// Per-attempt connect timeout.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Reconnect backoff schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectConfig {
    /// First delay after a failure; doubles per consecutive failure.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Ceiling for the doubled delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// Canonical state sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateConfig {
    /// Maximum retained event-log records; oldest evicted beyond this.
    #[serde(default = "default_past_events_cap")]
    pub past_events_cap: usize,
}

/// Console-process behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsoleSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_address() -> String {
    "127.0.0.1:9000".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_past_events_cap() -> usize {
    200
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            past_events_cap: default_past_events_cap(),
        }
    }
}

impl Default for ConsoleSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// ── Load / save ───────────────────────────────────────────────────────────────

/// Returns the platform-specific config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory
/// environment variable for the platform is unset.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    #[cfg(target_os = "windows")]
    {
        let base = std::env::var("APPDATA").map_err(|_| ConfigError::NoPlatformConfigDir)?;
        Ok(PathBuf::from(base).join("CanPanel").join("config.toml"))
    }
    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").map_err(|_| ConfigError::NoPlatformConfigDir)?;
        Ok(PathBuf::from(home)
            .join("Library/Application Support/CanPanel")
            .join("config.toml"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = std::env::var("HOME").map_err(|_| ConfigError::NoPlatformConfigDir)?;
        Ok(PathBuf::from(home).join(".config/canpanel").join("config.toml"))
    }
}

impl ConsoleConfig {
    /// Parses a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on invalid TOML.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads the config file, or returns defaults when none exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on unreadable or unparseable content; a
    /// missing file is not an error.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = config_file_path()?;
        match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io { path, source: e }),
        }
    }

    /// Writes the config to the platform path, creating directories as
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on serialization or I/O failure.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = config_file_path()?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| ConfigError::Io {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(&path, text).map_err(|e| ConfigError::Io { path, source: e })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
