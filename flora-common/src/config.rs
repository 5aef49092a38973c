//! Configuration loading and root folder resolution
//!
//! Priority order for the root folder:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `FLORA_ROOT_FOLDER`
//! 3. TOML config file `root_folder`
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file never aborts startup: a warning is logged
//! and compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "FLORA_CONFIG";

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "FLORA_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "flora.db";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the local cache database
    #[serde(default)]
    pub root_folder: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Source declarations; declaration order is the deduplication priority
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
}

/// Logging section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (e.g. "info", "flora_catalog=debug")
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Cache section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry lifetime in hours
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
        }
    }
}

fn default_ttl_hours() -> u64 {
    24
}

/// One `[[sources]]` table
///
/// Every tuning field is optional; the catalog crate fills provider defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Source identifier, e.g. "primary-species-db"
    pub id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub cooldown_ms: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

/// Load and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Write a TOML config file, creating the parent directory if needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Location of the config file: `FLORA_CONFIG` if set, else the platform config dir
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|d| d.join("flora").join("flora.toml"))
}

/// Load the config file, degrading to defaults if it is missing or broken
pub fn load_or_default(path: Option<&Path>) -> TomlConfig {
    let Some(path) = path else {
        warn!("No config directory available, using compiled defaults");
        return TomlConfig::default();
    };

    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using compiled defaults");
        return TomlConfig::default();
    }

    match load_toml_config(path) {
        Ok(config) => {
            debug!(path = %path.display(), "Loaded config file");
            config
        }
        Err(e) => {
            warn!(error = %e, "Config file unusable, using compiled defaults");
            TomlConfig::default()
        }
    }
}

/// Resolves the root folder following the documented priority order
pub struct RootFolderResolver<'a> {
    toml_config: &'a TomlConfig,
}

impl<'a> RootFolderResolver<'a> {
    pub fn new(toml_config: &'a TomlConfig) -> Self {
        Self { toml_config }
    }

    pub fn resolve(&self, cli_arg: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_config.root_folder {
            return PathBuf::from(path);
        }

        default_root_folder()
    }
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("flora"))
        .unwrap_or_else(|| PathBuf::from("./flora_data"))
}

/// Path of the local database inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE)
}

/// User-Agent sent with every outgoing request
pub fn get_user_agent() -> String {
    format!("flora/{} (plant and fungi catalog)", env!("CARGO_PKG_VERSION"))
}
