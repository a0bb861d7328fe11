//! Application configuration for sitecrawler.
//!
//! User config lives at `~/.sitecrawler/sitecrawler.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SitecrawlerError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sitecrawler.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sitecrawler";

// ---------------------------------------------------------------------------
// Config structs (matching sitecrawler.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default maximum crawl depth; `<= 0` means unbounded.
    #[serde(default = "default_depth")]
    pub depth: i64,

    /// Default worker pool size.
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Default HTTP client timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Default output format: "sitemap" or "json".
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            depth: default_depth(),
            workers: default_workers(),
            timeout_secs: default_timeout_secs(),
            format: default_format(),
        }
    }
}

fn default_depth() -> i64 {
    -1
}
fn default_workers() -> u32 {
    4
}
fn default_timeout_secs() -> u64 {
    5
}
fn default_format() -> String {
    "sitemap".into()
}

// ---------------------------------------------------------------------------
// Crawl config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum crawl depth from the root URL; `<= 0` means unbounded.
    pub depth: i64,
    /// Worker pool size (maximum concurrent crawl nodes).
    pub workers: u32,
    /// HTTP client timeout.
    pub timeout: Duration,
    /// Output format: "sitemap" or "json".
    pub format: String,
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            depth: config.defaults.depth,
            workers: config.defaults.workers,
            timeout: Duration::from_secs(config.defaults.timeout_secs),
            format: config.defaults.format.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sitecrawler/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SitecrawlerError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sitecrawler/sitecrawler.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SitecrawlerError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SitecrawlerError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SitecrawlerError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SitecrawlerError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SitecrawlerError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
