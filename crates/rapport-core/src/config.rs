use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the rapport application
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    /// Server URL (if None, runs in local-only mode)
    pub url: Option<String>,

    /// Authentication token for server
    pub auth_token: Option<String>,

    /// Owning tenant; local report listings are scoped by this
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathsConfig {
    /// Directory for the local database (defaults to ~/.local/share/rapport)
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Periodic flush interval in seconds
    #[serde(default = "default_flush_interval")]
    pub flush_interval_seconds: u64,

    /// Connectivity probe interval in seconds
    #[serde(default = "default_probe_interval")]
    pub probe_interval_seconds: u64,

    /// Per-request timeout for remote writes in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            flush_interval_seconds: default_flush_interval(),
            probe_interval_seconds: default_probe_interval(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_flush_interval() -> u64 {
    30 // 30 seconds
}

fn default_probe_interval() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    15
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        // Check if config path is specified via environment variable
        if let Ok(custom_path) = std::env::var("RAPPORT_CONFIG") {
            return Self::load_from(&PathBuf::from(custom_path));
        }
        let config_path = Self::default_path()?;
        if !config_path.exists() {
            // Create default config if it doesn't exist
            let default_config = Self::default();
            default_config.save_to(&config_path)?;
            return Ok(default_config);
        }
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path()?)
    }

    /// Save configuration to a specific path, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, toml_str)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Default config path: ~/.config/rapport/rapport.toml on every platform
    pub fn default_path() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home_dir.join(".config").join("rapport").join("rapport.toml"))
    }

    /// Get the data directory, using default if not configured
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref data_dir) = self.paths.data_dir {
            return Ok(data_dir.clone());
        }
        let home_dir = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home_dir.join(".local").join("share").join("rapport"))
    }

    /// Path to the local key-value database
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("rapport.db"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.request_timeout_seconds)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.sync.probe_interval_seconds)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.sync.flush_interval_seconds)
    }
}

// Global cached configuration: loaded once on first access
lazy_static::lazy_static! {
    static ref GLOBAL_CONFIG: Config = Config::load().expect("Failed to load config");
}

/// Get the global cached configuration
pub fn get_config() -> &'static Config {
    &GLOBAL_CONFIG
}
