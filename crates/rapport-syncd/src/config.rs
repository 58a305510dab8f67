use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

pub use rapport_core::config::Config;

/// Load daemon configuration, creating a default config file on first run.
pub fn load_syncd_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        let default_config = Config::default();
        default_config
            .save_to(path)
            .context("Failed to save default config")?;
        info!(path = %path.display(), "created default config");
        return Ok(default_config);
    }
    Config::load_from(path)
}
