//! Config file discovery and loading for the CLI.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub use st_core::config::Config;

/// Locations searched when no `--config` is given, in order.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "./segtrim.toml",
    "~/.config/segtrim/config.toml",
    "/etc/segtrim/config.toml",
];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = Config::from_toml(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// First existing file among [`DEFAULT_CONFIG_PATHS`].
pub fn find_config() -> Option<PathBuf> {
    DEFAULT_CONFIG_PATHS.iter().find_map(|path_str| {
        let path = PathBuf::from(shellexpand::tilde(path_str).as_ref());
        path.exists().then_some(path)
    })
}

/// Load config from the given path, a default location, or built-in defaults
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    match find_config() {
        Some(path) => {
            tracing::debug!("Using config file {:?}", path);
            load_config(&path)
        }
        None => Ok(Config::default()),
    }
}

/// Reject configurations the pipeline cannot run with; log the rest.
fn validate_config(config: &Config) -> Result<()> {
    if config.engine.exec_timeout_secs == 0 {
        return Err(st_core::Error::Config("engine.exec_timeout_secs cannot be 0".into()).into());
    }

    if config.pipeline.input_name.trim().is_empty() {
        return Err(st_core::Error::Config("pipeline.input_name cannot be empty".into()).into());
    }

    for warning in config.validate() {
        tracing::warn!("{warning}");
    }

    Ok(())
}
