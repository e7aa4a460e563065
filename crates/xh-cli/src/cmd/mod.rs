//! Command implementations.

pub mod completions;
pub mod nodes;
pub mod update;

use anyhow::{Context as _, Result, bail};
use std::path::Path;
use xh_core::{Config, Context, default_config_path};

/// Load the configuration file.
///
/// An explicitly given path (`--config` or `XH_CONFIG`) must exist. Without
/// one, `~/.xh/config.toml` is used when present and built-in defaults
/// otherwise.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        if !path.exists() {
            bail!("Config file {} does not exist", path.display());
        }
        return Ok(Config::load(path)?);
    }

    let path = default_config_path();
    if path.exists() {
        Config::load(&path).with_context(|| format!("Failed to load {}", path.display()))
    } else {
        tracing::debug!("No config at {}, using defaults", path.display());
        Ok(Config::default())
    }
}

/// Load the configuration and build the shared HTTP client.
pub fn load_context(explicit: Option<&Path>) -> Result<Context> {
    let config = load_config(explicit)?;
    Ok(Context::new(config)?)
}
