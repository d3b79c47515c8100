//! Configuration for Lodestar.
//!
//! ## config.kdl
//!
//! Located at `$LODESTAR_CONFIG`, or `<config dir>/lodestar/config.kdl`
//! (`~/.config/lodestar/config.kdl` on Linux).
//!
//! Contains:
//! - `host` / `port` - Where `lodestar serve` listens
//! - `server-url` - Backend the client commands talk to
//! - `log-level` / `log-format` - Diagnostic output on stderr
//! - `agent-tick-ms` / `log-tick-ms` / `graph-tick-ms` - Simulation timer periods
//! - `seed` - Fixed simulation seed for reproducible runs
//!
//! ## Precedence
//!
//! CLI flag > environment variable > config.kdl > built-in default.
//!
//! Use the [`resolver`] module for unified precedence resolution.

pub mod resolver;
pub mod schema;

use std::path::PathBuf;

pub use resolver::{
    ConfigOverrides, Resolved, ResolvedConfig, ValueSource, resolve_config, resolve_with_env,
};
pub use schema::{LodestarConfig, LogFormat};

use crate::{Error, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "LODESTAR_CONFIG";

/// Where config.kdl is read from and written to.
pub fn config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    dirs::config_dir()
        .map(|dir| dir.join("lodestar").join("config.kdl"))
        .ok_or_else(|| Error::Config("could not determine config directory".to_string()))
}

/// Load config.kdl from [`config_path`].
pub fn load() -> Result<(PathBuf, LodestarConfig)> {
    let path = config_path()?;
    let config = LodestarConfig::load(&path)?;
    Ok((path, config))
}
