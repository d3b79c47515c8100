//! Common test utilities for lodestar integration tests.
//!
//! Provides `TestEnv`, which points every spawned `lodestar` at a throwaway
//! config file so tests never read or write the user's real configuration.

#![allow(dead_code)]

use std::path::PathBuf;

use assert_cmd::Command;
pub use tempfile::TempDir;

/// Environment variables that would leak the host's settings into a test run.
const LODESTAR_ENV: [&str; 7] = [
    "LODESTAR_HOST",
    "LODESTAR_PORT",
    "LODESTAR_SERVER_URL",
    "LODESTAR_LOG",
    "LODESTAR_LOG_FORMAT",
    "LODESTAR_SEED",
    "LODESTAR_CONFIG",
];

pub struct TestEnv {
    pub config_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// Where this environment's config.kdl lives (not created until written).
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.path().join("config.kdl")
    }

    /// A `lodestar` command isolated to this environment.
    pub fn lodestar(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_lodestar"));
        for name in LODESTAR_ENV {
            cmd.env_remove(name);
        }
        cmd.env("LODESTAR_CONFIG", self.config_path());
        cmd
    }

    /// Write config.kdl directly.
    pub fn write_config(&self, text: &str) {
        std::fs::write(self.config_path(), text).unwrap();
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
