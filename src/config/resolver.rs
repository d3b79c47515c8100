//! Unified configuration resolution with precedence.
//!
//! Precedence (highest to lowest):
//! 1. CLI flags (`ConfigOverrides`)
//! 2. Environment variables (`LODESTAR_*`)
//! 3. config.kdl
//! 4. Built-in defaults
//!
//! Every resolved value remembers where it came from so `lodestar config show` can
//! explain itself.

use std::time::Duration;

use serde::Serialize;

use super::schema::{LodestarConfig, LogFormat};
use crate::live::SimulationConfig;
use crate::{Error, Result};

pub const HOST_ENV: &str = "LODESTAR_HOST";
pub const PORT_ENV: &str = "LODESTAR_PORT";
pub const SERVER_URL_ENV: &str = "LODESTAR_SERVER_URL";
pub const LOG_ENV: &str = "LODESTAR_LOG";
pub const LOG_FORMAT_ENV: &str = "LODESTAR_LOG_FORMAT";
pub const SEED_ENV: &str = "LODESTAR_SEED";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3040;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueSource {
    CliFlag,
    EnvVar(String),
    ConfigFile,
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::ConfigFile => write!(f, "config"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub server_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub seed: Option<u64>,
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub host: Resolved<String>,
    pub port: Resolved<u16>,
    pub server_url: Resolved<String>,
    pub log_level: Resolved<String>,
    pub log_format: Resolved<LogFormat>,
    pub agent_tick_ms: Resolved<u64>,
    pub log_tick_ms: Resolved<u64>,
    pub graph_tick_ms: Resolved<u64>,
    pub seed: Option<Resolved<u64>>,
}

impl ResolvedConfig {
    /// Simulation timers and seed.
    pub fn simulation(&self) -> SimulationConfig {
        SimulationConfig {
            agent_tick: Duration::from_millis(self.agent_tick_ms.value),
            log_tick: Duration::from_millis(self.log_tick_ms.value),
            graph_tick: Duration::from_millis(self.graph_tick_ms.value),
            seed: self.seed.as_ref().map(|s| s.value),
        }
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        if self.host.value.contains(':') {
            format!("[{}]:{}", self.host.value, self.port.value)
        } else {
            format!("{}:{}", self.host.value, self.port.value)
        }
    }
}

fn pick<T>(
    cli: Option<T>,
    env: Option<(T, &str)>,
    file: Option<T>,
    default: T,
) -> Resolved<T> {
    if let Some(v) = cli {
        Resolved::new(v, ValueSource::CliFlag)
    } else if let Some((v, name)) = env {
        Resolved::new(v, ValueSource::EnvVar(name.to_string()))
    } else if let Some(v) = file {
        Resolved::new(v, ValueSource::ConfigFile)
    } else {
        Resolved::new(default, ValueSource::Default)
    }
}

/// Resolve with an explicit environment lookup.
pub fn resolve_with_env(
    file: &LodestarConfig,
    overrides: &ConfigOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let env_value = |name: &'static str| env(name).filter(|v| !v.is_empty()).map(|v| (v, name));

    let env_port = match env_value(PORT_ENV) {
        Some((raw, name)) => Some((
            raw.parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| Error::Config(format!("{} must be 1-65535, got '{}'", name, raw)))?,
            name,
        )),
        None => None,
    };
    let env_format = match env_value(LOG_FORMAT_ENV) {
        Some((raw, name)) => Some((
            LogFormat::parse(&raw).ok_or_else(|| {
                Error::Config(format!("{} must be text or json, got '{}'", name, raw))
            })?,
            name,
        )),
        None => None,
    };
    let env_seed = match env_value(SEED_ENV) {
        Some((raw, name)) => Some((
            raw.parse::<u64>()
                .map_err(|_| Error::Config(format!("{} must be an integer, got '{}'", name, raw)))?,
            name,
        )),
        None => None,
    };

    let host = pick(
        overrides.host.clone(),
        env_value(HOST_ENV),
        file.host.clone(),
        DEFAULT_HOST.to_string(),
    );
    let port = pick(overrides.port, env_port, file.port, DEFAULT_PORT);
    let default_url = format!("http://{}:{}", DEFAULT_HOST, DEFAULT_PORT);
    let server_url = pick(
        overrides.server_url.clone(),
        env_value(SERVER_URL_ENV),
        file.server_url.clone(),
        default_url,
    );
    let log_level = pick(
        overrides.log_level.clone(),
        env_value(LOG_ENV),
        file.log_level.clone(),
        DEFAULT_LOG_LEVEL.to_string(),
    );
    let log_format = pick(overrides.log_format, env_format, file.log_format, LogFormat::Text);

    let defaults = SimulationConfig::default();
    let ms = |file_value: Option<u64>, default: Duration| match file_value {
        Some(v) => Resolved::new(v, ValueSource::ConfigFile),
        None => Resolved::new(default.as_millis() as u64, ValueSource::Default),
    };

    let seed = if let Some(v) = overrides.seed {
        Some(Resolved::new(v, ValueSource::CliFlag))
    } else if let Some((v, name)) = env_seed {
        Some(Resolved::new(v, ValueSource::EnvVar(name.to_string())))
    } else {
        file.seed.map(|v| Resolved::new(v, ValueSource::ConfigFile))
    };

    Ok(ResolvedConfig {
        host,
        port,
        server_url,
        log_level,
        log_format,
        agent_tick_ms: ms(file.agent_tick_ms, defaults.agent_tick),
        log_tick_ms: ms(file.log_tick_ms, defaults.log_tick),
        graph_tick_ms: ms(file.graph_tick_ms, defaults.graph_tick),
        seed,
    })
}

/// Resolve against the process environment.
pub fn resolve_config(file: &LodestarConfig, overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    resolve_with_env(file, overrides, |name| std::env::var(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let resolved =
            resolve_with_env(&LodestarConfig::default(), &ConfigOverrides::default(), env(&[]))
                .unwrap();
        assert_eq!(resolved.host.value, "127.0.0.1");
        assert_eq!(resolved.port.value, 3040);
        assert_eq!(resolved.port.source, ValueSource::Default);
        assert_eq!(resolved.server_url.value, "http://127.0.0.1:3040");
        assert_eq!(resolved.agent_tick_ms.value, 800);
        assert_eq!(resolved.log_tick_ms.value, 1500);
        assert_eq!(resolved.graph_tick_ms.value, 2000);
        assert!(resolved.seed.is_none());
        assert_eq!(resolved.bind_addr(), "127.0.0.1:3040");
    }

    #[test]
    fn test_precedence_cli_over_env_over_file() {
        let file = LodestarConfig {
            port: Some(4000),
            host: Some("0.0.0.0".to_string()),
            log_level: Some("warn".to_string()),
            ..Default::default()
        };
        let overrides = ConfigOverrides {
            port: Some(5000),
            ..Default::default()
        };
        let resolved = resolve_with_env(
            &file,
            &overrides,
            env(&[(PORT_ENV, "4500"), (LOG_ENV, "debug")]),
        )
        .unwrap();
        assert_eq!(resolved.port, Resolved::new(5000, ValueSource::CliFlag));
        assert_eq!(
            resolved.log_level,
            Resolved::new("debug".to_string(), ValueSource::EnvVar(LOG_ENV.to_string()))
        );
        assert_eq!(resolved.host.source, ValueSource::ConfigFile);
    }

    #[test]
    fn test_invalid_env_rejected() {
        let err = resolve_with_env(
            &LodestarConfig::default(),
            &ConfigOverrides::default(),
            env(&[(PORT_ENV, "not-a-port")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains(PORT_ENV));
    }

    #[test]
    fn test_empty_env_ignored() {
        let resolved = resolve_with_env(
            &LodestarConfig::default(),
            &ConfigOverrides::default(),
            env(&[(HOST_ENV, "")]),
        )
        .unwrap();
        assert_eq!(resolved.host.source, ValueSource::Default);
    }

    #[test]
    fn test_simulation_config_from_file() {
        let file = LodestarConfig {
            agent_tick_ms: Some(10),
            seed: Some(3),
            ..Default::default()
        };
        let sim = resolve_with_env(&file, &ConfigOverrides::default(), env(&[]))
            .unwrap()
            .simulation();
        assert_eq!(sim.agent_tick, Duration::from_millis(10));
        assert_eq!(sim.log_tick, Duration::from_millis(1500));
        assert_eq!(sim.seed, Some(3));
    }

    #[test]
    fn test_ipv6_bind_addr() {
        let overrides = ConfigOverrides {
            host: Some("::1".to_string()),
            ..Default::default()
        };
        let resolved =
            resolve_with_env(&LodestarConfig::default(), &overrides, env(&[])).unwrap();
        assert_eq!(resolved.bind_addr(), "[::1]:3040");
    }
}
