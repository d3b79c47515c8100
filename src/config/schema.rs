//! KDL schema for config.kdl.
//!
//! ```kdl
//! host "127.0.0.1"
//! port 3040
//! server-url "http://127.0.0.1:3040"
//! log-level "debug"
//! log-format "json"   // or "text"
//! agent-tick-ms 800
//! log-tick-ms 1500
//! graph-tick-ms 2000
//! seed 42
//! ```

use std::path::Path;

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Diagnostic log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Settings read from config.kdl. Unset keys are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LodestarConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub server_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub agent_tick_ms: Option<u64>,
    pub log_tick_ms: Option<u64>,
    pub graph_tick_ms: Option<u64>,
    pub seed: Option<u64>,
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn first_string(doc: &KdlDocument, key: &str) -> Option<String> {
    doc.get(key)?
        .entries()
        .first()?
        .value()
        .as_string()
        .map(|s| s.to_string())
}

fn first_integer(doc: &KdlDocument, key: &str) -> Result<Option<i128>> {
    let Some(node) = doc.get(key) else {
        return Ok(None);
    };
    match node.entries().first().map(|e| e.value()) {
        Some(value) => value
            .as_integer()
            .map(Some)
            .ok_or_else(|| Error::Config(format!("{} must be an integer", key))),
        None => Err(Error::Config(format!("{} needs a value", key))),
    }
}

fn push_string(doc: &mut KdlDocument, key: &str, value: &str) {
    let mut node = KdlNode::new(key);
    node.push(KdlEntry::new(KdlValue::String(value.to_string())));
    doc.nodes_mut().push(node);
}

fn push_integer(doc: &mut KdlDocument, key: &str, value: i128) {
    let mut node = KdlNode::new(key);
    node.push(KdlEntry::new(KdlValue::Integer(value)));
    doc.nodes_mut().push(node);
}

impl LodestarConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    pub fn validate(&self) -> Result<()> {
        if self.port == Some(0) {
            return Err(Error::Config("port must be 1-65535, got 0".to_string()));
        }
        if let Some(url) = &self.server_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "server-url must start with http:// or https://, got '{}'",
                    url
                )));
            }
        }
        if let Some(level) = &self.log_level {
            if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
                return Err(Error::Config(format!(
                    "log-level must be one of {}, got '{}'",
                    LOG_LEVELS.join(", "),
                    level
                )));
            }
        }
        for (key, value) in [
            ("agent-tick-ms", self.agent_tick_ms),
            ("log-tick-ms", self.log_tick_ms),
            ("graph-tick-ms", self.graph_tick_ms),
        ] {
            if value == Some(0) {
                return Err(Error::Config(format!("{} must be greater than 0", key)));
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document.
    ///
    /// Keys of the wrong type or out of range are errors; unknown keys are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Result<Self> {
        let mut config = Self::new();
        config.host = first_string(doc, "host");
        config.server_url = first_string(doc, "server-url");
        config.log_level = first_string(doc, "log-level");

        if let Some(format) = first_string(doc, "log-format") {
            config.log_format = Some(LogFormat::parse(&format).ok_or_else(|| {
                Error::Config(format!("log-format must be text or json, got '{}'", format))
            })?);
        }

        if let Some(port) = first_integer(doc, "port")? {
            config.port = Some(
                u16::try_from(port)
                    .map_err(|_| Error::Config(format!("port must be 1-65535, got {}", port)))?,
            );
        }

        let millis = |key: &str| -> Result<Option<u64>> {
            match first_integer(doc, key)? {
                Some(v) => u64::try_from(v)
                    .map(Some)
                    .map_err(|_| Error::Config(format!("{} must be positive, got {}", key, v))),
                None => Ok(None),
            }
        };
        config.agent_tick_ms = millis("agent-tick-ms")?;
        config.log_tick_ms = millis("log-tick-ms")?;
        config.graph_tick_ms = millis("graph-tick-ms")?;
        config.seed = millis("seed")?;

        config.validate()?;
        Ok(config)
    }

    /// Parse config from KDL text.
    pub fn parse(text: &str) -> Result<Self> {
        let doc: KdlDocument = text
            .parse()
            .map_err(|e| Error::Config(format!("invalid KDL: {}", e)))?;
        Self::from_kdl(&doc)
    }

    /// Load from `path`; a missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_kdl_string())?;
        Ok(())
    }

    /// Formatted KDL text for this config.
    pub fn to_kdl_string(&self) -> String {
        let mut doc = self.to_kdl();
        doc.autoformat();
        doc.to_string()
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();
        if let Some(host) = &self.host {
            push_string(&mut doc, "host", host);
        }
        if let Some(port) = self.port {
            push_integer(&mut doc, "port", port as i128);
        }
        if let Some(url) = &self.server_url {
            push_string(&mut doc, "server-url", url);
        }
        if let Some(level) = &self.log_level {
            push_string(&mut doc, "log-level", level);
        }
        if let Some(format) = self.log_format {
            push_string(&mut doc, "log-format", format.as_str());
        }
        for (key, value) in [
            ("agent-tick-ms", self.agent_tick_ms),
            ("log-tick-ms", self.log_tick_ms),
            ("graph-tick-ms", self.graph_tick_ms),
            ("seed", self.seed),
        ] {
            if let Some(v) = value {
                push_integer(&mut doc, key, v as i128);
            }
        }
        doc
    }

    /// Set one key from its KDL name and a string value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let number = |v: &str| -> Result<u64> {
            v.parse::<u64>()
                .map_err(|_| Error::Config(format!("{} must be a non-negative integer, got '{}'", key, v)))
        };
        match key {
            "host" => self.host = Some(value.to_string()),
            "port" => {
                self.port = Some(value.parse::<u16>().map_err(|_| {
                    Error::Config(format!("port must be 1-65535, got '{}'", value))
                })?)
            }
            "server-url" => self.server_url = Some(value.to_string()),
            "log-level" => self.log_level = Some(value.to_string()),
            "log-format" => {
                self.log_format = Some(LogFormat::parse(value).ok_or_else(|| {
                    Error::Config(format!("log-format must be text or json, got '{}'", value))
                })?)
            }
            "agent-tick-ms" => self.agent_tick_ms = Some(number(value)?),
            "log-tick-ms" => self.log_tick_ms = Some(number(value)?),
            "graph-tick-ms" => self.graph_tick_ms = Some(number(value)?),
            "seed" => self.seed = Some(number(value)?),
            other => return Err(Error::Config(format!("unknown config key '{}'", other))),
        }
        self.validate()
    }

    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &LodestarConfig) {
        if other.host.is_some() {
            self.host = other.host.clone();
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.server_url.is_some() {
            self.server_url = other.server_url.clone();
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level.clone();
        }
        if other.log_format.is_some() {
            self.log_format = other.log_format;
        }
        if other.agent_tick_ms.is_some() {
            self.agent_tick_ms = other.agent_tick_ms;
        }
        if other.log_tick_ms.is_some() {
            self.log_tick_ms = other.log_tick_ms;
        }
        if other.graph_tick_ms.is_some() {
            self.graph_tick_ms = other.graph_tick_ms;
        }
        if other.seed.is_some() {
            self.seed = other.seed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_kdl_empty() {
        let config = LodestarConfig::parse("").unwrap();
        assert_eq!(config, LodestarConfig::default());
    }

    #[test]
    fn test_config_from_kdl_full() {
        let kdl = r#"
            host "0.0.0.0"
            port 8080
            server-url "http://example.com:8080"
            log-level "debug"
            log-format "json"
            agent-tick-ms 100
            log-tick-ms 200
            graph-tick-ms 300
            seed 7
        "#;
        let config = LodestarConfig::parse(kdl).unwrap();
        assert_eq!(config.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(config.port, Some(8080));
        assert_eq!(config.server_url.as_deref(), Some("http://example.com:8080"));
        assert_eq!(config.log_format, Some(LogFormat::Json));
        assert_eq!(config.agent_tick_ms, Some(100));
        assert_eq!(config.graph_tick_ms, Some(300));
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(LodestarConfig::parse("port 70000").is_err());
        assert!(LodestarConfig::parse("port \"abc\"").is_err());
        assert!(LodestarConfig::parse("log-format \"yaml\"").is_err());
        assert!(LodestarConfig::parse("agent-tick-ms 0").is_err());
        assert!(LodestarConfig::parse("server-url \"example.com\"").is_err());
        let err = LodestarConfig::parse("log-level \"loud\"").unwrap_err();
        assert!(err.to_string().contains("log-level"));
    }

    #[test]
    fn test_config_to_kdl_roundtrip() {
        let config = LodestarConfig {
            host: Some("::1".to_string()),
            port: Some(4000),
            log_format: Some(LogFormat::Text),
            seed: Some(99),
            ..Default::default()
        };
        let parsed = LodestarConfig::parse(&config.to_kdl_string()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_config_set() {
        let mut config = LodestarConfig::new();
        config.set("port", "5000").unwrap();
        config.set("log-format", "JSON").unwrap();
        assert_eq!(config.port, Some(5000));
        assert_eq!(config.log_format, Some(LogFormat::Json));
        assert!(config.set("colour", "red").is_err());
        assert!(config.set("graph-tick-ms", "-1").is_err());
    }

    #[test]
    fn test_config_merge() {
        let mut base = LodestarConfig {
            host: Some("127.0.0.1".to_string()),
            port: Some(3040),
            ..Default::default()
        };
        base.merge(&LodestarConfig {
            port: Some(9000),
            ..Default::default()
        });
        assert_eq!(base.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(base.port, Some(9000));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = LodestarConfig::load(&dir.path().join("nope.kdl")).unwrap();
        assert_eq!(config, LodestarConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.kdl");
        let config = LodestarConfig {
            agent_tick_ms: Some(50),
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(LodestarConfig::load(&path).unwrap(), config);
    }
}
