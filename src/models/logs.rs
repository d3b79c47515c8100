//! Log entries and severity filtering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which log lines a view shows: everything, or exactly one severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LevelFilter {
    #[default]
    All,
    Only(LogLevel),
}

impl LevelFilter {
    pub fn matches(&self, level: LogLevel) -> bool {
        match self {
            LevelFilter::All => true,
            LevelFilter::Only(wanted) => *wanted == level,
        }
    }

    /// Parse from string, case-insensitive (`all`, `info`, `warn`, `error`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all" => Some(LevelFilter::All),
            "info" => Some(LevelFilter::Only(LogLevel::Info)),
            "warn" => Some(LevelFilter::Only(LogLevel::Warn)),
            "error" => Some(LevelFilter::Only(LogLevel::Error)),
            _ => None,
        }
    }
}

/// One retained log line. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Unique per entry, assigned by the receiving side
    pub id: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub message: String,
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    /// Compact single-line rendering used by the CLI.
    pub fn display(&self) -> String {
        let agent = self.agent_id.as_deref().unwrap_or("-");
        format!(
            "{} {:<5} [{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.level.as_str(),
            agent,
            self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter_all_matches_everything() {
        for level in [LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
            assert!(LevelFilter::All.matches(level));
        }
    }

    #[test]
    fn test_level_filter_only_matches_one() {
        let filter = LevelFilter::Only(LogLevel::Warn);
        assert!(filter.matches(LogLevel::Warn));
        assert!(!filter.matches(LogLevel::Info));
        assert!(!filter.matches(LogLevel::Error));
    }

    #[test]
    fn test_level_filter_parse() {
        assert_eq!(LevelFilter::parse("ALL"), Some(LevelFilter::All));
        assert_eq!(
            LevelFilter::parse("error"),
            Some(LevelFilter::Only(LogLevel::Error))
        );
        assert_eq!(LevelFilter::parse("debug"), None);
    }

    #[test]
    fn test_log_entry_display() {
        let entry = LogEntry {
            id: "log-1".to_string(),
            project_id: "proj-1".to_string(),
            agent_id: Some("agent-2".to_string()),
            message: "Found 12 Angular directives".to_string(),
            level: LogLevel::Info,
            timestamp: DateTime::parse_from_rfc3339("2026-01-31T22:00:05Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        assert_eq!(
            entry.display(),
            "22:00:05 info  [agent-2] Found 12 Angular directives"
        );
    }
}
