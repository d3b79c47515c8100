//! Agent status records and the per-agent lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of one agent.
///
/// `queued -> running -> {success, failed}`, with `running -> cancelled` on user
/// request and reruns from `failed` or `cancelled`. `success` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    #[default]
    Queued,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl AgentState {
    /// Terminal states do not advance on their own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentState::Success | AgentState::Failed | AgentState::Cancelled
        )
    }

    /// Whether a user-driven move from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: AgentState) -> bool {
        use AgentState::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Running, Success)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Failed, Running)
                | (Cancelled, Running)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Queued => "queued",
            AgentState::Running => "running",
            AgentState::Success => "success",
            AgentState::Failed => "failed",
            AgentState::Cancelled => "cancelled",
        }
    }

    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Some(AgentState::Queued),
            "running" => Some(AgentState::Running),
            "success" => Some(AgentState::Success),
            "failed" => Some(AgentState::Failed),
            "cancelled" => Some(AgentState::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current view of one agent within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    /// Stable identifier, unique within a project
    pub agent_id: String,
    /// Display name (immutable once observed)
    pub name: String,
    pub status: AgentState,
    /// Completion percent in `0..=100`
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!AgentState::Queued.is_terminal());
        assert!(!AgentState::Running.is_terminal());
        assert!(AgentState::Success.is_terminal());
        assert!(AgentState::Failed.is_terminal());
        assert!(AgentState::Cancelled.is_terminal());
    }

    #[test]
    fn test_rerun_paths() {
        assert!(AgentState::Failed.can_transition_to(AgentState::Running));
        assert!(AgentState::Cancelled.can_transition_to(AgentState::Running));
        assert!(!AgentState::Success.can_transition_to(AgentState::Running));
    }

    #[test]
    fn test_cancel_only_from_running() {
        assert!(AgentState::Running.can_transition_to(AgentState::Cancelled));
        assert!(!AgentState::Queued.can_transition_to(AgentState::Cancelled));
        assert!(!AgentState::Success.can_transition_to(AgentState::Cancelled));
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(AgentState::parse("RUNNING"), Some(AgentState::Running));
        assert_eq!(AgentState::parse("paused"), None);
        assert_eq!(AgentState::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_agent_status_wire_names() {
        let status = AgentStatus {
            agent_id: "agent-0".to_string(),
            name: "File Scanner".to_string(),
            status: AgentState::Running,
            percent: 42,
            last_message: Some("Processing dependencies...".to_string()),
            last_updated: None,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains(r#""agentId":"agent-0""#));
        assert!(json.contains(r#""lastMessage":"Processing dependencies...""#));
        assert!(!json.contains("lastUpdated"));
    }
}
