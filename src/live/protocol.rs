//! Push-channel event types.
//!
//! Every event delivered on a project's channel is one of three kinds, JSON-encoded
//! with a `type` field for discrimination:
//!
//! - `agent:update`: status/progress of one agent
//! - `agent:log`: one log line attributed to an agent
//! - `graph:update`: a full knowledge-graph snapshot (not a delta)
//!
//! # Examples
//!
//! ```json
//! {"type": "agent:update", "projectId": "proj-1", "agentId": "agent-0", "name": "File Scanner",
//!  "status": "running", "percent": 40, "message": "Processing dependencies...",
//!  "timestamp": "2026-01-31T22:00:00Z"}
//! {"type": "agent:log", "projectId": "proj-1", "agentId": "agent-3", "message": "Found 12 Angular directives",
//!  "level": "info", "timestamp": "2026-01-31T22:00:01Z"}
//! {"type": "graph:update", "projectId": "proj-1", "graph": {"nodes": [], "edges": []}}
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AgentState, KnowledgeGraph, LogLevel};
use crate::{Error, Result};

/// One event on a project's live update channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelEvent {
    #[serde(rename = "agent:update")]
    AgentUpdate(AgentUpdate),

    #[serde(rename = "agent:log")]
    AgentLog(AgentLog),

    #[serde(rename = "graph:update")]
    GraphUpdate(GraphUpdate),
}

/// Authoritative status of one agent at `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUpdate {
    pub project_id: String,
    pub agent_id: String,
    pub name: String,
    pub status: AgentState,
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A log line emitted by an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentLog {
    pub project_id: String,
    pub agent_id: String,
    pub message: String,
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
}

/// Complete graph for the project, replacing whatever the receiver held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphUpdate {
    pub project_id: String,
    pub graph: KnowledgeGraph,
}

impl ChannelEvent {
    /// Wire name of this event's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelEvent::AgentUpdate(_) => "agent:update",
            ChannelEvent::AgentLog(_) => "agent:log",
            ChannelEvent::GraphUpdate(_) => "graph:update",
        }
    }

    pub fn project_id(&self) -> &str {
        match self {
            ChannelEvent::AgentUpdate(e) => &e.project_id,
            ChannelEvent::AgentLog(e) => &e.project_id,
            ChannelEvent::GraphUpdate(e) => &e.project_id,
        }
    }

    /// Encode as a single JSON text frame.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode and validate one JSON text frame.
    ///
    /// Fails on unknown `type` values, missing fields, percents above 100, and
    /// graph snapshots that repeat a node id.
    pub fn decode(text: &str) -> Result<Self> {
        let event: ChannelEvent = serde_json::from_str(text)?;
        event.validate()?;
        Ok(event)
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.project_id().is_empty() {
            return Err(Error::InvalidInput(format!(
                "{} event without projectId",
                self.kind()
            )));
        }
        if let ChannelEvent::AgentUpdate(update) = self {
            if update.agent_id.is_empty() {
                return Err(Error::InvalidInput(
                    "agent:update event without agentId".to_string(),
                ));
            }
            if update.percent > 100 {
                return Err(Error::InvalidInput(format!(
                    "agent:update percent must be 0-100, got {}",
                    update.percent
                )));
            }
        }
        if let ChannelEvent::GraphUpdate(update) = self {
            let mut seen = HashSet::new();
            if let Some(node) = update.graph.nodes.iter().find(|n| !seen.insert(n.id.as_str())) {
                return Err(Error::InvalidInput(format!(
                    "graph:update repeats node id {}",
                    node.id
                )));
            }
        }
        Ok(())
    }
}
