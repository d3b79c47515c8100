//! Data models for Lodestar entities.
//!
//! This module defines the core data structures exchanged between the backend,
//! the live update channel and the dashboard:
//! - `Project` / `ProjectSummary` - One migration job per uploaded archive
//! - `AgentStatus` - A named unit of migration work with progress
//! - `LogEntry` - An immutable log line attributed to a project (and maybe an agent)
//! - `KnowledgeGraph` - Nodes and edges discovered in the uploaded codebase
//! - `Patch` and the apply-patch request/response pair

pub mod agents;
pub mod graph;
pub mod logs;

pub use agents::{AgentState, AgentStatus};
pub use graph::{GraphEdge, GraphNode, GraphNodeType, KnowledgeGraph};
pub use logs::{LevelFilter, LogEntry, LogLevel};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Pending,
    Processing,
    Done,
    Failed,
}

impl ProjectStatus {
    /// Derive a project's status from the current state of its agents.
    ///
    /// All agents terminal resolves to `Done`, or `Failed` when any agent failed.
    /// Any agent that has left the queue makes the project `Processing`.
    pub fn derive(agents: &[AgentStatus]) -> Self {
        if agents.is_empty() {
            return ProjectStatus::Pending;
        }
        if agents.iter().all(|a| a.status.is_terminal()) {
            if agents.iter().any(|a| a.status == AgentState::Failed) {
                ProjectStatus::Failed
            } else {
                ProjectStatus::Done
            }
        } else if agents.iter().any(|a| a.status != AgentState::Queued) {
            ProjectStatus::Processing
        } else {
            ProjectStatus::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::Processing => "processing",
            ProjectStatus::Done => "done",
            ProjectStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Full project projection, as returned by `GET /projects/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub agents: Vec<AgentStatus>,
}

impl Project {
    /// Summarize this project for list views.
    pub fn summary(&self) -> ProjectSummary {
        ProjectSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            uploaded_at: self.uploaded_at,
            status: self.status,
            agent_count: self.agents.len(),
            completed_agents: self
                .agents
                .iter()
                .filter(|a| a.status == AgentState::Success)
                .count(),
        }
    }
}

/// Project list entry, as returned by `GET /projects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub uploaded_at: DateTime<Utc>,
    pub status: ProjectStatus,
    pub agent_count: usize,
    pub completed_agents: usize,
}

/// Largest archive accepted for upload
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Whether an upload is a zip archive, judged by its `.zip` file name or an
/// `application/zip` media type.
pub fn is_zip_archive(file_name: &str, content_type: Option<&str>) -> bool {
    file_name.to_ascii_lowercase().ends_with(".zip") || content_type == Some("application/zip")
}

/// Response to a successful archive upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub project_id: String,
    pub task_id: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A proposed change to one file, reviewed by the user before it is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    pub file_path: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Patch {
    /// Build the request body that applies this patch.
    pub fn to_request(&self, author: Option<String>) -> ApplyPatchRequest {
        ApplyPatchRequest {
            file_path: self.file_path.clone(),
            patch: self.content.clone(),
            author,
        }
    }
}

/// Body of `POST /projects/{id}/applyPatch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPatchRequest {
    pub file_path: String,
    pub patch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// Response of `POST /projects/{id}/applyPatch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPatchResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
}
