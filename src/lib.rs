//! Lodestar - live update channel and state reducers for a code-migration dashboard.
//!
//! This library provides the project-scoped event channel that feeds the dashboard
//! (agent status, log stream and knowledge graph), the reducers that fold that
//! stream into view state, a synthetic event source, and an in-memory backend
//! exposing the REST and push endpoints the dashboard consumes.

#[cfg(feature = "client")]
pub mod client;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dashboard;
pub mod layout;
pub mod live;
pub mod logging;
pub mod models;
pub mod reducers;
#[cfg(feature = "server")]
pub mod server;

use crate::models::AgentState;

/// Library-level error type for Lodestar operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Agent {agent_id} cannot go from {from} to {to}")]
    InvalidTransition {
        agent_id: String,
        from: AgentState,
        to: AgentState,
    },

    #[error("Channel registry has been shut down")]
    RegistryClosed,

    #[error("No async runtime available to drive the event source")]
    NoRuntime,

    /// A command endpoint answered with a non-success status.
    #[error("{message}")]
    Transport { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(feature = "client")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err.to_string())
    }
}

/// Result type alias for Lodestar operations.
pub type Result<T> = std::result::Result<T, Error>;
