//! Event source abstraction.
//!
//! An [`EventSource`] produces the live event stream for one project once started.
//! The registry owns the returned [`SourceHandle`] and disposes of it when the last
//! subscriber for that project leaves, so a synthetic generator and a backend-fed
//! source are interchangeable without touching the registry or the reducers.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::registry::EventSink;
use crate::{Error, Result};

/// A producer of push-channel events.
pub trait EventSource: Send + Sync {
    /// Start producing events for `project_id` into `sink`.
    ///
    /// The source must stop emitting once the returned handle is stopped or dropped.
    /// Emitting into a closed sink is harmless; `EventSink::emit` reports it so the
    /// source can wind down on its own.
    fn start(&self, project_id: &str, sink: EventSink) -> Result<SourceHandle>;
}

/// User-intent commands a running source may honor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCommand {
    /// Put the agent back to `running` at 0%.
    RunAgent { agent_id: String },
}

/// Disposable handle to a started source.
///
/// Stopping is idempotent and also happens on drop.
pub struct SourceHandle {
    stop: Option<Box<dyn FnOnce() + Send>>,
    commands: Option<mpsc::UnboundedSender<SourceCommand>>,
}

impl SourceHandle {
    /// Handle that runs `stop` exactly once.
    pub fn new(stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            stop: Some(Box::new(stop)),
            commands: None,
        }
    }

    /// Handle that aborts a spawned task when stopped.
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self::new(move || task.abort())
    }

    /// Handle with nothing to stop.
    pub fn detached() -> Self {
        Self {
            stop: None,
            commands: None,
        }
    }

    /// Attach a command channel read by the running source.
    pub fn with_commands(mut self, commands: mpsc::UnboundedSender<SourceCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Forward a command to the running source.
    pub fn send(&self, command: SourceCommand) -> Result<()> {
        match &self.commands {
            Some(tx) => tx
                .send(command)
                .map_err(|_| Error::Other("event source is no longer running".to_string())),
            None => Err(Error::Unsupported(
                "this event source does not accept commands".to_string(),
            )),
        }
    }

    pub fn stop(&mut self) {
        self.commands = None;
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandle")
            .field("running", &self.stop.is_some())
            .field("accepts_commands", &self.commands.is_some())
            .finish()
    }
}
