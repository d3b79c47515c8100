//! Bounded log buffer.

use std::collections::VecDeque;

use uuid::Uuid;

use super::Reducer;
use crate::live::{AgentLog, ChannelEvent};
use crate::models::{LevelFilter, LogEntry};

/// Most entries a buffer retains
pub const LOG_RETENTION_CAP: usize = 500;

/// The most recent log lines for a project, oldest first.
///
/// Entries are kept in arrival order, never re-sorted by timestamp. Once the cap is
/// exceeded the oldest entry is evicted.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    project_id: String,
    entries: VecDeque<LogEntry>,
    cap: usize,
    total_received: u64,
}

impl LogBuffer {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self::with_cap(project_id, LOG_RETENTION_CAP)
    }

    pub fn with_cap(project_id: impl Into<String>, cap: usize) -> Self {
        Self {
            project_id: project_id.into(),
            entries: VecDeque::with_capacity(cap.min(LOG_RETENTION_CAP)),
            cap,
            total_received: 0,
        }
    }

    /// Append an entry, evicting from the front past the cap.
    pub fn push(&mut self, entry: LogEntry) {
        self.total_received += 1;
        self.entries.push_back(entry);
        while self.entries.len() > self.cap {
            self.entries.pop_front();
        }
    }

    fn entry_from(log: &AgentLog) -> LogEntry {
        LogEntry {
            id: format!("log-{}", Uuid::new_v4()),
            project_id: log.project_id.clone(),
            agent_id: Some(log.agent_id.clone()),
            message: log.message.clone(),
            level: log.level,
            timestamp: log.timestamp,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Everything ever delivered, including evicted and cleared entries.
    pub fn total_received(&self) -> u64 {
        self.total_received
    }

    /// Retained entries matching `filter`, in order. Does not touch the buffer.
    pub fn filter(&self, filter: LevelFilter) -> Vec<&LogEntry> {
        self.entries
            .iter()
            .filter(|e| filter.matches(e.level))
            .collect()
    }

    /// The last `n` retained entries matching `filter`.
    pub fn tail(&self, filter: LevelFilter, n: usize) -> Vec<&LogEntry> {
        let matching = self.filter(filter);
        let skip = matching.len().saturating_sub(n);
        matching.into_iter().skip(skip).collect()
    }

    /// Drop every retained entry. Later events still arrive.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Reducer for LogBuffer {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    fn apply(&mut self, event: &ChannelEvent) {
        if let ChannelEvent::AgentLog(log) = event {
            if log.project_id == self.project_id {
                self.push(Self::entry_from(log));
            }
        }
    }
}
