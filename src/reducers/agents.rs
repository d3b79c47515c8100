//! Agent table reducer.

use std::collections::HashMap;

use tracing::debug;

use super::Reducer;
use crate::live::{AgentUpdate, ChannelEvent};
use crate::models::{AgentState, AgentStatus, ProjectStatus};
use crate::{Error, Result};

/// Current status of every agent seen on a project's channel.
///
/// The first `agent:update` for an id creates the record; later ones overwrite
/// status, percent, message and timestamp only. Records keep first-seen order.
#[derive(Debug, Clone)]
pub struct AgentsReducer {
    project_id: String,
    agents: Vec<AgentStatus>,
    index: HashMap<String, usize>,
}

impl AgentsReducer {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            agents: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Prime the table from a fetched project, e.g. `GET /projects/{id}`.
    ///
    /// Agents already present are left as they are.
    pub fn seed(&mut self, agents: impl IntoIterator<Item = AgentStatus>) {
        for agent in agents {
            if !self.index.contains_key(&agent.agent_id) {
                self.index.insert(agent.agent_id.clone(), self.agents.len());
                self.agents.push(agent);
            }
        }
    }

    pub fn agents(&self) -> &[AgentStatus] {
        &self.agents
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentStatus> {
        self.index.get(agent_id).map(|&i| &self.agents[i])
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Agents that finished successfully.
    pub fn completed(&self) -> usize {
        self.agents
            .iter()
            .filter(|a| a.status == AgentState::Success)
            .count()
    }

    pub fn project_status(&self) -> ProjectStatus {
        ProjectStatus::derive(&self.agents)
    }

    fn apply_update(&mut self, update: &AgentUpdate) {
        match self.index.get(&update.agent_id) {
            Some(&i) => {
                let agent = &mut self.agents[i];
                agent.status = update.status;
                agent.percent = update.percent;
                agent.last_message = update.message.clone();
                agent.last_updated = Some(update.timestamp);
            }
            None => {
                debug!(project_id = %self.project_id, agent_id = %update.agent_id, "new agent");
                self.index.insert(update.agent_id.clone(), self.agents.len());
                self.agents.push(AgentStatus {
                    agent_id: update.agent_id.clone(),
                    name: update.name.clone(),
                    status: update.status,
                    percent: update.percent,
                    last_message: update.message.clone(),
                    last_updated: Some(update.timestamp),
                });
            }
        }
    }

    fn transition(&mut self, agent_id: &str, to: AgentState) -> Result<&mut AgentStatus> {
        let i = *self
            .index
            .get(agent_id)
            .ok_or_else(|| Error::NotFound(format!("agent {}", agent_id)))?;
        let agent = &mut self.agents[i];
        if !agent.status.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                agent_id: agent_id.to_string(),
                from: agent.status,
                to,
            });
        }
        agent.status = to;
        Ok(agent)
    }

    /// Optimistically mark an agent as running from 0%.
    ///
    /// Provisional: the next `agent:update` for the agent overwrites it.
    pub fn run_agent(&mut self, agent_id: &str) -> Result<()> {
        let agent = self.transition(agent_id, AgentState::Running)?;
        agent.percent = 0;
        Ok(())
    }

    /// Optimistically mark a running agent as cancelled.
    pub fn cancel_agent(&mut self, agent_id: &str) -> Result<()> {
        self.transition(agent_id, AgentState::Cancelled)?;
        Ok(())
    }
}

impl Reducer for AgentsReducer {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    fn apply(&mut self, event: &ChannelEvent) {
        if let ChannelEvent::AgentUpdate(update) = event {
            if update.project_id == self.project_id {
                self.apply_update(update);
            }
        }
    }
}
