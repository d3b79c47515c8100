//! Synthetic event source.
//!
//! Stands in for a real migration backend. Each started project gets its own
//! [`Simulation`] driven by three independent timers:
//!
//! - agent progress: queued agents start with ~30% chance per tick, running agents
//!   advance by up to 15 points and resolve to success (~90%) or failure at 100%
//! - log lines: one line per tick from a random agent, info weighted 3:1
//! - graph growth: 1-3 new nodes per tick, each linked to an older node with ~70%
//!   chance, followed by a full snapshot
//!
//! The simulation itself is a plain state machine over an explicit RNG so it can be
//! seeded and stepped in tests; [`SimulatedSource`] only adds the timers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use super::protocol::{AgentLog, AgentUpdate, ChannelEvent, GraphUpdate};
use super::registry::EventSink;
use super::source::{EventSource, SourceCommand, SourceHandle};
use crate::models::{AgentState, GraphEdge, GraphNode, GraphNodeType, KnowledgeGraph, LogLevel};
use crate::{Error, Result};

/// Agents every simulated project runs, as `agent-<index>`.
pub const AGENT_NAMES: [&str; 7] = [
    "File Scanner",
    "Dependency Analyzer",
    "Controller Migrator",
    "Service Transformer",
    "Template Converter",
    "Route Mapper",
    "Test Generator",
];

const START_PROBABILITY: f64 = 0.3;
const MAX_STEP: f64 = 15.0;
const SUCCESS_PROBABILITY: f64 = 0.9;
const EDGE_PROBABILITY: f64 = 0.7;

/// Severity draw: info three times as likely as warn or error.
const LEVEL_WEIGHTS: [LogLevel; 5] = [
    LogLevel::Info,
    LogLevel::Info,
    LogLevel::Info,
    LogLevel::Warn,
    LogLevel::Error,
];

const INFO_MESSAGES: [&str; 6] = [
    "Processing file: src/app/controllers/mainCtrl.js",
    "Found 12 Angular directives",
    "Analyzing service dependencies",
    "Mapping route configurations",
    "Extracting template bindings",
    "Converting $scope references",
];

const WARN_MESSAGES: [&str; 3] = [
    "Deprecated API usage detected: $http.success()",
    "Complex template expression found, manual review recommended",
    "Circular dependency detected between services",
];

const ERROR_MESSAGES: [&str; 3] = [
    "Failed to parse file: syntax error at line 42",
    "Unsupported directive: ng-transclude",
    "Missing module dependency: angular-ui-router",
];

fn label_pool(node_type: GraphNodeType) -> [&'static str; 4] {
    match node_type {
        GraphNodeType::File => ["app.js", "main.ts", "index.js", "config.ts"],
        GraphNodeType::Module => ["AppModule", "SharedModule", "CoreModule", "FeatureModule"],
        GraphNodeType::Component => [
            "HeaderComponent",
            "FooterComponent",
            "NavComponent",
            "CardComponent",
        ],
        GraphNodeType::Service => ["AuthService", "ApiService", "DataService", "UserService"],
        GraphNodeType::Function => ["handleClick", "fetchData", "processInput", "validateForm"],
        GraphNodeType::Class => ["UserController", "ProductService", "OrderModel", "CartManager"],
    }
}

/// Human-readable progress line for an agent.
pub fn status_message(status: AgentState, percent: f64) -> &'static str {
    match status {
        AgentState::Queued => "Waiting in queue...",
        AgentState::Running if percent < 30.0 => "Analyzing source files...",
        AgentState::Running if percent < 60.0 => "Processing dependencies...",
        AgentState::Running if percent < 90.0 => "Generating transformations...",
        AgentState::Running => "Finalizing...",
        AgentState::Success => "Completed successfully",
        AgentState::Failed => "Failed with errors",
        AgentState::Cancelled => "Cancelled by user",
    }
}

/// Timer periods and seeding for [`SimulatedSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub agent_tick: Duration,
    pub log_tick: Duration,
    pub graph_tick: Duration,
    /// Fixed RNG seed; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            agent_tick: Duration::from_millis(800),
            log_tick: Duration::from_millis(1500),
            graph_tick: Duration::from_millis(2000),
            seed: None,
        }
    }
}

#[derive(Debug, Clone)]
struct SimAgent {
    id: String,
    name: &'static str,
    status: AgentState,
    percent: f64,
}

/// Per-project simulation state. Fresh for every started channel.
#[derive(Debug)]
pub struct Simulation {
    project_id: String,
    agents: Vec<SimAgent>,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    node_counter: u64,
    rng: StdRng,
}

impl Simulation {
    pub fn new(project_id: &str, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let agents = AGENT_NAMES
            .iter()
            .enumerate()
            .map(|(idx, name)| SimAgent {
                id: format!("agent-{}", idx),
                name,
                status: AgentState::Queued,
                percent: 0.0,
            })
            .collect();
        Self {
            project_id: project_id.to_string(),
            agents,
            nodes: Vec::new(),
            edges: Vec::new(),
            node_counter: 0,
            rng,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Current status and rounded percent of an agent.
    pub fn agent(&self, agent_id: &str) -> Option<(AgentState, u8)> {
        self.agents
            .iter()
            .find(|a| a.id == agent_id)
            .map(|a| (a.status, a.percent.round() as u8))
    }

    /// Everything generated so far.
    pub fn graph(&self) -> KnowledgeGraph {
        KnowledgeGraph::new(self.nodes.clone(), self.edges.clone())
    }

    fn update_event(&self, agent: &SimAgent, now: DateTime<Utc>) -> ChannelEvent {
        ChannelEvent::AgentUpdate(AgentUpdate {
            project_id: self.project_id.clone(),
            agent_id: agent.id.clone(),
            name: agent.name.to_string(),
            status: agent.status,
            percent: agent.percent.round().clamp(0.0, 100.0) as u8,
            message: Some(status_message(agent.status, agent.percent).to_string()),
            timestamp: now,
        })
    }

    /// Advance every agent one step and report all of them.
    pub fn agent_tick(&mut self, now: DateTime<Utc>) -> Vec<ChannelEvent> {
        for idx in 0..self.agents.len() {
            let agent = &mut self.agents[idx];
            match agent.status {
                AgentState::Queued => {
                    if self.rng.random_bool(START_PROBABILITY) {
                        agent.status = AgentState::Running;
                        agent.percent = 0.0;
                    }
                }
                AgentState::Running => {
                    let step = self.rng.random::<f64>() * MAX_STEP;
                    agent.percent = (agent.percent + step).min(100.0);
                    if agent.percent >= 100.0 {
                        agent.status = if self.rng.random_bool(SUCCESS_PROBABILITY) {
                            AgentState::Success
                        } else {
                            AgentState::Failed
                        };
                    }
                }
                AgentState::Success | AgentState::Failed | AgentState::Cancelled => {}
            }
        }
        self.agents
            .iter()
            .map(|agent| self.update_event(agent, now))
            .collect()
    }

    /// One log line from a random agent.
    pub fn log_tick(&mut self, now: DateTime<Utc>) -> ChannelEvent {
        let agent_idx = self.rng.random_range(0..self.agents.len());
        let level = LEVEL_WEIGHTS[self.rng.random_range(0..LEVEL_WEIGHTS.len())];
        let pool: &[&str] = match level {
            LogLevel::Info => &INFO_MESSAGES,
            LogLevel::Warn => &WARN_MESSAGES,
            LogLevel::Error => &ERROR_MESSAGES,
        };
        let message = pool[self.rng.random_range(0..pool.len())];
        ChannelEvent::AgentLog(AgentLog {
            project_id: self.project_id.clone(),
            agent_id: self.agents[agent_idx].id.clone(),
            message: message.to_string(),
            level,
            timestamp: now,
        })
    }

    /// Grow the graph by 1-3 nodes and return the full snapshot.
    pub fn graph_tick(&mut self) -> ChannelEvent {
        let new_nodes = self.rng.random_range(1..=3);
        for _ in 0..new_nodes {
            let node_type = GraphNodeType::ALL[self.rng.random_range(0..GraphNodeType::ALL.len())];
            let id = format!("node-{}", self.node_counter);
            self.node_counter += 1;
            let pool = label_pool(node_type);
            let label = pool[(self.node_counter % pool.len() as u64) as usize];

            let mut meta = serde_json::Map::new();
            meta.insert(
                "lines".to_string(),
                serde_json::Value::from(self.rng.random_range(10u64..510)),
            );
            let mut node = GraphNode::new(id, label, node_type);
            node.meta = Some(meta);
            self.nodes.push(node);

            let count = self.nodes.len();
            if count > 1 && self.rng.random_bool(EDGE_PROBABILITY) {
                let target = self.rng.random_range(0..count - 1);
                let label = if self.rng.random_bool(0.5) {
                    "imports"
                } else {
                    "uses"
                };
                let edge = GraphEdge::new(&self.nodes[count - 1].id, &self.nodes[target].id)
                    .with_label(label);
                self.edges.push(edge);
            }
        }

        ChannelEvent::GraphUpdate(GraphUpdate {
            project_id: self.project_id.clone(),
            graph: self.graph(),
        })
    }

    /// Restart an agent at 0% and report its new state.
    pub fn run_agent(&mut self, agent_id: &str, now: DateTime<Utc>) -> Result<ChannelEvent> {
        let idx = self
            .agents
            .iter()
            .position(|a| a.id == agent_id)
            .ok_or_else(|| Error::NotFound(format!("agent {}", agent_id)))?;
        let from = self.agents[idx].status;
        if !from.can_transition_to(AgentState::Running) {
            return Err(Error::InvalidTransition {
                agent_id: agent_id.to_string(),
                from,
                to: AgentState::Running,
            });
        }
        self.agents[idx].status = AgentState::Running;
        self.agents[idx].percent = 0.0;
        Ok(self.update_event(&self.agents[idx], now))
    }

    /// Apply a user-intent command, returning the resulting event.
    pub fn apply(&mut self, command: SourceCommand, now: DateTime<Utc>) -> Result<ChannelEvent> {
        match command {
            SourceCommand::RunAgent { agent_id } => self.run_agent(&agent_id, now),
        }
    }
}

/// Timer-driven [`EventSource`] backed by a fresh [`Simulation`] per project.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSource {
    config: SimulationConfig,
}

impl SimulatedSource {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
}

impl EventSource for SimulatedSource {
    fn start(&self, project_id: &str, sink: EventSink) -> Result<SourceHandle> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let simulation = Simulation::new(project_id, self.config.seed);
        let task = runtime.spawn(drive(simulation, self.config.clone(), sink, rx));
        info!(project_id, "simulation started");
        Ok(SourceHandle::from_task(task).with_commands(tx))
    }
}

async fn drive(
    mut simulation: Simulation,
    config: SimulationConfig,
    sink: EventSink,
    mut commands: mpsc::UnboundedReceiver<SourceCommand>,
) {
    let start = Instant::now();
    let mut agent_timer = interval_at(start + config.agent_tick, config.agent_tick);
    let mut log_timer = interval_at(start + config.log_tick, config.log_tick);
    let mut graph_timer = interval_at(start + config.graph_tick, config.graph_tick);
    for timer in [&mut agent_timer, &mut log_timer, &mut graph_timer] {
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    }

    loop {
        let events = tokio::select! {
            _ = agent_timer.tick() => simulation.agent_tick(Utc::now()),
            _ = log_timer.tick() => vec![simulation.log_tick(Utc::now())],
            _ = graph_timer.tick() => vec![simulation.graph_tick()],
            Some(command) = commands.recv() => match simulation.apply(command, Utc::now()) {
                Ok(event) => vec![event],
                Err(e) => {
                    warn!(project_id = %simulation.project_id(), error = %e, "command rejected");
                    Vec::new()
                }
            },
        };

        for event in events {
            if !sink.emit(event) {
                debug!(project_id = %simulation.project_id(), "channel closed, simulation exiting");
                return;
            }
        }
    }
}
