//! Command implementations for the Lodestar CLI.
//!
//! Each command returns a result type implementing [`Output`]; `main` decides
//! whether to print it as JSON or for humans. Streaming commands (`simulate`,
//! `watch`) hand every received event to a caller-supplied callback as well.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::{self, ConfigOverrides, LodestarConfig, ResolvedConfig, resolve_config};
use crate::live::{ChannelEvent, ChannelRegistry, SimulatedSource, SimulationConfig};
use crate::{Error, Result};

#[cfg(feature = "client")]
use crate::client::ApiClient;
#[cfg(feature = "client")]
use crate::dashboard::{DashboardSnapshot, PatchReview, ProjectDashboard};
#[cfg(feature = "client")]
use crate::layout::{ForceConfig, ForceLayout, LayoutService};
#[cfg(feature = "client")]
use crate::live::RemoteSource;
#[cfg(feature = "client")]
use crate::models::{
    KnowledgeGraph, LevelFilter, MAX_UPLOAD_BYTES, Patch, Project, ProjectSummary, UploadResponse,
    is_zip_archive,
};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// One-line description of an event for terminal output.
pub fn describe_event(event: &ChannelEvent) -> String {
    match event {
        ChannelEvent::AgentUpdate(u) => format!(
            "{} {:<9} {:>3}%  {}",
            u.agent_id,
            u.status.as_str(),
            u.percent,
            u.message.as_deref().unwrap_or("")
        )
        .trim_end()
        .to_string(),
        ChannelEvent::AgentLog(l) => {
            format!("[{}] {} {}", l.level.as_str(), l.agent_id, l.message)
        }
        ChannelEvent::GraphUpdate(g) => format!(
            "graph: {} nodes, {} edges",
            g.graph.nodes.len(),
            g.graph.edges.len()
        ),
    }
}

/// Receive events until `duration` elapses, `limit` events arrived, or the
/// channel closes. Returns how many events were handled.
async fn drain_events(
    rx: &mut mpsc::UnboundedReceiver<ChannelEvent>,
    duration: Duration,
    limit: Option<usize>,
    mut on_event: impl FnMut(&ChannelEvent),
) -> usize {
    let mut handled = 0;
    if limit == Some(0) {
        return handled;
    }
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = rx.recv() => match event {
                Some(event) => {
                    on_event(&event);
                    handled += 1;
                    if limit.is_some_and(|n| handled >= n) {
                        break;
                    }
                }
                None => break,
            },
        }
    }
    handled
}

// === Config ===

#[derive(Serialize)]
pub struct ConfigShow {
    pub path: String,
    pub config: ResolvedConfig,
}

impl Output for ConfigShow {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let c = &self.config;
        let mut lines = vec![format!("Config file: {}", self.path)];
        let mut row = |key: &str, value: String, source: &config::ValueSource| {
            lines.push(format!("  {:<14} {:<28} ({})", key, value, source));
        };
        row("host", c.host.value.clone(), &c.host.source);
        row("port", c.port.value.to_string(), &c.port.source);
        row("server-url", c.server_url.value.clone(), &c.server_url.source);
        row("log-level", c.log_level.value.clone(), &c.log_level.source);
        row("log-format", c.log_format.value.to_string(), &c.log_format.source);
        row(
            "agent-tick-ms",
            c.agent_tick_ms.value.to_string(),
            &c.agent_tick_ms.source,
        );
        row("log-tick-ms", c.log_tick_ms.value.to_string(), &c.log_tick_ms.source);
        row(
            "graph-tick-ms",
            c.graph_tick_ms.value.to_string(),
            &c.graph_tick_ms.source,
        );
        match &c.seed {
            Some(seed) => row("seed", seed.value.to_string(), &seed.source),
            None => row("seed", "random".to_string(), &config::ValueSource::Default),
        }
        lines.join("\n")
    }
}

/// Resolve the effective configuration.
pub fn config_show(overrides: &ConfigOverrides) -> Result<ConfigShow> {
    let (path, file) = config::load()?;
    Ok(ConfigShow {
        path: path.display().to_string(),
        config: resolve_config(&file, overrides)?,
    })
}

#[derive(Serialize)]
pub struct ConfigSet {
    pub key: String,
    pub value: String,
    pub path: String,
}

impl Output for ConfigSet {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Set {} = {} in {}", self.key, self.value, self.path)
    }
}

/// Set one key in config.kdl, creating the file when needed.
pub fn config_set(key: &str, value: &str) -> Result<ConfigSet> {
    let (path, mut file) = config::load()?;
    file.set(key, value)?;
    file.validate()?;
    file.save(&path)?;
    Ok(ConfigSet {
        key: key.to_string(),
        value: value.to_string(),
        path: path.display().to_string(),
    })
}

#[derive(Serialize)]
pub struct ConfigPath {
    pub path: String,
    pub exists: bool,
}

impl Output for ConfigPath {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.exists {
            self.path.clone()
        } else {
            format!("{} (not created yet)", self.path)
        }
    }
}

pub fn config_path() -> Result<ConfigPath> {
    let path = config::config_path()?;
    Ok(ConfigPath {
        exists: path.exists(),
        path: path.display().to_string(),
    })
}

/// Load config.kdl for a command run. A broken file is an error, a missing one is not.
pub fn load_config() -> Result<LodestarConfig> {
    let (_, file) = config::load()?;
    Ok(file)
}

// === Simulate ===

#[derive(Debug, Default, Serialize)]
pub struct SimulateSummary {
    pub project_id: String,
    pub events: usize,
    pub agent_updates: usize,
    pub logs: usize,
    pub graph_updates: usize,
}

impl SimulateSummary {
    fn record(&mut self, event: &ChannelEvent) {
        self.events += 1;
        match event {
            ChannelEvent::AgentUpdate(_) => self.agent_updates += 1,
            ChannelEvent::AgentLog(_) => self.logs += 1,
            ChannelEvent::GraphUpdate(_) => self.graph_updates += 1,
        }
    }
}

impl Output for SimulateSummary {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Simulated {} events for {} ({} agent updates, {} logs, {} graph snapshots)",
            self.events, self.project_id, self.agent_updates, self.logs, self.graph_updates
        )
    }
}

/// Run a local simulated channel for one project and report what it produced.
pub async fn simulate(
    project_id: &str,
    config: SimulationConfig,
    limit: Option<usize>,
    duration: Duration,
    mut on_event: impl FnMut(&ChannelEvent),
) -> Result<SimulateSummary> {
    let registry = ChannelRegistry::with_source(SimulatedSource::new(config));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = registry.subscribe(project_id, move |event| {
        let _ = tx.send(event.clone());
    })?;

    let mut summary = SimulateSummary {
        project_id: project_id.to_string(),
        ..Default::default()
    };
    drain_events(&mut rx, duration, limit, |event| {
        summary.record(event);
        on_event(event);
    })
    .await;

    subscription.unsubscribe();
    registry.shutdown();
    Ok(summary)
}

// === Client commands ===

#[cfg(feature = "client")]
fn project_scoped(project_id: &str, err: Error) -> Error {
    match err {
        Error::Transport { status: 404, .. } | Error::NotFound(_) => {
            Error::ProjectNotFound(project_id.to_string())
        }
        other => other,
    }
}

#[cfg(feature = "client")]
#[derive(Serialize)]
#[serde(transparent)]
pub struct ProjectList(pub Vec<ProjectSummary>);

#[cfg(feature = "client")]
impl Output for ProjectList {
    fn to_json(&self) -> String {
        json(&self.0)
    }

    fn to_human(&self) -> String {
        if self.0.is_empty() {
            return "No projects. Upload one with `lodestar upload <archive>`.".to_string();
        }
        let mut lines = vec![format!("{} project(s):", self.0.len())];
        for p in &self.0 {
            lines.push(format!(
                "  {}  {:<24} {:<10} {}/{} agents done  uploaded {}",
                p.id,
                p.name,
                p.status.as_str(),
                p.completed_agents,
                p.agent_count,
                p.uploaded_at.format("%Y-%m-%d %H:%M")
            ));
        }
        lines.join("\n")
    }
}

#[cfg(feature = "client")]
pub async fn projects(client: &ApiClient) -> Result<ProjectList> {
    Ok(ProjectList(client.list_projects().await?))
}

#[cfg(feature = "client")]
#[derive(Serialize)]
#[serde(transparent)]
pub struct ProjectShow(pub Project);

#[cfg(feature = "client")]
impl Output for ProjectShow {
    fn to_json(&self) -> String {
        json(&self.0)
    }

    fn to_human(&self) -> String {
        let p = &self.0;
        let mut lines = vec![
            format!("{} ({})", p.name, p.id),
            format!(
                "  status: {}  uploaded: {}",
                p.status,
                p.uploaded_at.format("%Y-%m-%d %H:%M:%S")
            ),
        ];
        if p.agents.is_empty() {
            lines.push("  no agents reported yet".to_string());
        }
        for a in &p.agents {
            lines.push(format!(
                "  {:<8} {:<24} {:<9} {:>3}%  {}",
                a.agent_id,
                a.name,
                a.status.as_str(),
                a.percent,
                a.last_message.as_deref().unwrap_or("")
            ));
        }
        lines.join("\n")
    }
}

#[cfg(feature = "client")]
pub async fn show(client: &ApiClient, project_id: &str) -> Result<ProjectShow> {
    Ok(ProjectShow(client.project(project_id).await?))
}

#[cfg(feature = "client")]
#[derive(Serialize)]
#[serde(transparent)]
pub struct Uploaded(pub UploadResponse);

#[cfg(feature = "client")]
impl Output for Uploaded {
    fn to_json(&self) -> String {
        json(&self.0)
    }

    fn to_human(&self) -> String {
        format!(
            "Uploaded project {} (task {})\nFollow it with: lodestar watch {}",
            self.0.project_id, self.0.task_id, self.0.project_id
        )
    }
}

#[cfg(feature = "client")]
pub async fn upload(client: &ApiClient, archive: &Path, name: Option<&str>) -> Result<Uploaded> {
    if !archive.is_file() {
        return Err(Error::InvalidInput(format!(
            "archive not found: {}",
            archive.display()
        )));
    }
    let file_name = archive.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if !is_zip_archive(file_name, None) {
        return Err(Error::InvalidInput(format!(
            "only .zip archives can be uploaded: {}",
            archive.display()
        )));
    }
    let size = std::fs::metadata(archive)?.len();
    if size > MAX_UPLOAD_BYTES as u64 {
        return Err(Error::InvalidInput(format!(
            "archive is {} bytes, the limit is {} MB",
            size,
            MAX_UPLOAD_BYTES / (1024 * 1024)
        )));
    }
    Ok(Uploaded(client.upload(archive, name).await?))
}

#[cfg(feature = "client")]
#[derive(Serialize)]
pub struct GraphResult {
    pub project_id: String,
    #[serde(flatten)]
    pub graph: KnowledgeGraph,
}

#[cfg(feature = "client")]
impl Output for GraphResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "{}: {} nodes, {} edges",
            self.project_id,
            self.graph.nodes.len(),
            self.graph.edges.len()
        )];
        for n in &self.graph.nodes {
            let position = match (n.x, n.y) {
                (Some(x), Some(y)) => format!("  @ ({:.0}, {:.0})", x, y),
                _ => String::new(),
            };
            let lines_meta = n.lines().map(|l| format!(" {} lines", l)).unwrap_or_default();
            lines.push(format!(
                "  {:<10} {:<10} {}{}{}",
                n.id, n.node_type, n.label, lines_meta, position
            ));
        }
        for e in &self.graph.edges {
            lines.push(format!(
                "  {} -> {}{}",
                e.from,
                e.to,
                e.label.as_deref().map(|l| format!(" ({})", l)).unwrap_or_default()
            ));
        }
        lines.join("\n")
    }
}

/// Fetch the knowledge graph, optionally laid out locally.
#[cfg(feature = "client")]
pub async fn graph(client: &ApiClient, project_id: &str, layout: bool) -> Result<GraphResult> {
    let graph = client
        .knowledge_graph(project_id)
        .await
        .map_err(|e| project_scoped(project_id, e))?;
    let graph = if layout {
        ForceLayout::new(ForceConfig::default()).layout(&graph)
    } else {
        graph
    };
    Ok(GraphResult {
        project_id: project_id.to_string(),
        graph,
    })
}

#[cfg(feature = "client")]
#[derive(Serialize)]
pub struct FileContent {
    pub project_id: String,
    pub path: String,
    pub content: String,
}

#[cfg(feature = "client")]
impl Output for FileContent {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        self.content.clone()
    }
}

#[cfg(feature = "client")]
pub async fn file(client: &ApiClient, project_id: &str, path: &str) -> Result<FileContent> {
    let content = client.file(project_id, path).await?;
    Ok(FileContent {
        project_id: project_id.to_string(),
        path: path.to_string(),
        content,
    })
}

#[cfg(feature = "client")]
#[derive(Serialize)]
pub struct AgentRunRequested {
    pub project_id: String,
    pub agent_id: String,
}

#[cfg(feature = "client")]
impl Output for AgentRunRequested {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Requested run of {} in {}", self.agent_id, self.project_id)
    }
}

#[cfg(feature = "client")]
pub async fn run_agent(
    client: &ApiClient,
    project_id: &str,
    agent_id: &str,
) -> Result<AgentRunRequested> {
    client.run_agent(project_id, agent_id).await?;
    Ok(AgentRunRequested {
        project_id: project_id.to_string(),
        agent_id: agent_id.to_string(),
    })
}

#[cfg(feature = "client")]
#[derive(Serialize)]
pub struct PatchOutcome {
    pub project_id: String,
    #[serde(flatten)]
    pub review: PatchReview,
}

#[cfg(feature = "client")]
impl Output for PatchOutcome {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match &self.review {
            PatchReview::Applied {
                file_path,
                backup_path: Some(backup),
            } => format!("Applied patch to {} (previous version at {})", file_path, backup),
            PatchReview::Applied { file_path, .. } => format!("Applied patch to {}", file_path),
            PatchReview::Failed { file_path, message } => {
                format!("Patch to {} failed: {}", file_path, message)
            }
            other => format!("Patch state: {:?}", other),
        }
    }
}

/// Send a patch built from a local file. A rejected patch is an error.
#[cfg(feature = "client")]
pub async fn apply_patch(
    client: &ApiClient,
    project_id: &str,
    file_path: &str,
    content: &Path,
    author: Option<String>,
) -> Result<PatchOutcome> {
    let patch = Patch {
        file_path: file_path.to_string(),
        content: tokio::fs::read_to_string(content).await?,
        description: None,
    };
    let result = client
        .apply_patch(project_id, &patch.to_request(author))
        .await
        .map_err(|e| project_scoped(project_id, e));
    let review = PatchReview::settled(patch.file_path, &result);
    if let PatchReview::Failed { message, .. } = &review {
        return Err(result
            .err()
            .unwrap_or_else(|| Error::Other(message.clone())));
    }
    Ok(PatchOutcome {
        project_id: project_id.to_string(),
        review,
    })
}

#[cfg(feature = "client")]
#[derive(Serialize)]
#[serde(transparent)]
pub struct WatchResult(pub DashboardSnapshot);

#[cfg(feature = "client")]
impl Output for WatchResult {
    fn to_json(&self) -> String {
        json(&self.0)
    }

    fn to_human(&self) -> String {
        let s = &self.0;
        let done = s
            .agents
            .iter()
            .filter(|a| a.status == crate::models::AgentState::Success)
            .count();
        let mut lines = vec![
            format!("{} ({}) - {}", s.name, s.project_id, s.status),
            format!("Agents ({}/{} done):", done, s.agents.len()),
        ];
        for a in &s.agents {
            lines.push(format!(
                "  {:<8} {:<24} {:<9} {:>3}%",
                a.agent_id,
                a.name,
                a.status.as_str(),
                a.percent
            ));
        }
        lines.push(format!(
            "Graph: {} nodes, {} edges",
            s.graph.nodes.len(),
            s.graph.edges.len()
        ));
        lines.push(format!(
            "Logs ({} shown, {} received):",
            s.logs.len(),
            s.logs_received
        ));
        for entry in &s.logs {
            lines.push(format!("  {}", entry.display()));
        }
        lines.join("\n")
    }
}

/// Follow a project's live channel for `duration`, then report the dashboard state.
#[cfg(feature = "client")]
pub async fn watch(
    client: ApiClient,
    project_id: &str,
    duration: Duration,
    filter: LevelFilter,
    tail: usize,
    on_event: impl FnMut(&ChannelEvent),
) -> Result<WatchResult> {
    let registry = ChannelRegistry::with_source(RemoteSource::new(client.base_url()));
    let dashboard = ProjectDashboard::open(&registry, client, project_id).await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let follower = registry.subscribe(project_id, move |event| {
        let _ = tx.send(event.clone());
    })?;
    drain_events(&mut rx, duration, None, on_event).await;
    follower.unsubscribe();

    let mut snapshot = dashboard.snapshot(filter);
    if snapshot.logs.len() > tail {
        snapshot.logs.drain(..snapshot.logs.len() - tail);
    }
    dashboard.close();
    registry.shutdown();
    Ok(WatchResult(snapshot))
}

/// Build overrides from the global flags.
pub fn overrides(
    server_url: Option<String>,
    log_level: Option<String>,
    log_json: bool,
) -> ConfigOverrides {
    ConfigOverrides {
        server_url,
        log_level,
        log_format: log_json.then_some(crate::config::LogFormat::Json),
        ..Default::default()
    }
}

/// Effective configuration for a command run.
pub fn resolve(overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    resolve_config(&load_config()?, overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::{AgentLog, GraphUpdate};
    use crate::models::{KnowledgeGraph, LogLevel};
    use chrono::Utc;

    fn seeded() -> SimulationConfig {
        SimulationConfig {
            seed: Some(7),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulate_stops_at_event_limit() {
        let mut seen = Vec::new();
        let summary = simulate("demo", seeded(), Some(10), Duration::from_secs(60), |e| {
            seen.push(e.kind())
        })
        .await
        .unwrap();
        assert_eq!(summary.events, 10);
        assert_eq!(seen.len(), 10);
        assert_eq!(
            summary.agent_updates + summary.logs + summary.graph_updates,
            10
        );
        assert!(summary.agent_updates >= 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulate_stops_at_deadline() {
        // One agent tick (800ms) fits in a second; the first log tick (1500ms) does not.
        let summary = simulate("demo", seeded(), None, Duration::from_secs(1), |_| {})
            .await
            .unwrap();
        assert_eq!(summary.agent_updates, 7);
        assert_eq!(summary.logs, 0);
        assert_eq!(summary.graph_updates, 0);
    }

    #[tokio::test]
    async fn test_simulate_zero_limit_returns_immediately() {
        let summary = simulate("demo", seeded(), Some(0), Duration::from_secs(60), |_| {})
            .await
            .unwrap();
        assert_eq!(summary.events, 0);
    }

    #[test]
    fn test_describe_event() {
        let log = ChannelEvent::AgentLog(AgentLog {
            project_id: "p".into(),
            agent_id: "agent-2".into(),
            message: "Deprecated API usage found".into(),
            level: LogLevel::Warn,
            timestamp: Utc::now(),
        });
        assert_eq!(describe_event(&log), "[warn] agent-2 Deprecated API usage found");

        let graph = ChannelEvent::GraphUpdate(GraphUpdate {
            project_id: "p".into(),
            graph: KnowledgeGraph::default(),
        });
        assert_eq!(describe_event(&graph), "graph: 0 nodes, 0 edges");
    }

    #[test]
    fn test_simulate_summary_human() {
        let summary = SimulateSummary {
            project_id: "demo".into(),
            events: 3,
            agent_updates: 1,
            logs: 1,
            graph_updates: 1,
        };
        assert_eq!(
            summary.to_human(),
            "Simulated 3 events for demo (1 agent updates, 1 logs, 1 graph snapshots)"
        );
        assert!(summary.to_json().contains("\"agent_updates\":1"));
    }

    #[test]
    fn test_overrides_from_flags() {
        let o = overrides(None, Some("debug".into()), true);
        assert_eq!(o.log_level.as_deref(), Some("debug"));
        assert_eq!(o.log_format, Some(crate::config::LogFormat::Json));
        assert!(overrides(None, None, false).log_format.is_none());
    }
}
