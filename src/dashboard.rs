//! Per-project dashboard state.
//!
//! A [`ProjectDashboard`] is what a presentation layer holds while a project is open:
//! the three live reducers, the project's read-only projection, and the user-intent
//! commands. Commands go to a [`CommandEndpoint`], never into the reducers directly;
//! the only local effect is the optimistic agent transition.

use std::future::Future;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{info, warn};

use crate::live::ChannelRegistry;
use crate::live::registry::lock;
use crate::models::{
    AgentStatus, ApplyPatchRequest, ApplyPatchResponse, KnowledgeGraph, LevelFilter, LogEntry,
    Patch, Project, ProjectStatus,
};
use crate::reducers::{AgentsReducer, GraphReducer, LiveView, LogBuffer};
use crate::{Error, Result};

/// The backend's command surface as the dashboard needs it.
pub trait CommandEndpoint: Send + Sync {
    /// Fetch a project. Unknown ids fail with [`Error::ProjectNotFound`].
    fn get_project(&self, project_id: &str) -> impl Future<Output = Result<Project>> + Send;

    fn run_agent(
        &self,
        project_id: &str,
        agent_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn apply_patch(
        &self,
        project_id: &str,
        request: &ApplyPatchRequest,
    ) -> impl Future<Output = Result<ApplyPatchResponse>> + Send;
}

/// Progress of the patch currently under review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PatchReview {
    #[default]
    Idle,
    Applying { file_path: String },
    Applied {
        file_path: String,
        backup_path: Option<String>,
    },
    /// The error exactly as the endpoint reported it
    Failed { file_path: String, message: String },
}

impl PatchReview {
    pub fn is_loading(&self) -> bool {
        matches!(self, PatchReview::Applying { .. })
    }

    /// Review state for `file_path` once the endpoint has answered.
    pub fn settled(file_path: String, result: &Result<ApplyPatchResponse>) -> Self {
        match result {
            Ok(response) if response.success => PatchReview::Applied {
                file_path,
                backup_path: response.backup_path.clone(),
            },
            Ok(_) => PatchReview::Failed {
                file_path,
                message: "Patch was not applied".to_string(),
            },
            Err(e) => PatchReview::Failed {
                file_path,
                message: e.to_string(),
            },
        }
    }
}

/// Point-in-time view of everything a dashboard shows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub project_id: String,
    pub name: String,
    pub status: ProjectStatus,
    pub agents: Vec<AgentStatus>,
    pub logs: Vec<LogEntry>,
    pub logs_received: u64,
    pub graph: KnowledgeGraph,
    pub selected_node: Option<String>,
    pub patch: PatchReview,
}

/// An open project wired to its live channel.
pub struct ProjectDashboard<E> {
    project: Project,
    endpoint: E,
    agents: LiveView<AgentsReducer>,
    logs: LiveView<LogBuffer>,
    graph: LiveView<GraphReducer>,
    patch: Mutex<PatchReview>,
}

impl<E: CommandEndpoint> ProjectDashboard<E> {
    /// Look the project up, then subscribe the three reducers to its channel.
    ///
    /// A missing project fails with [`Error::ProjectNotFound`] and nothing is
    /// subscribed.
    pub async fn open(registry: &ChannelRegistry, endpoint: E, project_id: &str) -> Result<Self> {
        if project_id.trim().is_empty() {
            return Err(Error::ProjectNotFound(project_id.to_string()));
        }
        let project = match endpoint.get_project(project_id).await {
            Ok(project) => project,
            Err(Error::NotFound(_)) | Err(Error::Transport { status: 404, .. }) => {
                return Err(Error::ProjectNotFound(project_id.to_string()));
            }
            Err(e) => return Err(e),
        };

        let mut agents = AgentsReducer::new(project_id);
        agents.seed(project.agents.iter().cloned());
        let agents = LiveView::attach(registry, agents)?;
        let logs = LiveView::attach(registry, LogBuffer::new(project_id))?;
        let graph = LiveView::attach(registry, GraphReducer::new(project_id))?;
        info!(project_id, "dashboard opened");

        Ok(Self {
            project,
            endpoint,
            agents,
            logs,
            graph,
            patch: Mutex::new(PatchReview::Idle),
        })
    }

    /// The project as fetched on open.
    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn agents(&self) -> &LiveView<AgentsReducer> {
        &self.agents
    }

    pub fn logs(&self) -> &LiveView<LogBuffer> {
        &self.logs
    }

    pub fn graph(&self) -> &LiveView<GraphReducer> {
        &self.graph
    }

    /// Mark the agent running locally, then ask the backend to run it.
    ///
    /// The local change is visible before the request completes. A failed request
    /// is reported as-is and not retried.
    pub async fn run_agent(&self, agent_id: &str) -> Result<()> {
        self.agents.with_mut(|r| r.run_agent(agent_id))?;
        if let Err(e) = self.endpoint.run_agent(&self.project.id, agent_id).await {
            warn!(project_id = %self.project.id, agent_id, error = %e, "run request failed");
            return Err(e);
        }
        Ok(())
    }

    /// Mark a running agent cancelled. Local only; no backend command exists.
    pub fn cancel_agent(&self, agent_id: &str) -> Result<()> {
        self.agents.with_mut(|r| r.cancel_agent(agent_id))
    }

    pub fn patch_state(&self) -> PatchReview {
        lock(&self.patch).clone()
    }

    /// Apply a reviewed patch. The review sits in `Applying` until the endpoint
    /// answers, then records the outcome.
    pub async fn apply_patch(&self, patch: &Patch, author: Option<String>) -> Result<ApplyPatchResponse> {
        let file_path = patch.file_path.clone();
        *lock(&self.patch) = PatchReview::Applying {
            file_path: file_path.clone(),
        };

        let result = self
            .endpoint
            .apply_patch(&self.project.id, &patch.to_request(author))
            .await;

        *lock(&self.patch) = PatchReview::settled(file_path, &result);
        result
    }

    pub fn snapshot(&self, filter: LevelFilter) -> DashboardSnapshot {
        let (agents, status) = self
            .agents
            .with(|r| (r.agents().to_vec(), r.project_status()));
        let (logs, logs_received) = self.logs.with(|b| {
            (
                b.filter(filter).into_iter().cloned().collect(),
                b.total_received(),
            )
        });
        let (graph, selected_node) = self.graph.with(|g| {
            (
                g.render_graph(),
                g.selected_id().map(|s| s.to_string()),
            )
        });
        DashboardSnapshot {
            project_id: self.project.id.clone(),
            name: self.project.name.clone(),
            status,
            agents,
            logs,
            logs_received,
            graph,
            selected_node,
            patch: self.patch_state(),
        }
    }

    /// Unsubscribe all three reducers.
    pub fn close(self) {
        self.agents.detach();
        self.logs.detach();
        self.graph.detach();
        info!(project_id = %self.project.id, "dashboard closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::{AgentUpdate, ChannelEvent, EventSink, EventSource, SourceHandle};
    use crate::models::AgentState;
    use chrono::Utc;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct CaptureSource {
        sinks: Mutex<Vec<EventSink>>,
    }

    impl EventSource for CaptureSource {
        fn start(&self, _project_id: &str, sink: EventSink) -> Result<SourceHandle> {
            lock(&self.sinks).push(sink);
            Ok(SourceHandle::detached())
        }
    }

    #[derive(Default)]
    struct FakeEndpoint {
        runs: Mutex<Vec<String>>,
        run_gate: Mutex<Option<oneshot::Receiver<()>>>,
        run_error: Option<(u16, String)>,
        patch_gate: Mutex<Option<oneshot::Receiver<Result<ApplyPatchResponse>>>>,
    }

    fn project() -> Project {
        Project {
            id: "proj-1".to_string(),
            name: "legacy-app".to_string(),
            uploaded_at: Utc::now(),
            status: ProjectStatus::Processing,
            agents: vec![AgentStatus {
                agent_id: "agent-0".to_string(),
                name: "File Scanner".to_string(),
                status: AgentState::Failed,
                percent: 100,
                last_message: None,
                last_updated: None,
            }],
        }
    }

    impl CommandEndpoint for FakeEndpoint {
        async fn get_project(&self, project_id: &str) -> Result<Project> {
            if project_id == "proj-1" {
                Ok(project())
            } else {
                Err(Error::Transport {
                    status: 404,
                    message: "API Error: 404 Not Found".to_string(),
                })
            }
        }

        async fn run_agent(&self, _project_id: &str, agent_id: &str) -> Result<()> {
            let gate = lock(&self.run_gate).take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            lock(&self.runs).push(agent_id.to_string());
            match &self.run_error {
                Some((status, message)) => Err(Error::Transport {
                    status: *status,
                    message: message.clone(),
                }),
                None => Ok(()),
            }
        }

        async fn apply_patch(
            &self,
            _project_id: &str,
            request: &ApplyPatchRequest,
        ) -> Result<ApplyPatchResponse> {
            let gate = lock(&self.patch_gate).take();
            match gate {
                Some(gate) => gate.await.unwrap_or_else(|_| Err(Error::Other("gate dropped".into()))),
                None => Ok(ApplyPatchResponse {
                    success: true,
                    backup_path: Some(format!("{}.orig", request.file_path)),
                }),
            }
        }
    }

    fn patch() -> Patch {
        Patch {
            file_path: "src/app/main.ts".to_string(),
            content: "export const x = 1;".to_string(),
            description: Some("convert controller".to_string()),
        }
    }

    #[tokio::test]
    async fn test_open_missing_project_subscribes_nothing() {
        let source = Arc::new(CaptureSource::default());
        let registry = ChannelRegistry::new(source.clone());
        let result = ProjectDashboard::open(&registry, FakeEndpoint::default(), "proj-404").await;
        assert!(matches!(result, Err(Error::ProjectNotFound(id)) if id == "proj-404"));
        assert!(registry.live_projects().is_empty());
        assert!(lock(&source.sinks).is_empty());
    }

    #[tokio::test]
    async fn test_open_attaches_three_reducers_and_seeds_agents() {
        let source = Arc::new(CaptureSource::default());
        let registry = ChannelRegistry::new(source.clone());
        let dashboard = ProjectDashboard::open(&registry, FakeEndpoint::default(), "proj-1")
            .await
            .unwrap();
        assert_eq!(registry.subscriber_count("proj-1"), 3);
        assert_eq!(dashboard.agents().with(|r| r.len()), 1);

        let sink = lock(&source.sinks)[0].clone();
        sink.emit(ChannelEvent::AgentUpdate(AgentUpdate {
            project_id: "proj-1".to_string(),
            agent_id: "agent-1".to_string(),
            name: "Dependency Analyzer".to_string(),
            status: AgentState::Running,
            percent: 20,
            message: None,
            timestamp: Utc::now(),
        }));
        let snap = dashboard.snapshot(LevelFilter::All);
        assert_eq!(snap.agents.len(), 2);
        assert_eq!(snap.status, ProjectStatus::Processing);

        dashboard.close();
        assert!(!registry.is_live("proj-1"));
    }

    #[tokio::test]
    async fn test_run_agent_is_visible_before_request_completes() {
        let registry = ChannelRegistry::with_source(CaptureSource::default());
        let (release, gate) = oneshot::channel();
        let endpoint = FakeEndpoint {
            run_gate: Mutex::new(Some(gate)),
            ..Default::default()
        };
        let dashboard = ProjectDashboard::open(&registry, endpoint, "proj-1")
            .await
            .unwrap();

        let run = dashboard.run_agent("agent-0");
        let observe = async {
            tokio::task::yield_now().await;
            let agent = dashboard.agents().with(|r| r.get("agent-0").cloned()).unwrap();
            assert_eq!(agent.status, AgentState::Running);
            assert_eq!(agent.percent, 0);
            assert!(lock(&dashboard.endpoint.runs).is_empty());
            let _ = release.send(());
        };
        let (result, ()) = tokio::join!(run, observe);
        result.unwrap();
        assert_eq!(*lock(&dashboard.endpoint.runs), vec!["agent-0".to_string()]);
    }

    #[tokio::test]
    async fn test_run_agent_transport_error_surfaces_once() {
        let registry = ChannelRegistry::with_source(CaptureSource::default());
        let endpoint = FakeEndpoint {
            run_error: Some((500, "API Error: 500 Internal Server Error".to_string())),
            ..Default::default()
        };
        let dashboard = ProjectDashboard::open(&registry, endpoint, "proj-1")
            .await
            .unwrap();
        let err = dashboard.run_agent("agent-0").await.unwrap_err();
        assert_eq!(err.to_string(), "API Error: 500 Internal Server Error");
        assert_eq!(lock(&dashboard.endpoint.runs).len(), 1);
    }

    #[tokio::test]
    async fn test_run_rejected_locally_sends_nothing() {
        let registry = ChannelRegistry::with_source(CaptureSource::default());
        let dashboard = ProjectDashboard::open(&registry, FakeEndpoint::default(), "proj-1")
            .await
            .unwrap();
        assert!(dashboard.cancel_agent("agent-0").is_err());
        assert!(matches!(
            dashboard.run_agent("agent-9").await,
            Err(Error::NotFound(_))
        ));
        assert!(lock(&dashboard.endpoint.runs).is_empty());
    }

    #[tokio::test]
    async fn test_patch_review_shows_loading_then_applied() {
        let registry = ChannelRegistry::with_source(CaptureSource::default());
        let (respond, gate) = oneshot::channel();
        let endpoint = FakeEndpoint {
            patch_gate: Mutex::new(Some(gate)),
            ..Default::default()
        };
        let dashboard = ProjectDashboard::open(&registry, endpoint, "proj-1")
            .await
            .unwrap();
        let patch = patch();

        let apply = dashboard.apply_patch(&patch, Some("reviewer".to_string()));
        let observe = async {
            tokio::task::yield_now().await;
            assert!(dashboard.patch_state().is_loading());
            let _ = respond.send(Ok(ApplyPatchResponse {
                success: true,
                backup_path: Some("src/app/main.ts.orig".to_string()),
            }));
        };
        let (result, ()) = tokio::join!(apply, observe);
        assert!(result.unwrap().success);
        assert_eq!(
            dashboard.patch_state(),
            PatchReview::Applied {
                file_path: "src/app/main.ts".to_string(),
                backup_path: Some("src/app/main.ts.orig".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_patch_failure_message_is_verbatim() {
        let registry = ChannelRegistry::with_source(CaptureSource::default());
        let (respond, gate) = oneshot::channel();
        let endpoint = FakeEndpoint {
            patch_gate: Mutex::new(Some(gate)),
            ..Default::default()
        };
        let dashboard = ProjectDashboard::open(&registry, endpoint, "proj-1")
            .await
            .unwrap();
        let _ = respond.send(Err(Error::Transport {
            status: 409,
            message: "API Error: 409 Conflict".to_string(),
        }));
        assert!(dashboard.apply_patch(&patch(), None).await.is_err());
        assert_eq!(
            dashboard.patch_state(),
            PatchReview::Failed {
                file_path: "src/app/main.ts".to_string(),
                message: "API Error: 409 Conflict".to_string(),
            }
        );
    }

    #[test]
    fn test_settled_review_states() {
        let path = || "src/app/main.ts".to_string();
        assert_eq!(
            PatchReview::settled(
                path(),
                &Ok(ApplyPatchResponse {
                    success: true,
                    backup_path: Some("src/app/main.ts.orig".to_string()),
                })
            ),
            PatchReview::Applied {
                file_path: path(),
                backup_path: Some("src/app/main.ts.orig".to_string()),
            }
        );
        assert_eq!(
            PatchReview::settled(
                path(),
                &Ok(ApplyPatchResponse {
                    success: false,
                    backup_path: None,
                })
            ),
            PatchReview::Failed {
                file_path: path(),
                message: "Patch was not applied".to_string(),
            }
        );
    }
}
