//! In-memory backend serving the dashboard's REST and push endpoints.
//!
//! Every uploaded project is tracked by its own agent and graph projections, which
//! are ordinary reducers subscribed to the project's channel. The simulated source
//! therefore keeps running for each project while the server is up.

mod store;
mod websocket;

pub use store::{BACKUP_SUFFIX, ProjectStore, StoredProject};

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path as AxumPath, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::ResolvedConfig;
use crate::live::registry::lock;
use crate::live::{ChannelRegistry, SimulatedSource, SourceCommand};
use crate::models::{
    AgentState, AgentStatus, ApplyPatchRequest, ApplyPatchResponse, KnowledgeGraph,
    MAX_UPLOAD_BYTES, Project, ProjectSummary, UploadResponse, is_zip_archive,
};
use crate::reducers::{AgentsReducer, GraphReducer, LiveView};
use crate::{Error, Result};

/// Room for multipart framing and the `name` field on top of the archive itself
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

struct Projection {
    agents: LiveView<AgentsReducer>,
    graph: LiveView<GraphReducer>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Uploaded projects and their files
    pub store: Arc<Mutex<ProjectStore>>,
    /// Live channels, one per project with subscribers
    pub registry: ChannelRegistry,
    projections: Arc<StdMutex<HashMap<String, Projection>>>,
}

impl AppState {
    pub fn new(registry: ChannelRegistry) -> Self {
        Self {
            store: Arc::new(Mutex::new(ProjectStore::new())),
            registry,
            projections: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Start projecting a project's channel.
    fn track(&self, project_id: &str) -> Result<()> {
        let projection = Projection {
            agents: LiveView::attach(&self.registry, AgentsReducer::new(project_id))?,
            graph: LiveView::attach(&self.registry, GraphReducer::new(project_id))?,
        };
        lock(&self.projections).insert(project_id.to_string(), projection);
        Ok(())
    }

    fn agents_of(&self, project_id: &str) -> Vec<AgentStatus> {
        lock(&self.projections)
            .get(project_id)
            .map(|p| p.agents.with(|r| r.agents().to_vec()))
            .unwrap_or_default()
    }

    fn agent_state(&self, project_id: &str, agent_id: &str) -> Option<AgentState> {
        lock(&self.projections)
            .get(project_id)?
            .agents
            .with(|r| r.get(agent_id).map(|a| a.status))
    }

    fn graph_of(&self, project_id: &str) -> KnowledgeGraph {
        lock(&self.projections)
            .get(project_id)
            .map(|p| p.graph.with(|g| g.render_graph()))
            .unwrap_or_default()
    }

    fn project_view(&self, stored: &StoredProject) -> Project {
        let agents = self.agents_of(&stored.id);
        Project {
            id: stored.id.clone(),
            name: stored.name.clone(),
            uploaded_at: stored.uploaded_at,
            status: crate::models::ProjectStatus::derive(&agents),
            agents,
        }
    }
}

/// HTTP status for a library error.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::NotFound(_) | Error::ProjectNotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::InvalidTransition { .. } => StatusCode::CONFLICT,
        Error::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
        Error::RegistryClosed => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// All routes, ready to serve.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/projects", post(upload_project).get(list_projects))
        .route("/projects/:id", get(get_project))
        .route("/projects/:id/knowledge-graph", get(get_knowledge_graph))
        .route("/projects/:id/files", get(get_file))
        .route("/projects/:id/agents/:agent_id/run", post(run_agent))
        .route("/projects/:id/applyPatch", post(apply_patch))
        .route("/projects/:id/events", get(websocket::events_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on `listener` until `shutdown` resolves, then stop every channel.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let registry = state.registry.clone();
    let on_shutdown = async move {
        shutdown.await;
        info!("shutting down");
        registry.shutdown();
    };
    axum::serve(listener, router(state))
        .with_graceful_shutdown(on_shutdown)
        .await?;
    Ok(())
}

/// Bind per `config` and serve a simulated backend until Ctrl+C.
pub async fn run(config: &ResolvedConfig) -> Result<()> {
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    let registry = ChannelRegistry::with_source(SimulatedSource::new(config.simulation()));
    info!(addr = %addr, "lodestar backend listening");
    serve(listener, AppState::new(registry), async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn upload_project(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> std::result::Result<(StatusCode, Json<UploadResponse>), StatusCode> {
    let mut archive: Option<(String, usize)> = None;
    let mut name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let field_name = field.name().map(|s| s.to_string());
        match field_name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let named = file_name.as_deref().unwrap_or_default();
                if !is_zip_archive(named, field.content_type()) {
                    warn!(file_name = ?file_name, "rejecting upload that is not a zip archive");
                    return Err(StatusCode::BAD_REQUEST);
                }
                let file_name = file_name.unwrap_or_else(|| "archive.zip".to_string());
                let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                if bytes.len() > MAX_UPLOAD_BYTES {
                    warn!(file_name = %file_name, bytes = bytes.len(), "archive too large");
                    return Err(StatusCode::PAYLOAD_TOO_LARGE);
                }
                archive = Some((file_name, bytes.len()));
            }
            Some("name") => {
                let text = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                if !text.trim().is_empty() {
                    name = Some(text.trim().to_string());
                }
            }
            _ => {}
        }
    }

    let Some((file_name, size)) = archive else {
        warn!("upload without a file field");
        return Err(StatusCode::BAD_REQUEST);
    };
    let upload = state
        .store
        .lock()
        .await
        .create(name.as_deref().unwrap_or(&file_name), size);
    state
        .track(&upload.project_id)
        .map_err(|e| status_for(&e))?;
    info!(project_id = %upload.project_id, bytes = size, "project uploaded");
    Ok((StatusCode::CREATED, Json(upload)))
}

async fn list_projects(State(state): State<AppState>) -> Json<Vec<ProjectSummary>> {
    let store = state.store.lock().await;
    Json(
        store
            .list()
            .iter()
            .map(|p| state.project_view(p).summary())
            .collect(),
    )
}

async fn get_project(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> std::result::Result<Json<Project>, StatusCode> {
    let store = state.store.lock().await;
    let stored = store.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(state.project_view(stored)))
}

async fn get_knowledge_graph(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> std::result::Result<Json<KnowledgeGraph>, StatusCode> {
    if state.store.lock().await.get(&id).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(state.graph_of(&id)))
}

#[derive(Debug, Deserialize)]
struct FileQuery {
    path: Option<String>,
}

async fn get_file(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Query(query): Query<FileQuery>,
) -> std::result::Result<String, StatusCode> {
    let path = query
        .path
        .filter(|p| !p.is_empty())
        .ok_or(StatusCode::BAD_REQUEST)?;
    state
        .store
        .lock()
        .await
        .read_file(&id, &path)
        .map_err(|e| status_for(&e))
}

async fn run_agent(
    State(state): State<AppState>,
    AxumPath((id, agent_id)): AxumPath<(String, String)>,
) -> std::result::Result<StatusCode, StatusCode> {
    if state.store.lock().await.get(&id).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    let current = state
        .agent_state(&id, &agent_id)
        .ok_or(StatusCode::NOT_FOUND)?;
    if !current.can_transition_to(AgentState::Running) {
        return Err(StatusCode::CONFLICT);
    }
    state
        .registry
        .send_command(&id, SourceCommand::RunAgent {
            agent_id: agent_id.clone(),
        })
        .map_err(|e| {
            warn!(project_id = %id, agent_id = %agent_id, error = %e, "run command failed");
            status_for(&e)
        })?;
    info!(project_id = %id, agent_id = %agent_id, "agent run requested");
    Ok(StatusCode::ACCEPTED)
}

async fn apply_patch(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(request): Json<ApplyPatchRequest>,
) -> std::result::Result<Json<ApplyPatchResponse>, StatusCode> {
    let response = state
        .store
        .lock()
        .await
        .apply_patch(&id, &request)
        .map_err(|e| status_for(&e))?;
    info!(
        project_id = %id,
        file = %request.file_path,
        author = request.author.as_deref().unwrap_or("-"),
        "patch applied"
    );
    Ok(Json(response))
}
