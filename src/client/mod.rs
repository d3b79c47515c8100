//! HTTP client for the Lodestar backend.
//!
//! Wraps every REST endpoint the dashboard consumes. Non-success responses become
//! [`Error::Transport`] carrying `"API Error: <status> <reason>"` (or
//! `"Upload failed: <status>"` for uploads); nothing is retried.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::dashboard::CommandEndpoint;
use crate::models::{
    ApplyPatchRequest, ApplyPatchResponse, KnowledgeGraph, Project, ProjectSummary, UploadResponse,
};
use crate::{Error, Result};

/// Client for one backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

fn api_error(status: StatusCode) -> Error {
    Error::Transport {
        status: status.as_u16(),
        message: format!(
            "API Error: {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
        .trim_end()
        .to_string(),
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        debug!(status = status.as_u16(), url = %response.url(), "request failed");
        Err(api_error(status))
    }
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = check(self.http.get(self.url(path)).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Upload a codebase archive. `name` defaults to the file name on the server.
    pub async fn upload(&self, archive: &Path, name: Option<&str>) -> Result<UploadResponse> {
        let bytes = tokio::fs::read(archive).await?;
        let file_name = archive
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("archive.zip")
            .to_string();
        let mut form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));
        if let Some(name) = name {
            form = form.text("name", name.to_string());
        }

        let response = self
            .http
            .post(self.url("/projects"))
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport {
                status: status.as_u16(),
                message: format!("Upload failed: {}", status.as_u16()),
            });
        }
        Ok(response.json().await?)
    }

    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        self.get_json("/projects").await
    }

    /// Fetch one project; 404 maps to [`Error::ProjectNotFound`].
    pub async fn project(&self, project_id: &str) -> Result<Project> {
        match self.get_json(&format!("/projects/{}", project_id)).await {
            Err(Error::Transport { status: 404, .. }) => {
                Err(Error::ProjectNotFound(project_id.to_string()))
            }
            other => other,
        }
    }

    pub async fn knowledge_graph(&self, project_id: &str) -> Result<KnowledgeGraph> {
        self.get_json(&format!("/projects/{}/knowledge-graph", project_id))
            .await
    }

    /// Raw text of one file in the project.
    pub async fn file(&self, project_id: &str, path: &str) -> Result<String> {
        let response = self
            .http
            .get(self.url(&format!("/projects/{}/files", project_id)))
            .query(&[("path", path)])
            .send()
            .await?;
        Ok(check(response).await?.text().await?)
    }

    pub async fn run_agent(&self, project_id: &str, agent_id: &str) -> Result<()> {
        let response = self
            .http
            .post(self.url(&format!("/projects/{}/agents/{}/run", project_id, agent_id)))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    pub async fn apply_patch(
        &self,
        project_id: &str,
        request: &ApplyPatchRequest,
    ) -> Result<ApplyPatchResponse> {
        let response = self
            .http
            .post(self.url(&format!("/projects/{}/applyPatch", project_id)))
            .json(request)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

impl CommandEndpoint for ApiClient {
    async fn get_project(&self, project_id: &str) -> Result<Project> {
        self.project(project_id).await
    }

    async fn run_agent(&self, project_id: &str, agent_id: &str) -> Result<()> {
        ApiClient::run_agent(self, project_id, agent_id).await
    }

    async fn apply_patch(
        &self,
        project_id: &str,
        request: &ApplyPatchRequest,
    ) -> Result<ApplyPatchResponse> {
        ApiClient::apply_patch(self, project_id, request).await
    }
}
