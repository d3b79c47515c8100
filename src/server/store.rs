//! In-memory project store backing the REST endpoints.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{ApplyPatchRequest, ApplyPatchResponse, UploadResponse};
use crate::{Error, Result};

/// Suffix appended to a file's path to keep its pre-patch content.
pub const BACKUP_SUFFIX: &str = ".orig";

/// One uploaded project.
#[derive(Debug, Clone)]
pub struct StoredProject {
    pub id: String,
    pub task_id: String,
    pub name: String,
    pub uploaded_at: DateTime<Utc>,
    pub archive_size: usize,
    files: HashMap<String, String>,
}

impl StoredProject {
    pub fn file(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(|s| s.as_str())
    }

    /// Known file paths, sorted.
    pub fn file_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.files.keys().map(|s| s.as_str()).collect();
        paths.sort();
        paths
    }
}

/// Projects in upload order.
#[derive(Debug, Default)]
pub struct ProjectStore {
    projects: Vec<StoredProject>,
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new upload.
    pub fn create(&mut self, name: &str, archive_size: usize) -> UploadResponse {
        let suffix = Uuid::new_v4().simple().to_string();
        let suffix = &suffix[..12];
        let project = StoredProject {
            id: format!("proj-{}", suffix),
            task_id: format!("task-{}", suffix),
            name: name.to_string(),
            uploaded_at: Utc::now(),
            archive_size,
            files: HashMap::new(),
        };
        let response = UploadResponse {
            project_id: project.id.clone(),
            task_id: project.task_id.clone(),
            uploaded_at: project.uploaded_at,
        };
        self.projects.push(project);
        response
    }

    pub fn get(&self, project_id: &str) -> Option<&StoredProject> {
        self.projects.iter().find(|p| p.id == project_id)
    }

    fn get_mut(&mut self, project_id: &str) -> Result<&mut StoredProject> {
        self.projects
            .iter_mut()
            .find(|p| p.id == project_id)
            .ok_or_else(|| Error::ProjectNotFound(project_id.to_string()))
    }

    pub fn list(&self) -> &[StoredProject] {
        &self.projects
    }

    pub fn read_file(&self, project_id: &str, path: &str) -> Result<String> {
        let project = self
            .get(project_id)
            .ok_or_else(|| Error::ProjectNotFound(project_id.to_string()))?;
        project
            .file(path)
            .map(|s| s.to_string())
            .ok_or_else(|| Error::NotFound(format!("file {}", path)))
    }

    /// Store the patched content, keeping any previous content at `<path>.orig`.
    pub fn apply_patch(
        &mut self,
        project_id: &str,
        request: &ApplyPatchRequest,
    ) -> Result<ApplyPatchResponse> {
        let path = request.file_path.trim();
        if path.is_empty() {
            return Err(Error::InvalidInput("filePath must not be empty".to_string()));
        }
        if path.split('/').any(|segment| segment == "..") {
            return Err(Error::InvalidInput(format!(
                "filePath must stay inside the project: {}",
                path
            )));
        }

        let project = self.get_mut(project_id)?;
        let backup_path = match project.files.insert(path.to_string(), request.patch.clone()) {
            Some(previous) => {
                let backup = format!("{}{}", path, BACKUP_SUFFIX);
                project.files.insert(backup.clone(), previous);
                Some(backup)
            }
            None => None,
        };
        Ok(ApplyPatchResponse {
            success: true,
            backup_path,
        })
    }
}
