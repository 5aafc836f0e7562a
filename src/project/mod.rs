use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::goals::progress::{project_progress, TaskCounts};
use crate::goals::{GoalProgressService, GoalStore, GoalsError, GoalsResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A task inside a project. Tasks with a `parent_id` are subtasks and do not
/// count toward project progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectTask {
    pub id: Uuid,
    pub project_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub progress: u8,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub completed: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateTaskRequest {
    pub name: Option<String>,
    pub completed: Option<bool>,
}

/// Project and task writes. Any change to a project's tasks recalculates the
/// objectives linked directly to that project, plus the direct parent of any
/// whose progress moved.
#[derive(Clone)]
pub struct ProjectService {
    store: Arc<dyn GoalStore>,
    progress: GoalProgressService,
}

impl ProjectService {
    pub fn new(store: Arc<dyn GoalStore>, progress: GoalProgressService) -> Self {
        Self { store, progress }
    }

    async fn summarize(&self, project: Project) -> GoalsResult<ProjectSummary> {
        let tasks = self.store.tasks_for_project(project.id).await?;
        let counts = TaskCounts::from_tasks(&tasks);
        Ok(ProjectSummary {
            project,
            total_tasks: counts.total,
            completed_tasks: counts.completed,
            progress: project_progress(counts),
        })
    }

    async fn refresh_objectives(&self, objective_ids: Vec<Uuid>) -> GoalsResult<()> {
        for objective_id in objective_ids {
            match self.progress.recalculate_with_parent(objective_id).await {
                Ok(_) => {}
                Err(GoalsError::NotFound(_)) => {
                    warn!("Linked objective {objective_id} disappeared during refresh");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn refresh_project(&self, project_id: Uuid) -> GoalsResult<()> {
        let objective_ids = self.store.objectives_linked_to_project(project_id).await?;
        self.refresh_objectives(objective_ids).await
    }

    async fn require_project(&self, project_id: Uuid) -> GoalsResult<Project> {
        self.store
            .get_project(project_id)
            .await?
            .ok_or_else(|| GoalsError::NotFound("Project not found".to_string()))
    }

    async fn require_task(&self, task_id: Uuid) -> GoalsResult<ProjectTask> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| GoalsError::NotFound("Task not found".to_string()))
    }

    pub async fn list_projects(&self) -> GoalsResult<Vec<ProjectSummary>> {
        let mut summaries = Vec::new();
        for project in self.store.list_projects().await? {
            summaries.push(self.summarize(project).await?);
        }
        Ok(summaries)
    }

    pub async fn create_project(&self, req: CreateProjectRequest) -> GoalsResult<Project> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(GoalsError::Validation("Project name is required".to_string()));
        }
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            owner_id: req.owner_id.unwrap_or_else(Uuid::nil),
            name: name.to_string(),
            description: req.description,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_project(&project).await?;
        info!("Created project {} ({})", project.name, project.id);
        Ok(project)
    }

    pub async fn get_project(&self, project_id: Uuid) -> GoalsResult<ProjectSummary> {
        let project = self.require_project(project_id).await?;
        self.summarize(project).await
    }

    pub async fn delete_project(&self, project_id: Uuid) -> GoalsResult<()> {
        // links go with the project, so collect the affected objectives first
        let objective_ids = self.store.objectives_linked_to_project(project_id).await?;
        if !self.store.delete_project(project_id).await? {
            return Err(GoalsError::NotFound("Project not found".to_string()));
        }
        info!("Deleted project {project_id}");
        self.refresh_objectives(objective_ids).await
    }

    pub async fn list_tasks(&self, project_id: Uuid) -> GoalsResult<Vec<ProjectTask>> {
        self.require_project(project_id).await?;
        self.store.tasks_for_project(project_id).await
    }

    pub async fn create_task(
        &self,
        project_id: Uuid,
        req: CreateTaskRequest,
    ) -> GoalsResult<ProjectTask> {
        self.require_project(project_id).await?;
        let name = req.name.trim();
        if name.is_empty() {
            return Err(GoalsError::Validation("Task name is required".to_string()));
        }
        if let Some(parent_id) = req.parent_id {
            let parent = self.require_task(parent_id).await?;
            if parent.project_id != project_id {
                return Err(GoalsError::Validation(
                    "Parent task belongs to another project".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let task = ProjectTask {
            id: Uuid::new_v4(),
            project_id,
            parent_id: req.parent_id,
            name: name.to_string(),
            completed: req.completed.unwrap_or(false),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_task(&task).await?;
        self.refresh_project(project_id).await?;
        Ok(task)
    }

    pub async fn update_task(
        &self,
        task_id: Uuid,
        req: UpdateTaskRequest,
    ) -> GoalsResult<ProjectTask> {
        let mut task = self.require_task(task_id).await?;
        if let Some(name) = req.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(GoalsError::Validation("Task name is required".to_string()));
            }
            task.name = name.to_string();
        }
        if let Some(completed) = req.completed {
            task.completed = completed;
        }
        task.updated_at = Utc::now();

        self.store.update_task(&task).await?;
        self.refresh_project(task.project_id).await?;
        Ok(task)
    }

    pub async fn delete_task(&self, task_id: Uuid) -> GoalsResult<()> {
        let task = self.require_task(task_id).await?;
        if !self.store.delete_task(task_id).await? {
            return Err(GoalsError::NotFound("Task not found".to_string()));
        }
        self.refresh_project(task.project_id).await
    }
}

async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProjectSummary>>, GoalsError> {
    Ok(Json(state.projects.list_projects().await?))
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<Json<Project>, GoalsError> {
    Ok(Json(state.projects.create_project(req).await?))
}

async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectSummary>, GoalsError> {
    Ok(Json(state.projects.get_project(project_id).await?))
}

async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, GoalsError> {
    state.projects.delete_project(project_id).await?;
    Ok(Json(serde_json::json!({"success": true})))
}

async fn get_tasks(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<ProjectTask>>, GoalsError> {
    Ok(Json(state.projects.list_tasks(project_id).await?))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<ProjectTask>, GoalsError> {
    Ok(Json(state.projects.create_task(project_id, req).await?))
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<ProjectTask>, GoalsError> {
    Ok(Json(state.projects.update_task(task_id, req).await?))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, GoalsError> {
    state.projects.delete_task(task_id).await?;
    Ok(Json(serde_json::json!({"success": true})))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::PROJECTS, get(list_projects).post(create_project))
        .route(ApiUrls::PROJECT_BY_ID, get(get_project).delete(delete_project))
        .route(ApiUrls::PROJECT_TASKS, get(get_tasks).post(create_task))
        .route(ApiUrls::TASK_BY_ID, put(update_task).delete(delete_task))
}
