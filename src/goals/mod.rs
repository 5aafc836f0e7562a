use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod connections;
pub mod handlers;
pub mod pg_store;
pub mod progress;
pub mod service;
pub mod store;

pub use connections::{ConnectionService, ConnectionType, LinkOwner, LinkTarget};
pub use handlers::configure_goals_routes;
pub use progress::{
    compute_progress, display_progress, ProgressSnapshot, ReadPathPolicy, TaskCounts,
};
pub use service::GoalProgressService;
pub use store::{GoalStore, InMemoryGoalStore};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Objective {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub status: ObjectiveStatus,
    pub progress: u8,
    pub progress_source: ProgressSource,
    pub period: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectiveStatus {
    OnTrack,
    AtRisk,
    OffTrack,
    Achieved,
    Partial,
    Missed,
    Dropped,
}

impl ObjectiveStatus {
    pub fn from_str(s: &str) -> Self {
        match s {
            "AT_RISK" => Self::AtRisk,
            "OFF_TRACK" => Self::OffTrack,
            "ACHIEVED" => Self::Achieved,
            "PARTIAL" => Self::Partial,
            "MISSED" => Self::Missed,
            "DROPPED" => Self::Dropped,
            _ => Self::OnTrack,
        }
    }

    pub fn to_str(self) -> &'static str {
        match self {
            Self::OnTrack => "ON_TRACK",
            Self::AtRisk => "AT_RISK",
            Self::OffTrack => "OFF_TRACK",
            Self::Achieved => "ACHIEVED",
            Self::Partial => "PARTIAL",
            Self::Missed => "MISSED",
            Self::Dropped => "DROPPED",
        }
    }
}

/// Where an objective's `progress` comes from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressSource {
    Manual,
    KeyResults,
    SubObjectives,
    Projects,
}

impl ProgressSource {
    pub fn from_str(s: &str) -> Self {
        match s {
            "MANUAL" => Self::Manual,
            "SUB_OBJECTIVES" => Self::SubObjectives,
            "PROJECTS" => Self::Projects,
            _ => Self::KeyResults,
        }
    }

    pub fn to_str(self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::KeyResults => "KEY_RESULTS",
            Self::SubObjectives => "SUB_OBJECTIVES",
            Self::Projects => "PROJECTS",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyResult {
    pub id: Uuid,
    pub objective_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub start_value: f64,
    pub target_value: f64,
    pub current_value: f64,
    pub unit: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckIn {
    pub id: Uuid,
    pub key_result_id: Uuid,
    pub user_id: Uuid,
    pub previous_value: Option<f64>,
    pub new_value: f64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyResultView {
    #[serde(flatten)]
    pub key_result: KeyResult,
    pub progress: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectiveDetail {
    #[serde(flatten)]
    pub objective: Objective,
    pub key_results: Vec<KeyResultView>,
    pub children: Vec<Objective>,
    pub linked_projects: Vec<Uuid>,
    pub linked_tasks: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentNode {
    pub objective: Objective,
    pub key_results: Vec<KeyResult>,
    pub children: Vec<AlignmentNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalsDashboard {
    pub total_objectives: usize,
    pub achieved_objectives: usize,
    pub at_risk_objectives: usize,
    pub average_progress: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListObjectivesQuery {
    pub owner_id: Option<Uuid>,
    pub status: Option<ObjectiveStatus>,
    pub period: Option<String>,
    pub parent_id: Option<Uuid>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListObjectivesQuery {
    pub fn matches(&self, objective: &Objective) -> bool {
        self.owner_id.map_or(true, |id| objective.owner_id == id)
            && self.status.map_or(true, |s| objective.status == s)
            && self.period.as_deref().map_or(true, |p| objective.period == p)
            && self.parent_id.map_or(true, |id| objective.parent_id == Some(id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateObjectiveRequest {
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub status: Option<ObjectiveStatus>,
    pub progress_source: Option<ProgressSource>,
    pub period: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateObjectiveRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    /// Detach from the current parent; ignored when `parent_id` is set.
    #[serde(default)]
    pub clear_parent: bool,
    pub team_id: Option<Uuid>,
    pub status: Option<ObjectiveStatus>,
    pub progress: Option<i32>,
    pub progress_source: Option<ProgressSource>,
    pub period: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateKeyResultRequest {
    pub name: String,
    pub description: Option<String>,
    pub start_value: Option<f64>,
    pub target_value: f64,
    pub current_value: Option<f64>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateKeyResultRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_value: Option<f64>,
    pub target_value: Option<f64>,
    pub current_value: Option<f64>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCheckInRequest {
    pub new_value: f64,
    pub user_id: Option<Uuid>,
    pub note: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GoalsError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(String),
}

impl From<diesel::result::Error> for GoalsError {
    fn from(e: diesel::result::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<diesel::r2d2::PoolError> for GoalsError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        Self::Database(e.to_string())
    }
}

impl IntoResponse for GoalsError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::Database(msg) => {
                log::error!("Goals database error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub type GoalsResult<T> = Result<T, GoalsError>;
