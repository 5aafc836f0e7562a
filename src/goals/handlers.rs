use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use log::info;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use super::connections::{ConnectionRequest, ConnectionResult, ConnectionType, LinkOwner};
use super::progress::key_result_progress;
use super::{
    AlignmentNode, CheckIn, CreateCheckInRequest, CreateKeyResultRequest, CreateObjectiveRequest,
    GoalsDashboard, GoalsError, GoalsResult, KeyResult, KeyResultView, ListObjectivesQuery,
    Objective, ObjectiveDetail, ObjectiveStatus, ProgressSource, UpdateKeyResultRequest,
    UpdateObjectiveRequest,
};
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;

async fn require_objective(state: &AppState, objective_id: Uuid) -> GoalsResult<Objective> {
    state
        .store
        .get_objective(objective_id)
        .await?
        .ok_or_else(|| GoalsError::NotFound("Objective not found".to_string()))
}

async fn require_key_result(state: &AppState, key_result_id: Uuid) -> GoalsResult<KeyResult> {
    state
        .store
        .get_key_result(key_result_id)
        .await?
        .ok_or_else(|| GoalsError::NotFound("Key result not found".to_string()))
}

fn require_name(name: &str, what: &str) -> GoalsResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GoalsError::Validation(format!("{what} name is required")));
    }
    Ok(name.to_string())
}

fn require_finite(value: f64, field: &str) -> GoalsResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(GoalsError::Validation(format!("{field} must be a finite number")))
    }
}

/// Rejects a parent that is missing, the objective itself, or one of its descendants.
async fn validate_parent(
    state: &AppState,
    objective_id: Option<Uuid>,
    parent_id: Uuid,
) -> GoalsResult<()> {
    if objective_id == Some(parent_id) {
        return Err(GoalsError::Validation(
            "An objective cannot be its own parent".to_string(),
        ));
    }
    let parent = state
        .store
        .get_objective(parent_id)
        .await?
        .ok_or_else(|| GoalsError::NotFound("Parent objective not found".to_string()))?;

    let Some(objective_id) = objective_id else {
        return Ok(());
    };
    let mut seen = HashSet::from([parent.id]);
    let mut cursor = parent.parent_id;
    while let Some(ancestor_id) = cursor {
        if ancestor_id == objective_id {
            return Err(GoalsError::Validation(
                "Parent change would create a cycle".to_string(),
            ));
        }
        if !seen.insert(ancestor_id) {
            break;
        }
        cursor = state
            .store
            .get_objective(ancestor_id)
            .await?
            .and_then(|o| o.parent_id);
    }
    Ok(())
}

pub fn build_dashboard(objectives: &[Objective]) -> GoalsDashboard {
    let total = objectives.len();
    let achieved = objectives
        .iter()
        .filter(|o| o.status == ObjectiveStatus::Achieved)
        .count();
    let at_risk = objectives
        .iter()
        .filter(|o| o.status == ObjectiveStatus::AtRisk)
        .count();
    let average_progress = if total == 0 {
        0.0
    } else {
        objectives.iter().map(|o| f32::from(o.progress)).sum::<f32>() / total as f32
    };

    GoalsDashboard {
        total_objectives: total,
        achieved_objectives: achieved,
        at_risk_objectives: at_risk,
        average_progress,
    }
}

/// Arranges objectives into a forest. An objective whose parent is not in
/// the input is treated as a root.
pub fn build_alignment(
    objectives: Vec<Objective>,
    mut key_results: HashMap<Uuid, Vec<KeyResult>>,
) -> Vec<AlignmentNode> {
    let ids: HashSet<Uuid> = objectives.iter().map(|o| o.id).collect();
    let mut roots = Vec::new();
    let mut children: HashMap<Uuid, Vec<Objective>> = HashMap::new();
    for objective in objectives {
        match objective.parent_id {
            Some(parent_id) if ids.contains(&parent_id) => {
                children.entry(parent_id).or_default().push(objective)
            }
            _ => roots.push(objective),
        }
    }

    fn attach(
        objective: Objective,
        children: &mut HashMap<Uuid, Vec<Objective>>,
        key_results: &mut HashMap<Uuid, Vec<KeyResult>>,
    ) -> AlignmentNode {
        let nested = children.remove(&objective.id).unwrap_or_default();
        AlignmentNode {
            key_results: key_results.remove(&objective.id).unwrap_or_default(),
            children: nested
                .into_iter()
                .map(|child| attach(child, children, key_results))
                .collect(),
            objective,
        }
    }

    roots.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    roots
        .into_iter()
        .map(|root| attach(root, &mut children, &mut key_results))
        .collect()
}

pub async fn list_objectives(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListObjectivesQuery>,
) -> Result<Json<Vec<Objective>>, GoalsError> {
    Ok(Json(state.store.list_objectives(&query).await?))
}

pub async fn create_objective(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateObjectiveRequest>,
) -> Result<Json<Objective>, GoalsError> {
    let name = require_name(&req.name, "Objective")?;
    if let Some(parent_id) = req.parent_id {
        validate_parent(&state, None, parent_id).await?;
    }

    let now = Utc::now();
    let objective = Objective {
        id: Uuid::new_v4(),
        owner_id: req.owner_id.unwrap_or_else(Uuid::nil),
        parent_id: req.parent_id,
        team_id: req.team_id,
        name,
        description: req.description,
        status: req.status.unwrap_or(ObjectiveStatus::OnTrack),
        progress: 0,
        progress_source: req.progress_source.unwrap_or(ProgressSource::KeyResults),
        period: req.period,
        start_date: req.start_date,
        end_date: req.end_date,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_objective(&objective).await?;
    info!("Created objective: {} ({})", objective.name, objective.id);

    state.progress.recalculate_parent(objective.parent_id).await?;
    Ok(Json(objective))
}

pub async fn get_objective(
    State(state): State<Arc<AppState>>,
    Path(objective_id): Path<Uuid>,
) -> Result<Json<ObjectiveDetail>, GoalsError> {
    let mut objective = require_objective(&state, objective_id).await?;
    objective.progress = state.progress.display_progress(&objective).await?;

    let key_results = state
        .store
        .key_results_for(objective_id)
        .await?
        .into_iter()
        .map(|kr| KeyResultView {
            progress: key_result_progress(&kr),
            key_result: kr,
        })
        .collect();
    let children = state.store.child_objectives(objective_id).await?;
    let owner = LinkOwner::Objective(objective_id);
    let linked_projects = state.store.linked_project_ids(owner).await?;
    let linked_tasks = state.store.linked_task_ids(owner).await?;

    Ok(Json(ObjectiveDetail {
        objective,
        key_results,
        children,
        linked_projects,
        linked_tasks,
    }))
}

pub async fn update_objective(
    State(state): State<Arc<AppState>>,
    Path(objective_id): Path<Uuid>,
    Json(req): Json<UpdateObjectiveRequest>,
) -> Result<Json<Objective>, GoalsError> {
    let mut objective = require_objective(&state, objective_id).await?;
    let old_parent = objective.parent_id;
    let old_progress = objective.progress;

    if let Some(name) = req.name {
        objective.name = require_name(&name, "Objective")?;
    }
    if let Some(description) = req.description {
        objective.description = Some(description);
    }
    if let Some(parent_id) = req.parent_id {
        validate_parent(&state, Some(objective_id), parent_id).await?;
        objective.parent_id = Some(parent_id);
    } else if req.clear_parent {
        objective.parent_id = None;
    }
    if let Some(team_id) = req.team_id {
        objective.team_id = Some(team_id);
    }
    if let Some(status) = req.status {
        objective.status = status;
    }
    if let Some(progress) = req.progress {
        if !(0..=100).contains(&progress) {
            return Err(GoalsError::Validation(
                "Progress must be between 0 and 100".to_string(),
            ));
        }
        objective.progress = progress as u8;
    }
    if let Some(source) = req.progress_source {
        objective.progress_source = source;
    }
    if let Some(period) = req.period {
        objective.period = period;
    }
    if let Some(start_date) = req.start_date {
        objective.start_date = Some(start_date);
    }
    if let Some(end_date) = req.end_date {
        objective.end_date = Some(end_date);
    }
    objective.updated_at = Utc::now();

    state.store.update_objective(&objective).await?;
    if objective.progress_source != ProgressSource::Manual {
        state.progress.recalculate_progress(objective_id).await?;
    }
    let updated = require_objective(&state, objective_id).await?;

    if updated.parent_id != old_parent {
        state.progress.recalculate_parent(old_parent).await?;
        state.progress.recalculate_parent(updated.parent_id).await?;
    } else if updated.progress != old_progress {
        state.progress.recalculate_parent(updated.parent_id).await?;
    }

    info!("Updated objective: {} ({})", updated.name, updated.id);
    Ok(Json(updated))
}

pub async fn delete_objective(
    State(state): State<Arc<AppState>>,
    Path(objective_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, GoalsError> {
    let objective = require_objective(&state, objective_id).await?;
    if !state.store.delete_objective(objective_id).await? {
        return Err(GoalsError::NotFound("Objective not found".to_string()));
    }
    info!("Deleted objective: {objective_id}");

    state.progress.recalculate_parent(objective.parent_id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn recalculate_objective(
    State(state): State<Arc<AppState>>,
    Path(objective_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, GoalsError> {
    let progress = state.progress.recalculate_with_parent(objective_id).await?;
    Ok(Json(serde_json::json!({
        "objective_id": objective_id,
        "progress": progress,
    })))
}

pub async fn list_key_results(
    State(state): State<Arc<AppState>>,
    Path(objective_id): Path<Uuid>,
) -> Result<Json<Vec<KeyResultView>>, GoalsError> {
    require_objective(&state, objective_id).await?;
    let views = state
        .store
        .key_results_for(objective_id)
        .await?
        .into_iter()
        .map(|kr| KeyResultView {
            progress: key_result_progress(&kr),
            key_result: kr,
        })
        .collect();
    Ok(Json(views))
}

pub async fn create_key_result(
    State(state): State<Arc<AppState>>,
    Path(objective_id): Path<Uuid>,
    Json(req): Json<CreateKeyResultRequest>,
) -> Result<Json<KeyResultView>, GoalsError> {
    require_objective(&state, objective_id).await?;
    let name = require_name(&req.name, "Key result")?;
    let start_value = require_finite(req.start_value.unwrap_or(0.0), "start_value")?;
    let target_value = require_finite(req.target_value, "target_value")?;
    let current_value = require_finite(req.current_value.unwrap_or(start_value), "current_value")?;

    let now = Utc::now();
    let key_result = KeyResult {
        id: Uuid::new_v4(),
        objective_id,
        name,
        description: req.description,
        start_value,
        target_value,
        current_value,
        unit: req.unit,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_key_result(&key_result).await?;
    info!("Created key result: {} ({})", key_result.name, key_result.id);

    state.progress.recalculate_with_parent(objective_id).await?;
    Ok(Json(KeyResultView {
        progress: key_result_progress(&key_result),
        key_result,
    }))
}

pub async fn update_key_result(
    State(state): State<Arc<AppState>>,
    Path(key_result_id): Path<Uuid>,
    Json(req): Json<UpdateKeyResultRequest>,
) -> Result<Json<KeyResultView>, GoalsError> {
    let mut key_result = require_key_result(&state, key_result_id).await?;

    if let Some(name) = req.name {
        key_result.name = require_name(&name, "Key result")?;
    }
    if let Some(description) = req.description {
        key_result.description = Some(description);
    }
    if let Some(start_value) = req.start_value {
        key_result.start_value = require_finite(start_value, "start_value")?;
    }
    if let Some(target_value) = req.target_value {
        key_result.target_value = require_finite(target_value, "target_value")?;
    }
    if let Some(current_value) = req.current_value {
        key_result.current_value = require_finite(current_value, "current_value")?;
    }
    if let Some(unit) = req.unit {
        key_result.unit = Some(unit);
    }
    key_result.updated_at = Utc::now();

    state.store.update_key_result(&key_result).await?;
    state
        .progress
        .recalculate_with_parent(key_result.objective_id)
        .await?;

    Ok(Json(KeyResultView {
        progress: key_result_progress(&key_result),
        key_result,
    }))
}

pub async fn delete_key_result(
    State(state): State<Arc<AppState>>,
    Path(key_result_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, GoalsError> {
    let key_result = require_key_result(&state, key_result_id).await?;
    if !state.store.delete_key_result(key_result_id).await? {
        return Err(GoalsError::NotFound("Key result not found".to_string()));
    }
    info!("Deleted key result: {key_result_id}");

    state
        .progress
        .recalculate_with_parent(key_result.objective_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn create_check_in(
    State(state): State<Arc<AppState>>,
    Path(key_result_id): Path<Uuid>,
    Json(req): Json<CreateCheckInRequest>,
) -> Result<Json<CheckIn>, GoalsError> {
    let key_result = require_key_result(&state, key_result_id).await?;
    let check_in = CheckIn {
        id: Uuid::new_v4(),
        key_result_id,
        user_id: req.user_id.unwrap_or_else(Uuid::nil),
        previous_value: Some(key_result.current_value),
        new_value: require_finite(req.new_value, "new_value")?,
        note: req.note,
        created_at: Utc::now(),
    };
    state.store.record_check_in(&check_in).await?;
    info!("Created check-in for key result: {key_result_id}");

    state
        .progress
        .recalculate_with_parent(key_result.objective_id)
        .await?;
    Ok(Json(check_in))
}

pub async fn get_check_in_history(
    State(state): State<Arc<AppState>>,
    Path(key_result_id): Path<Uuid>,
) -> Result<Json<Vec<CheckIn>>, GoalsError> {
    require_key_result(&state, key_result_id).await?;
    Ok(Json(state.store.check_ins_for(key_result_id).await?))
}

fn parse_connection(req: &ConnectionRequest) -> GoalsResult<super::LinkTarget> {
    Ok(ConnectionType::parse(&req.connection_type)?.target(req.target_id))
}

pub async fn connect_objective(
    State(state): State<Arc<AppState>>,
    Path(objective_id): Path<Uuid>,
    Json(req): Json<ConnectionRequest>,
) -> Result<Json<ConnectionResult>, GoalsError> {
    let target = parse_connection(&req)?;
    let result = state
        .connections
        .connect(LinkOwner::Objective(objective_id), target)
        .await?;
    Ok(Json(result))
}

pub async fn disconnect_objective(
    State(state): State<Arc<AppState>>,
    Path(objective_id): Path<Uuid>,
    Json(req): Json<ConnectionRequest>,
) -> Result<Json<ConnectionResult>, GoalsError> {
    let target = parse_connection(&req)?;
    let result = state
        .connections
        .disconnect(LinkOwner::Objective(objective_id), target)
        .await?;
    Ok(Json(result))
}

pub async fn connect_key_result(
    State(state): State<Arc<AppState>>,
    Path(key_result_id): Path<Uuid>,
    Json(req): Json<ConnectionRequest>,
) -> Result<Json<ConnectionResult>, GoalsError> {
    let target = parse_connection(&req)?;
    let result = state
        .connections
        .connect(LinkOwner::KeyResult(key_result_id), target)
        .await?;
    Ok(Json(result))
}

pub async fn disconnect_key_result(
    State(state): State<Arc<AppState>>,
    Path(key_result_id): Path<Uuid>,
    Json(req): Json<ConnectionRequest>,
) -> Result<Json<ConnectionResult>, GoalsError> {
    let target = parse_connection(&req)?;
    let result = state
        .connections
        .disconnect(LinkOwner::KeyResult(key_result_id), target)
        .await?;
    Ok(Json(result))
}

pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<GoalsDashboard>, GoalsError> {
    let objectives = state
        .store
        .list_objectives(&ListObjectivesQuery::default())
        .await?;
    Ok(Json(build_dashboard(&objectives)))
}

pub async fn get_alignment(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AlignmentNode>>, GoalsError> {
    let objectives = state
        .store
        .list_objectives(&ListObjectivesQuery::default())
        .await?;
    let mut key_results = HashMap::new();
    for objective in &objectives {
        key_results.insert(objective.id, state.store.key_results_for(objective.id).await?);
    }
    Ok(Json(build_alignment(objectives, key_results)))
}

pub fn configure_goals_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::OBJECTIVES, get(list_objectives).post(create_objective))
        .route(
            ApiUrls::OBJECTIVE_BY_ID,
            get(get_objective).put(update_objective).delete(delete_objective),
        )
        .route(ApiUrls::OBJECTIVE_RECALCULATE, post(recalculate_objective))
        .route(ApiUrls::OBJECTIVE_KEY_RESULTS, get(list_key_results).post(create_key_result))
        .route(
            ApiUrls::OBJECTIVE_CONNECTIONS,
            post(connect_objective).delete(disconnect_objective),
        )
        .route(ApiUrls::KEY_RESULT_BY_ID, put(update_key_result).delete(delete_key_result))
        .route(ApiUrls::KEY_RESULT_CHECK_IN, post(create_check_in))
        .route(ApiUrls::KEY_RESULT_HISTORY, get(get_check_in_history))
        .route(
            ApiUrls::KEY_RESULT_CONNECTIONS,
            post(connect_key_result).delete(disconnect_key_result),
        )
        .route(ApiUrls::GOALS_DASHBOARD, get(get_dashboard))
        .route(ApiUrls::GOALS_ALIGNMENT, get(get_alignment))
}
