use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::service::GoalProgressService;
use super::store::GoalStore;
use super::{GoalsError, GoalsResult};

/// The side of a link that owns progress: an objective or one of its key results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LinkOwner {
    Objective(Uuid),
    KeyResult(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LinkTarget {
    Project(Uuid),
    Task(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Project,
    Task,
}

impl ConnectionType {
    pub fn parse(s: &str) -> GoalsResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "project" => Ok(Self::Project),
            "task" => Ok(Self::Task),
            other => Err(GoalsError::Validation(format!(
                "unknown connection type '{other}', expected 'project' or 'task'"
            ))),
        }
    }

    pub fn target(self, id: Uuid) -> LinkTarget {
        match self {
            Self::Project => LinkTarget::Project(id),
            Self::Task => LinkTarget::Task(id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub connection_type: String,
    pub target_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionResult {
    pub owner: LinkOwner,
    pub target: LinkTarget,
    pub objective_id: Uuid,
    pub progress: u8,
}

/// Connect/disconnect projects and tasks to objectives or key results.
///
/// Every successful change is followed by one recalculation of the objective
/// that owns the link (the key result's objective for key-result links), and
/// of that objective's parent when its progress moved.
/// The link write and the recalculation are separate store calls; concurrent
/// changes to the same objective resolve last-write-wins on `progress`.
#[derive(Clone)]
pub struct ConnectionService {
    store: Arc<dyn GoalStore>,
    progress: GoalProgressService,
}

impl ConnectionService {
    pub fn new(store: Arc<dyn GoalStore>, progress: GoalProgressService) -> Self {
        Self { store, progress }
    }

    async fn owning_objective(&self, owner: LinkOwner) -> GoalsResult<Uuid> {
        match owner {
            LinkOwner::Objective(id) => self
                .store
                .get_objective(id)
                .await?
                .map(|o| o.id)
                .ok_or_else(|| GoalsError::NotFound("Objective not found".to_string())),
            LinkOwner::KeyResult(id) => self
                .store
                .get_key_result(id)
                .await?
                .map(|kr| kr.objective_id)
                .ok_or_else(|| GoalsError::NotFound("Key result not found".to_string())),
        }
    }

    async fn ensure_target_exists(&self, target: LinkTarget) -> GoalsResult<()> {
        let found = match target {
            LinkTarget::Project(id) => self.store.get_project(id).await?.is_some(),
            LinkTarget::Task(id) => self.store.get_task(id).await?.is_some(),
        };
        if found {
            Ok(())
        } else {
            let kind = match target {
                LinkTarget::Project(_) => "Project",
                LinkTarget::Task(_) => "Task",
            };
            Err(GoalsError::NotFound(format!("{kind} not found")))
        }
    }

    pub async fn connect(
        &self,
        owner: LinkOwner,
        target: LinkTarget,
    ) -> GoalsResult<ConnectionResult> {
        let objective_id = self.owning_objective(owner).await?;
        self.ensure_target_exists(target).await?;

        if !self.store.insert_link(owner, target).await? {
            return Err(GoalsError::Conflict("Connection already exists".to_string()));
        }
        info!("Connected {target:?} to {owner:?}");

        let progress = self.progress.recalculate_with_parent(objective_id).await?;
        Ok(ConnectionResult {
            owner,
            target,
            objective_id,
            progress,
        })
    }

    pub async fn disconnect(
        &self,
        owner: LinkOwner,
        target: LinkTarget,
    ) -> GoalsResult<ConnectionResult> {
        let objective_id = self.owning_objective(owner).await?;

        if !self.store.delete_link(owner, target).await? {
            return Err(GoalsError::NotFound("Connection not found".to_string()));
        }
        info!("Disconnected {target:?} from {owner:?}");

        let progress = self.progress.recalculate_with_parent(objective_id).await?;
        Ok(ConnectionResult {
            owner,
            target,
            objective_id,
            progress,
        })
    }
}
