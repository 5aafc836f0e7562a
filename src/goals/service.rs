use log::debug;
use std::sync::Arc;
use uuid::Uuid;

use super::connections::LinkOwner;
use super::progress::{
    compute_progress, display_progress, ProgressSnapshot, ReadPathPolicy, TaskCounts,
};
use super::store::GoalStore;
use super::{GoalsError, GoalsResult, Objective, ProgressSource};

/// Write-path entry point for objective progress.
///
/// `recalculate_progress` loads one objective plus the collection its
/// `progress_source` needs, applies the rollup rule and writes `progress`
/// once. It never touches children and never walks up to ancestors: callers
/// that change a child's progress recalculate the parent themselves.
#[derive(Clone)]
pub struct GoalProgressService {
    store: Arc<dyn GoalStore>,
    read_policy: ReadPathPolicy,
}

impl GoalProgressService {
    pub fn new(store: Arc<dyn GoalStore>, read_policy: ReadPathPolicy) -> Self {
        Self { store, read_policy }
    }

    pub fn read_policy(&self) -> ReadPathPolicy {
        self.read_policy
    }

    /// Fetches the related records the objective's source consults.
    pub async fn snapshot_for(&self, objective: &Objective) -> GoalsResult<ProgressSnapshot> {
        let mut snapshot = ProgressSnapshot::default();
        match objective.progress_source {
            ProgressSource::Manual => {}
            ProgressSource::KeyResults => {
                snapshot.key_results = self.store.key_results_for(objective.id).await?;
            }
            ProgressSource::SubObjectives => {
                snapshot.children = self.store.child_objectives(objective.id).await?;
            }
            ProgressSource::Projects => {
                let project_ids = self
                    .store
                    .linked_project_ids(LinkOwner::Objective(objective.id))
                    .await?;
                for project_id in project_ids {
                    let tasks = self.store.tasks_for_project(project_id).await?;
                    snapshot.projects.push(TaskCounts::from_tasks(&tasks));
                }
            }
        }
        Ok(snapshot)
    }

    pub async fn recalculate_progress(&self, objective_id: Uuid) -> GoalsResult<u8> {
        let objective = self
            .store
            .get_objective(objective_id)
            .await?
            .ok_or_else(|| GoalsError::NotFound("Objective not found".to_string()))?;

        if objective.progress_source == ProgressSource::Manual {
            return Ok(objective.progress);
        }

        let snapshot = self.snapshot_for(&objective).await?;
        let progress = compute_progress(&objective, &snapshot);
        self.store.set_objective_progress(objective_id, progress).await?;
        debug!(
            "Recalculated objective {objective_id} ({}): {} -> {progress}",
            objective.progress_source.to_str(),
            objective.progress
        );
        Ok(progress)
    }

    /// One-level rollup after a child changed. A parent that vanished meanwhile is skipped.
    pub async fn recalculate_parent(&self, parent_id: Option<Uuid>) -> GoalsResult<()> {
        if let Some(parent_id) = parent_id {
            match self.recalculate_progress(parent_id).await {
                Ok(_) | Err(GoalsError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Recalculates `objective_id`, then its parent if the value moved.
    pub async fn recalculate_with_parent(&self, objective_id: Uuid) -> GoalsResult<u8> {
        let before = self
            .store
            .get_objective(objective_id)
            .await?
            .ok_or_else(|| GoalsError::NotFound("Objective not found".to_string()))?;
        let after = self.recalculate_progress(objective_id).await?;
        if after != before.progress {
            self.recalculate_parent(before.parent_id).await?;
        }
        Ok(after)
    }

    /// Progress reported by reads. Does not write.
    pub async fn display_progress(&self, objective: &Objective) -> GoalsResult<u8> {
        let snapshot = self.snapshot_for(objective).await?;
        Ok(display_progress(objective, &snapshot, self.read_policy))
    }
}
