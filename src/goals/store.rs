//! Data access for objectives, key results, projects and their links.
//!
//! [`GoalStore`] is the seam between the HTTP handlers / progress service and
//! persistence. [`InMemoryGoalStore`] backs tests and database-less runs;
//! [`super::pg_store::PgGoalStore`] is the Postgres implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connections::{LinkOwner, LinkTarget};
use super::{CheckIn, GoalsError, GoalsResult, KeyResult, ListObjectivesQuery, Objective};
use crate::project::{Project, ProjectTask};

#[async_trait]
pub trait GoalStore: Send + Sync {
    async fn is_healthy(&self) -> bool;

    async fn list_objectives(&self, query: &ListObjectivesQuery) -> GoalsResult<Vec<Objective>>;
    async fn get_objective(&self, id: Uuid) -> GoalsResult<Option<Objective>>;
    async fn child_objectives(&self, parent_id: Uuid) -> GoalsResult<Vec<Objective>>;
    async fn insert_objective(&self, objective: &Objective) -> GoalsResult<()>;
    async fn update_objective(&self, objective: &Objective) -> GoalsResult<()>;
    /// Writes the `progress` column only.
    async fn set_objective_progress(&self, id: Uuid, progress: u8) -> GoalsResult<()>;
    /// Removes the objective with its key results, check-ins and links.
    /// Children are detached and become roots.
    async fn delete_objective(&self, id: Uuid) -> GoalsResult<bool>;

    async fn key_results_for(&self, objective_id: Uuid) -> GoalsResult<Vec<KeyResult>>;
    async fn get_key_result(&self, id: Uuid) -> GoalsResult<Option<KeyResult>>;
    async fn insert_key_result(&self, key_result: &KeyResult) -> GoalsResult<()>;
    async fn update_key_result(&self, key_result: &KeyResult) -> GoalsResult<()>;
    async fn delete_key_result(&self, id: Uuid) -> GoalsResult<bool>;

    /// Stores the check-in and moves the key result's `current_value` to `new_value`.
    async fn record_check_in(&self, check_in: &CheckIn) -> GoalsResult<()>;
    async fn check_ins_for(&self, key_result_id: Uuid) -> GoalsResult<Vec<CheckIn>>;

    async fn list_projects(&self) -> GoalsResult<Vec<Project>>;
    async fn get_project(&self, id: Uuid) -> GoalsResult<Option<Project>>;
    async fn insert_project(&self, project: &Project) -> GoalsResult<()>;
    async fn delete_project(&self, id: Uuid) -> GoalsResult<bool>;

    async fn tasks_for_project(&self, project_id: Uuid) -> GoalsResult<Vec<ProjectTask>>;
    async fn get_task(&self, id: Uuid) -> GoalsResult<Option<ProjectTask>>;
    async fn insert_task(&self, task: &ProjectTask) -> GoalsResult<()>;
    async fn update_task(&self, task: &ProjectTask) -> GoalsResult<()>;
    /// Removes the task together with its subtasks.
    async fn delete_task(&self, id: Uuid) -> GoalsResult<bool>;

    /// Returns `false` when the link already exists.
    async fn insert_link(&self, owner: LinkOwner, target: LinkTarget) -> GoalsResult<bool>;
    /// Returns `false` when there was no such link.
    async fn delete_link(&self, owner: LinkOwner, target: LinkTarget) -> GoalsResult<bool>;
    async fn linked_project_ids(&self, owner: LinkOwner) -> GoalsResult<Vec<Uuid>>;
    async fn linked_task_ids(&self, owner: LinkOwner) -> GoalsResult<Vec<Uuid>>;
    /// Objectives holding a direct objective-level link to the project.
    async fn objectives_linked_to_project(&self, project_id: Uuid) -> GoalsResult<Vec<Uuid>>;
}

#[derive(Debug, Clone)]
struct LinkRecord {
    owner: LinkOwner,
    target: LinkTarget,
    created_at: DateTime<Utc>,
}

/// `RwLock<HashMap>` backed store. Locks are always taken in field order.
#[derive(Default)]
pub struct InMemoryGoalStore {
    objectives: RwLock<HashMap<Uuid, Objective>>,
    key_results: RwLock<HashMap<Uuid, KeyResult>>,
    check_ins: RwLock<Vec<CheckIn>>,
    projects: RwLock<HashMap<Uuid, Project>>,
    tasks: RwLock<HashMap<Uuid, ProjectTask>>,
    links: RwLock<Vec<LinkRecord>>,
}

impl InMemoryGoalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(kind: &str, id: Uuid) -> GoalsError {
    GoalsError::NotFound(format!("{kind} {id} not found"))
}

#[async_trait]
impl GoalStore for InMemoryGoalStore {
    async fn is_healthy(&self) -> bool {
        true
    }

    async fn list_objectives(&self, query: &ListObjectivesQuery) -> GoalsResult<Vec<Objective>> {
        let objectives = self.objectives.read().await;
        let mut result: Vec<Objective> = objectives
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn get_objective(&self, id: Uuid) -> GoalsResult<Option<Objective>> {
        Ok(self.objectives.read().await.get(&id).cloned())
    }

    async fn child_objectives(&self, parent_id: Uuid) -> GoalsResult<Vec<Objective>> {
        let objectives = self.objectives.read().await;
        let mut children: Vec<Objective> = objectives
            .values()
            .filter(|o| o.parent_id == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(children)
    }

    async fn insert_objective(&self, objective: &Objective) -> GoalsResult<()> {
        let mut objectives = self.objectives.write().await;
        if objectives.contains_key(&objective.id) {
            return Err(GoalsError::Conflict(format!("objective {} already exists", objective.id)));
        }
        objectives.insert(objective.id, objective.clone());
        Ok(())
    }

    async fn update_objective(&self, objective: &Objective) -> GoalsResult<()> {
        let mut objectives = self.objectives.write().await;
        match objectives.get_mut(&objective.id) {
            Some(existing) => {
                *existing = objective.clone();
                Ok(())
            }
            None => Err(missing("objective", objective.id)),
        }
    }

    async fn set_objective_progress(&self, id: Uuid, progress: u8) -> GoalsResult<()> {
        let mut objectives = self.objectives.write().await;
        let objective = objectives.get_mut(&id).ok_or_else(|| missing("objective", id))?;
        objective.progress = progress.min(100);
        objective.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_objective(&self, id: Uuid) -> GoalsResult<bool> {
        let mut objectives = self.objectives.write().await;
        let mut key_results = self.key_results.write().await;
        let mut check_ins = self.check_ins.write().await;
        let mut links = self.links.write().await;

        if objectives.remove(&id).is_none() {
            return Ok(false);
        }
        for child in objectives.values_mut().filter(|o| o.parent_id == Some(id)) {
            child.parent_id = None;
        }

        let removed_krs: HashSet<Uuid> = key_results
            .values()
            .filter(|kr| kr.objective_id == id)
            .map(|kr| kr.id)
            .collect();
        key_results.retain(|kr_id, _| !removed_krs.contains(kr_id));
        check_ins.retain(|c| !removed_krs.contains(&c.key_result_id));
        links.retain(|l| match l.owner {
            LinkOwner::Objective(owner) => owner != id,
            LinkOwner::KeyResult(owner) => !removed_krs.contains(&owner),
        });
        Ok(true)
    }

    async fn key_results_for(&self, objective_id: Uuid) -> GoalsResult<Vec<KeyResult>> {
        let key_results = self.key_results.read().await;
        let mut result: Vec<KeyResult> = key_results
            .values()
            .filter(|kr| kr.objective_id == objective_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(result)
    }

    async fn get_key_result(&self, id: Uuid) -> GoalsResult<Option<KeyResult>> {
        Ok(self.key_results.read().await.get(&id).cloned())
    }

    async fn insert_key_result(&self, key_result: &KeyResult) -> GoalsResult<()> {
        let mut key_results = self.key_results.write().await;
        key_results.insert(key_result.id, key_result.clone());
        Ok(())
    }

    async fn update_key_result(&self, key_result: &KeyResult) -> GoalsResult<()> {
        let mut key_results = self.key_results.write().await;
        match key_results.get_mut(&key_result.id) {
            Some(existing) => {
                *existing = key_result.clone();
                Ok(())
            }
            None => Err(missing("key result", key_result.id)),
        }
    }

    async fn delete_key_result(&self, id: Uuid) -> GoalsResult<bool> {
        let mut key_results = self.key_results.write().await;
        let mut check_ins = self.check_ins.write().await;
        let mut links = self.links.write().await;

        if key_results.remove(&id).is_none() {
            return Ok(false);
        }
        check_ins.retain(|c| c.key_result_id != id);
        links.retain(|l| l.owner != LinkOwner::KeyResult(id));
        Ok(true)
    }

    async fn record_check_in(&self, check_in: &CheckIn) -> GoalsResult<()> {
        let mut key_results = self.key_results.write().await;
        let mut check_ins = self.check_ins.write().await;

        let kr = key_results
            .get_mut(&check_in.key_result_id)
            .ok_or_else(|| missing("key result", check_in.key_result_id))?;
        kr.current_value = check_in.new_value;
        kr.updated_at = check_in.created_at;
        check_ins.push(check_in.clone());
        Ok(())
    }

    async fn check_ins_for(&self, key_result_id: Uuid) -> GoalsResult<Vec<CheckIn>> {
        let check_ins = self.check_ins.read().await;
        // newest first
        Ok(check_ins
            .iter()
            .rev()
            .filter(|c| c.key_result_id == key_result_id)
            .cloned()
            .collect())
    }

    async fn list_projects(&self) -> GoalsResult<Vec<Project>> {
        let projects = self.projects.read().await;
        let mut result: Vec<Project> = projects.values().cloned().collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn get_project(&self, id: Uuid) -> GoalsResult<Option<Project>> {
        Ok(self.projects.read().await.get(&id).cloned())
    }

    async fn insert_project(&self, project: &Project) -> GoalsResult<()> {
        self.projects.write().await.insert(project.id, project.clone());
        Ok(())
    }

    async fn delete_project(&self, id: Uuid) -> GoalsResult<bool> {
        let mut projects = self.projects.write().await;
        let mut tasks = self.tasks.write().await;
        let mut links = self.links.write().await;

        if projects.remove(&id).is_none() {
            return Ok(false);
        }
        let removed_tasks: HashSet<Uuid> = tasks
            .values()
            .filter(|t| t.project_id == id)
            .map(|t| t.id)
            .collect();
        tasks.retain(|task_id, _| !removed_tasks.contains(task_id));
        links.retain(|l| match l.target {
            LinkTarget::Project(project) => project != id,
            LinkTarget::Task(task) => !removed_tasks.contains(&task),
        });
        Ok(true)
    }

    async fn tasks_for_project(&self, project_id: Uuid) -> GoalsResult<Vec<ProjectTask>> {
        let tasks = self.tasks.read().await;
        let mut result: Vec<ProjectTask> = tasks
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(result)
    }

    async fn get_task(&self, id: Uuid) -> GoalsResult<Option<ProjectTask>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn insert_task(&self, task: &ProjectTask) -> GoalsResult<()> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn update_task(&self, task: &ProjectTask) -> GoalsResult<()> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => Err(missing("task", task.id)),
        }
    }

    async fn delete_task(&self, id: Uuid) -> GoalsResult<bool> {
        let mut tasks = self.tasks.write().await;
        let mut links = self.links.write().await;

        if !tasks.contains_key(&id) {
            return Ok(false);
        }
        let mut removed = HashSet::from([id]);
        loop {
            let before = removed.len();
            let descendants: Vec<Uuid> = tasks
                .values()
                .filter(|t| t.parent_id.is_some_and(|p| removed.contains(&p)))
                .map(|t| t.id)
                .collect();
            removed.extend(descendants);
            if removed.len() == before {
                break;
            }
        }
        tasks.retain(|task_id, _| !removed.contains(task_id));
        links.retain(|l| !matches!(l.target, LinkTarget::Task(task) if removed.contains(&task)));
        Ok(true)
    }

    async fn insert_link(&self, owner: LinkOwner, target: LinkTarget) -> GoalsResult<bool> {
        let mut links = self.links.write().await;
        if links.iter().any(|l| l.owner == owner && l.target == target) {
            return Ok(false);
        }
        links.push(LinkRecord {
            owner,
            target,
            created_at: Utc::now(),
        });
        Ok(true)
    }

    async fn delete_link(&self, owner: LinkOwner, target: LinkTarget) -> GoalsResult<bool> {
        let mut links = self.links.write().await;
        let before = links.len();
        links.retain(|l| !(l.owner == owner && l.target == target));
        Ok(links.len() != before)
    }

    async fn linked_project_ids(&self, owner: LinkOwner) -> GoalsResult<Vec<Uuid>> {
        let links = self.links.read().await;
        let mut linked: Vec<&LinkRecord> = links.iter().filter(|l| l.owner == owner).collect();
        linked.sort_by_key(|l| l.created_at);
        Ok(linked
            .into_iter()
            .filter_map(|l| match l.target {
                LinkTarget::Project(id) => Some(id),
                LinkTarget::Task(_) => None,
            })
            .collect())
    }

    async fn linked_task_ids(&self, owner: LinkOwner) -> GoalsResult<Vec<Uuid>> {
        let links = self.links.read().await;
        let mut linked: Vec<&LinkRecord> = links.iter().filter(|l| l.owner == owner).collect();
        linked.sort_by_key(|l| l.created_at);
        Ok(linked
            .into_iter()
            .filter_map(|l| match l.target {
                LinkTarget::Task(id) => Some(id),
                LinkTarget::Project(_) => None,
            })
            .collect())
    }

    async fn objectives_linked_to_project(&self, project_id: Uuid) -> GoalsResult<Vec<Uuid>> {
        let links = self.links.read().await;
        Ok(links
            .iter()
            .filter(|l| l.target == LinkTarget::Project(project_id))
            .filter_map(|l| match l.owner {
                LinkOwner::Objective(id) => Some(id),
                LinkOwner::KeyResult(_) => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goals::{ObjectiveStatus, ProgressSource};

    fn objective(parent_id: Option<Uuid>) -> Objective {
        let now = Utc::now();
        Objective {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            parent_id,
            team_id: None,
            name: "Ship v2".to_string(),
            description: None,
            status: ObjectiveStatus::OnTrack,
            progress: 0,
            progress_source: ProgressSource::KeyResults,
            period: "2026-Q2".to_string(),
            start_date: None,
            end_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn key_result(objective_id: Uuid) -> KeyResult {
        let now = Utc::now();
        KeyResult {
            id: Uuid::new_v4(),
            objective_id,
            name: "Signups".to_string(),
            description: None,
            start_value: 0.0,
            target_value: 100.0,
            current_value: 0.0,
            unit: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn task(project_id: Uuid, parent_id: Option<Uuid>) -> ProjectTask {
        let now = Utc::now();
        ProjectTask {
            id: Uuid::new_v4(),
            project_id,
            parent_id,
            name: "Write docs".to_string(),
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_duplicate_link_is_rejected() {
        let store = InMemoryGoalStore::new();
        let owner = LinkOwner::Objective(Uuid::new_v4());
        let target = LinkTarget::Project(Uuid::new_v4());

        assert!(store.insert_link(owner, target).await.unwrap());
        assert!(!store.insert_link(owner, target).await.unwrap());
        assert_eq!(store.linked_project_ids(owner).await.unwrap().len(), 1);
        assert!(store.delete_link(owner, target).await.unwrap());
        assert!(!store.delete_link(owner, target).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_objective_detaches_children_and_drops_key_results() {
        let store = InMemoryGoalStore::new();
        let parent = objective(None);
        let child = objective(Some(parent.id));
        store.insert_objective(&parent).await.unwrap();
        store.insert_objective(&child).await.unwrap();
        let kr = key_result(parent.id);
        store.insert_key_result(&kr).await.unwrap();
        store
            .insert_link(LinkOwner::KeyResult(kr.id), LinkTarget::Project(Uuid::new_v4()))
            .await
            .unwrap();

        assert!(store.delete_objective(parent.id).await.unwrap());
        let child = store.get_objective(child.id).await.unwrap().unwrap();
        assert_eq!(child.parent_id, None);
        assert!(store.get_key_result(kr.id).await.unwrap().is_none());
        assert!(store
            .linked_project_ids(LinkOwner::KeyResult(kr.id))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_check_in_moves_current_value() {
        let store = InMemoryGoalStore::new();
        let kr = key_result(Uuid::new_v4());
        store.insert_key_result(&kr).await.unwrap();

        let check_in = CheckIn {
            id: Uuid::new_v4(),
            key_result_id: kr.id,
            user_id: Uuid::nil(),
            previous_value: Some(0.0),
            new_value: 42.0,
            note: Some("weekly sync".to_string()),
            created_at: Utc::now(),
        };
        store.record_check_in(&check_in).await.unwrap();

        let kr = store.get_key_result(kr.id).await.unwrap().unwrap();
        assert_eq!(kr.current_value, 42.0);
        assert_eq!(store.check_ins_for(kr.id).await.unwrap(), vec![check_in]);
    }

    #[tokio::test]
    async fn test_delete_task_removes_subtasks_and_links() {
        let store = InMemoryGoalStore::new();
        let project_id = Uuid::new_v4();
        let parent = task(project_id, None);
        let child = task(project_id, Some(parent.id));
        let grandchild = task(project_id, Some(child.id));
        for t in [&parent, &child, &grandchild] {
            store.insert_task(t).await.unwrap();
        }
        let owner = LinkOwner::Objective(Uuid::new_v4());
        store.insert_link(owner, LinkTarget::Task(grandchild.id)).await.unwrap();

        assert!(store.delete_task(parent.id).await.unwrap());
        assert!(store.tasks_for_project(project_id).await.unwrap().is_empty());
        assert!(store.linked_task_ids(owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_objectives_filters_by_parent() {
        let store = InMemoryGoalStore::new();
        let parent = objective(None);
        store.insert_objective(&parent).await.unwrap();
        store.insert_objective(&objective(Some(parent.id))).await.unwrap();
        store.insert_objective(&objective(None)).await.unwrap();

        let query = ListObjectivesQuery {
            parent_id: Some(parent.id),
            ..Default::default()
        };
        assert_eq!(store.list_objectives(&query).await.unwrap().len(), 1);
        assert_eq!(store.list_objectives(&ListObjectivesQuery::default()).await.unwrap().len(), 3);
    }
}
