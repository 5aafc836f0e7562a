use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::connections::{LinkOwner, LinkTarget};
use super::store::GoalStore;
use super::{
    CheckIn, GoalsError, GoalsResult, KeyResult, ListObjectivesQuery, Objective, ObjectiveStatus,
    ProgressSource,
};
use crate::core::shared::schema::{
    key_result_checkins, key_result_projects, key_result_tasks, key_results, objective_projects,
    objective_tasks, objectives, project_tasks, projects,
};
use crate::core::shared::utils::DbPool;
use crate::project::{Project, ProjectTask};

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = objectives)]
#[diesel(treat_none_as_null = true)]
pub struct ObjectiveRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub progress: i32,
    pub progress_source: String,
    pub period: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = key_results)]
#[diesel(treat_none_as_null = true)]
pub struct KeyResultRecord {
    pub id: Uuid,
    pub objective_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub start_value: BigDecimal,
    pub target_value: BigDecimal,
    pub current_value: BigDecimal,
    pub unit: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = key_result_checkins)]
pub struct CheckInRecord {
    pub id: Uuid,
    pub key_result_id: Uuid,
    pub user_id: Uuid,
    pub previous_value: Option<BigDecimal>,
    pub new_value: BigDecimal,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = projects)]
pub struct ProjectRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = project_tasks)]
#[diesel(treat_none_as_null = true)]
pub struct TaskRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn to_decimal(value: f64) -> BigDecimal {
    BigDecimal::try_from(value).unwrap_or_else(|_| BigDecimal::from(0))
}

fn record_to_objective(record: ObjectiveRecord) -> Objective {
    Objective {
        id: record.id,
        owner_id: record.owner_id,
        parent_id: record.parent_id,
        team_id: record.team_id,
        name: record.name,
        description: record.description,
        status: ObjectiveStatus::from_str(&record.status),
        progress: record.progress.clamp(0, 100) as u8,
        progress_source: ProgressSource::from_str(&record.progress_source),
        period: record.period,
        start_date: record.start_date,
        end_date: record.end_date,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

fn objective_to_record(objective: &Objective) -> ObjectiveRecord {
    ObjectiveRecord {
        id: objective.id,
        owner_id: objective.owner_id,
        parent_id: objective.parent_id,
        team_id: objective.team_id,
        name: objective.name.clone(),
        description: objective.description.clone(),
        status: objective.status.to_str().to_string(),
        progress: i32::from(objective.progress.min(100)),
        progress_source: objective.progress_source.to_str().to_string(),
        period: objective.period.clone(),
        start_date: objective.start_date,
        end_date: objective.end_date,
        created_at: objective.created_at,
        updated_at: objective.updated_at,
    }
}

fn record_to_key_result(record: KeyResultRecord) -> KeyResult {
    KeyResult {
        id: record.id,
        objective_id: record.objective_id,
        name: record.name,
        description: record.description,
        start_value: record.start_value.to_f64().unwrap_or(0.0),
        target_value: record.target_value.to_f64().unwrap_or(0.0),
        current_value: record.current_value.to_f64().unwrap_or(0.0),
        unit: record.unit,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

fn key_result_to_record(kr: &KeyResult) -> KeyResultRecord {
    KeyResultRecord {
        id: kr.id,
        objective_id: kr.objective_id,
        name: kr.name.clone(),
        description: kr.description.clone(),
        start_value: to_decimal(kr.start_value),
        target_value: to_decimal(kr.target_value),
        current_value: to_decimal(kr.current_value),
        unit: kr.unit.clone(),
        created_at: kr.created_at,
        updated_at: kr.updated_at,
    }
}

fn record_to_check_in(record: CheckInRecord) -> CheckIn {
    CheckIn {
        id: record.id,
        key_result_id: record.key_result_id,
        user_id: record.user_id,
        previous_value: record.previous_value.and_then(|v| v.to_f64()),
        new_value: record.new_value.to_f64().unwrap_or(0.0),
        note: record.note,
        created_at: record.created_at,
    }
}

fn record_to_project(record: ProjectRecord) -> Project {
    Project {
        id: record.id,
        owner_id: record.owner_id,
        name: record.name,
        description: record.description,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

fn record_to_task(record: TaskRecord) -> ProjectTask {
    ProjectTask {
        id: record.id,
        project_id: record.project_id,
        parent_id: record.parent_id,
        name: record.name,
        completed: record.completed,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

fn task_to_record(task: &ProjectTask) -> TaskRecord {
    TaskRecord {
        id: task.id,
        project_id: task.project_id,
        parent_id: task.parent_id,
        name: task.name.clone(),
        completed: task.completed,
        created_at: task.created_at,
        updated_at: task.updated_at,
    }
}

/// Postgres-backed [`GoalStore`]. Diesel is synchronous, so every call runs
/// on the blocking pool with a connection checked out of r2d2. Child rows
/// (key results, check-ins, links, subtasks) are removed by the schema's
/// `ON DELETE CASCADE` constraints.
#[derive(Clone)]
pub struct PgGoalStore {
    pool: DbPool,
}

impl PgGoalStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn run<T, F>(&self, f: F) -> GoalsResult<T>
    where
        F: FnOnce(&mut PgConnection) -> GoalsResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| GoalsError::Database(e.to_string()))?
    }
}

#[async_trait]
impl GoalStore for PgGoalStore {
    async fn is_healthy(&self) -> bool {
        self.run(|conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(())
        })
        .await
        .is_ok()
    }

    async fn list_objectives(&self, query: &ListObjectivesQuery) -> GoalsResult<Vec<Objective>> {
        let query = query.clone();
        let records = self
            .run(move |conn| {
                let mut db_query = objectives::table.into_boxed();

                if let Some(owner_id) = query.owner_id {
                    db_query = db_query.filter(objectives::owner_id.eq(owner_id));
                }
                if let Some(status) = query.status {
                    db_query = db_query.filter(objectives::status.eq(status.to_str()));
                }
                if let Some(period) = query.period {
                    db_query = db_query.filter(objectives::period.eq(period));
                }
                if let Some(parent_id) = query.parent_id {
                    db_query = db_query.filter(objectives::parent_id.eq(parent_id));
                }

                db_query = db_query.order(objectives::created_at.desc());

                if let Some(limit) = query.limit {
                    db_query = db_query.limit(limit as i64);
                }
                if let Some(offset) = query.offset {
                    db_query = db_query.offset(offset as i64);
                }

                Ok(db_query.load::<ObjectiveRecord>(conn)?)
            })
            .await?;
        Ok(records.into_iter().map(record_to_objective).collect())
    }

    async fn get_objective(&self, id: Uuid) -> GoalsResult<Option<Objective>> {
        let record = self
            .run(move |conn| {
                Ok(objectives::table
                    .find(id)
                    .first::<ObjectiveRecord>(conn)
                    .optional()?)
            })
            .await?;
        Ok(record.map(record_to_objective))
    }

    async fn child_objectives(&self, parent_id: Uuid) -> GoalsResult<Vec<Objective>> {
        let records = self
            .run(move |conn| {
                Ok(objectives::table
                    .filter(objectives::parent_id.eq(parent_id))
                    .order(objectives::created_at.asc())
                    .load::<ObjectiveRecord>(conn)?)
            })
            .await?;
        Ok(records.into_iter().map(record_to_objective).collect())
    }

    async fn insert_objective(&self, objective: &Objective) -> GoalsResult<()> {
        let record = objective_to_record(objective);
        self.run(move |conn| {
            diesel::insert_into(objectives::table)
                .values(&record)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn update_objective(&self, objective: &Objective) -> GoalsResult<()> {
        let record = objective_to_record(objective);
        self.run(move |conn| {
            let updated = diesel::update(objectives::table.find(record.id))
                .set(&record)
                .execute(conn)?;
            if updated == 0 {
                return Err(GoalsError::NotFound("Objective not found".to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn set_objective_progress(&self, id: Uuid, progress: u8) -> GoalsResult<()> {
        self.run(move |conn| {
            let updated = diesel::update(objectives::table.find(id))
                .set((
                    objectives::progress.eq(i32::from(progress.min(100))),
                    objectives::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
            if updated == 0 {
                return Err(GoalsError::NotFound("Objective not found".to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn delete_objective(&self, id: Uuid) -> GoalsResult<bool> {
        self.run(move |conn| {
            let deleted = diesel::delete(objectives::table.find(id)).execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn key_results_for(&self, objective_id: Uuid) -> GoalsResult<Vec<KeyResult>> {
        let records = self
            .run(move |conn| {
                Ok(key_results::table
                    .filter(key_results::objective_id.eq(objective_id))
                    .order(key_results::created_at.asc())
                    .load::<KeyResultRecord>(conn)?)
            })
            .await?;
        Ok(records.into_iter().map(record_to_key_result).collect())
    }

    async fn get_key_result(&self, id: Uuid) -> GoalsResult<Option<KeyResult>> {
        let record = self
            .run(move |conn| {
                Ok(key_results::table
                    .find(id)
                    .first::<KeyResultRecord>(conn)
                    .optional()?)
            })
            .await?;
        Ok(record.map(record_to_key_result))
    }

    async fn insert_key_result(&self, key_result: &KeyResult) -> GoalsResult<()> {
        let record = key_result_to_record(key_result);
        self.run(move |conn| {
            diesel::insert_into(key_results::table)
                .values(&record)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn update_key_result(&self, key_result: &KeyResult) -> GoalsResult<()> {
        let record = key_result_to_record(key_result);
        self.run(move |conn| {
            let updated = diesel::update(key_results::table.find(record.id))
                .set(&record)
                .execute(conn)?;
            if updated == 0 {
                return Err(GoalsError::NotFound("Key result not found".to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn delete_key_result(&self, id: Uuid) -> GoalsResult<bool> {
        self.run(move |conn| {
            let deleted = diesel::delete(key_results::table.find(id)).execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn record_check_in(&self, check_in: &CheckIn) -> GoalsResult<()> {
        let record = CheckInRecord {
            id: check_in.id,
            key_result_id: check_in.key_result_id,
            user_id: check_in.user_id,
            previous_value: check_in.previous_value.map(to_decimal),
            new_value: to_decimal(check_in.new_value),
            note: check_in.note.clone(),
            created_at: check_in.created_at,
        };
        self.run(move |conn| {
            conn.transaction::<_, GoalsError, _>(|conn| {
                let updated = diesel::update(key_results::table.find(record.key_result_id))
                    .set((
                        key_results::current_value.eq(record.new_value.clone()),
                        key_results::updated_at.eq(record.created_at),
                    ))
                    .execute(conn)?;
                if updated == 0 {
                    return Err(GoalsError::NotFound("Key result not found".to_string()));
                }
                diesel::insert_into(key_result_checkins::table)
                    .values(&record)
                    .execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    async fn check_ins_for(&self, key_result_id: Uuid) -> GoalsResult<Vec<CheckIn>> {
        let records = self
            .run(move |conn| {
                Ok(key_result_checkins::table
                    .filter(key_result_checkins::key_result_id.eq(key_result_id))
                    .order(key_result_checkins::created_at.desc())
                    .load::<CheckInRecord>(conn)?)
            })
            .await?;
        Ok(records.into_iter().map(record_to_check_in).collect())
    }

    async fn list_projects(&self) -> GoalsResult<Vec<Project>> {
        let records = self
            .run(|conn| {
                Ok(projects::table
                    .order(projects::created_at.desc())
                    .load::<ProjectRecord>(conn)?)
            })
            .await?;
        Ok(records.into_iter().map(record_to_project).collect())
    }

    async fn get_project(&self, id: Uuid) -> GoalsResult<Option<Project>> {
        let record = self
            .run(move |conn| {
                Ok(projects::table
                    .find(id)
                    .first::<ProjectRecord>(conn)
                    .optional()?)
            })
            .await?;
        Ok(record.map(record_to_project))
    }

    async fn insert_project(&self, project: &Project) -> GoalsResult<()> {
        let record = ProjectRecord {
            id: project.id,
            owner_id: project.owner_id,
            name: project.name.clone(),
            description: project.description.clone(),
            created_at: project.created_at,
            updated_at: project.updated_at,
        };
        self.run(move |conn| {
            diesel::insert_into(projects::table)
                .values(&record)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn delete_project(&self, id: Uuid) -> GoalsResult<bool> {
        self.run(move |conn| {
            let deleted = diesel::delete(projects::table.find(id)).execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn tasks_for_project(&self, project_id: Uuid) -> GoalsResult<Vec<ProjectTask>> {
        let records = self
            .run(move |conn| {
                Ok(project_tasks::table
                    .filter(project_tasks::project_id.eq(project_id))
                    .order(project_tasks::created_at.asc())
                    .load::<TaskRecord>(conn)?)
            })
            .await?;
        Ok(records.into_iter().map(record_to_task).collect())
    }

    async fn get_task(&self, id: Uuid) -> GoalsResult<Option<ProjectTask>> {
        let record = self
            .run(move |conn| {
                Ok(project_tasks::table
                    .find(id)
                    .first::<TaskRecord>(conn)
                    .optional()?)
            })
            .await?;
        Ok(record.map(record_to_task))
    }

    async fn insert_task(&self, task: &ProjectTask) -> GoalsResult<()> {
        let record = task_to_record(task);
        self.run(move |conn| {
            diesel::insert_into(project_tasks::table)
                .values(&record)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn update_task(&self, task: &ProjectTask) -> GoalsResult<()> {
        let record = task_to_record(task);
        self.run(move |conn| {
            let updated = diesel::update(project_tasks::table.find(record.id))
                .set(&record)
                .execute(conn)?;
            if updated == 0 {
                return Err(GoalsError::NotFound("Task not found".to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn delete_task(&self, id: Uuid) -> GoalsResult<bool> {
        self.run(move |conn| {
            let deleted = diesel::delete(project_tasks::table.find(id)).execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn insert_link(&self, owner: LinkOwner, target: LinkTarget) -> GoalsResult<bool> {
        let now = Utc::now();
        self.run(move |conn| {
            let inserted = match (owner, target) {
                (LinkOwner::Objective(objective_id), LinkTarget::Project(project_id)) => {
                    diesel::insert_into(objective_projects::table)
                        .values((
                            objective_projects::objective_id.eq(objective_id),
                            objective_projects::project_id.eq(project_id),
                            objective_projects::created_at.eq(now),
                        ))
                        .on_conflict_do_nothing()
                        .execute(conn)?
                }
                (LinkOwner::Objective(objective_id), LinkTarget::Task(task_id)) => {
                    diesel::insert_into(objective_tasks::table)
                        .values((
                            objective_tasks::objective_id.eq(objective_id),
                            objective_tasks::task_id.eq(task_id),
                            objective_tasks::created_at.eq(now),
                        ))
                        .on_conflict_do_nothing()
                        .execute(conn)?
                }
                (LinkOwner::KeyResult(key_result_id), LinkTarget::Project(project_id)) => {
                    diesel::insert_into(key_result_projects::table)
                        .values((
                            key_result_projects::key_result_id.eq(key_result_id),
                            key_result_projects::project_id.eq(project_id),
                            key_result_projects::created_at.eq(now),
                        ))
                        .on_conflict_do_nothing()
                        .execute(conn)?
                }
                (LinkOwner::KeyResult(key_result_id), LinkTarget::Task(task_id)) => {
                    diesel::insert_into(key_result_tasks::table)
                        .values((
                            key_result_tasks::key_result_id.eq(key_result_id),
                            key_result_tasks::task_id.eq(task_id),
                            key_result_tasks::created_at.eq(now),
                        ))
                        .on_conflict_do_nothing()
                        .execute(conn)?
                }
            };
            Ok(inserted > 0)
        })
        .await
    }

    async fn delete_link(&self, owner: LinkOwner, target: LinkTarget) -> GoalsResult<bool> {
        self.run(move |conn| {
            let deleted = match (owner, target) {
                (LinkOwner::Objective(objective_id), LinkTarget::Project(project_id)) => {
                    diesel::delete(objective_projects::table.find((objective_id, project_id)))
                        .execute(conn)?
                }
                (LinkOwner::Objective(objective_id), LinkTarget::Task(task_id)) => {
                    diesel::delete(objective_tasks::table.find((objective_id, task_id)))
                        .execute(conn)?
                }
                (LinkOwner::KeyResult(key_result_id), LinkTarget::Project(project_id)) => {
                    diesel::delete(key_result_projects::table.find((key_result_id, project_id)))
                        .execute(conn)?
                }
                (LinkOwner::KeyResult(key_result_id), LinkTarget::Task(task_id)) => {
                    diesel::delete(key_result_tasks::table.find((key_result_id, task_id)))
                        .execute(conn)?
                }
            };
            Ok(deleted > 0)
        })
        .await
    }

    async fn linked_project_ids(&self, owner: LinkOwner) -> GoalsResult<Vec<Uuid>> {
        self.run(move |conn| {
            let ids = match owner {
                LinkOwner::Objective(objective_id) => objective_projects::table
                    .filter(objective_projects::objective_id.eq(objective_id))
                    .order(objective_projects::created_at.asc())
                    .select(objective_projects::project_id)
                    .load::<Uuid>(conn)?,
                LinkOwner::KeyResult(key_result_id) => key_result_projects::table
                    .filter(key_result_projects::key_result_id.eq(key_result_id))
                    .order(key_result_projects::created_at.asc())
                    .select(key_result_projects::project_id)
                    .load::<Uuid>(conn)?,
            };
            Ok(ids)
        })
        .await
    }

    async fn linked_task_ids(&self, owner: LinkOwner) -> GoalsResult<Vec<Uuid>> {
        self.run(move |conn| {
            let ids = match owner {
                LinkOwner::Objective(objective_id) => objective_tasks::table
                    .filter(objective_tasks::objective_id.eq(objective_id))
                    .order(objective_tasks::created_at.asc())
                    .select(objective_tasks::task_id)
                    .load::<Uuid>(conn)?,
                LinkOwner::KeyResult(key_result_id) => key_result_tasks::table
                    .filter(key_result_tasks::key_result_id.eq(key_result_id))
                    .order(key_result_tasks::created_at.asc())
                    .select(key_result_tasks::task_id)
                    .load::<Uuid>(conn)?,
            };
            Ok(ids)
        })
        .await
    }

    async fn objectives_linked_to_project(&self, project_id: Uuid) -> GoalsResult<Vec<Uuid>> {
        self.run(move |conn| {
            Ok(objective_projects::table
                .filter(objective_projects::project_id.eq(project_id))
                .select(objective_projects::objective_id)
                .load::<Uuid>(conn)?)
        })
        .await
    }
}
