use crate::core::shared::schema::project::{project_tasks, projects};

diesel::table! {
    objectives (id) {
        id -> Uuid,
        owner_id -> Uuid,
        parent_id -> Nullable<Uuid>,
        team_id -> Nullable<Uuid>,
        name -> Varchar,
        description -> Nullable<Text>,
        status -> Varchar,
        progress -> Int4,
        progress_source -> Varchar,
        period -> Varchar,
        start_date -> Nullable<Date>,
        end_date -> Nullable<Date>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    key_results (id) {
        id -> Uuid,
        objective_id -> Uuid,
        name -> Varchar,
        description -> Nullable<Text>,
        start_value -> Numeric,
        target_value -> Numeric,
        current_value -> Numeric,
        unit -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    key_result_checkins (id) {
        id -> Uuid,
        key_result_id -> Uuid,
        user_id -> Uuid,
        previous_value -> Nullable<Numeric>,
        new_value -> Numeric,
        note -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    objective_projects (objective_id, project_id) {
        objective_id -> Uuid,
        project_id -> Uuid,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    objective_tasks (objective_id, task_id) {
        objective_id -> Uuid,
        task_id -> Uuid,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    key_result_projects (key_result_id, project_id) {
        key_result_id -> Uuid,
        project_id -> Uuid,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    key_result_tasks (key_result_id, task_id) {
        key_result_id -> Uuid,
        task_id -> Uuid,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(key_results -> objectives (objective_id));
diesel::joinable!(key_result_checkins -> key_results (key_result_id));
diesel::joinable!(objective_projects -> objectives (objective_id));
diesel::joinable!(objective_projects -> projects (project_id));
diesel::joinable!(objective_tasks -> objectives (objective_id));
diesel::joinable!(objective_tasks -> project_tasks (task_id));
diesel::joinable!(key_result_projects -> key_results (key_result_id));
diesel::joinable!(key_result_projects -> projects (project_id));
diesel::joinable!(key_result_tasks -> key_results (key_result_id));
diesel::joinable!(key_result_tasks -> project_tasks (task_id));

diesel::allow_tables_to_appear_in_same_query!(
    objectives,
    key_results,
    key_result_checkins,
    objective_projects,
    objective_tasks,
    key_result_projects,
    key_result_tasks,
    projects,
    project_tasks,
);
