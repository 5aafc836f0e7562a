#[derive(Debug)]
pub struct ApiUrls;

impl ApiUrls {
    // Objectives - JSON APIs
    pub const OBJECTIVES: &'static str = "/api/goals/objectives";
    pub const OBJECTIVE_BY_ID: &'static str = "/api/goals/objectives/:id";
    pub const OBJECTIVE_RECALCULATE: &'static str = "/api/goals/objectives/:id/recalculate";
    pub const OBJECTIVE_KEY_RESULTS: &'static str = "/api/goals/objectives/:id/key-results";
    pub const OBJECTIVE_CONNECTIONS: &'static str = "/api/goals/objectives/:id/connections";

    // Key results - JSON APIs
    pub const KEY_RESULT_BY_ID: &'static str = "/api/goals/key-results/:id";
    pub const KEY_RESULT_CHECK_IN: &'static str = "/api/goals/key-results/:id/check-in";
    pub const KEY_RESULT_HISTORY: &'static str = "/api/goals/key-results/:id/history";
    pub const KEY_RESULT_CONNECTIONS: &'static str = "/api/goals/key-results/:id/connections";

    // Goals overview
    pub const GOALS_DASHBOARD: &'static str = "/api/goals/dashboard";
    pub const GOALS_ALIGNMENT: &'static str = "/api/goals/alignment";

    // Projects - JSON APIs
    pub const PROJECTS: &'static str = "/api/projects";
    pub const PROJECT_BY_ID: &'static str = "/api/projects/:id";
    pub const PROJECT_TASKS: &'static str = "/api/projects/:id/tasks";
    pub const TASK_BY_ID: &'static str = "/api/tasks/:id";

    pub const HEALTH: &'static str = "/health";
}
