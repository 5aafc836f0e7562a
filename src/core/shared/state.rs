use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::goals::{ConnectionService, GoalProgressService, GoalStore};
use crate::project::ProjectService;

/// Shared by every handler. The services hold the same store handle.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn GoalStore>,
    pub progress: GoalProgressService,
    pub connections: ConnectionService,
    pub projects: ProjectService,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn GoalStore>) -> Self {
        let progress = GoalProgressService::new(store.clone(), config.goals.read_policy());
        let connections = ConnectionService::new(store.clone(), progress.clone());
        let projects = ProjectService::new(store.clone(), progress.clone());
        Self {
            config: Arc::new(config),
            store,
            progress,
            connections,
            projects,
        }
    }
}
