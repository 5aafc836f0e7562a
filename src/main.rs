use anyhow::Context;
use dotenvy::dotenv;
use log::{info, warn};
use std::sync::Arc;

use goalserver::core::config::AppConfig;
use goalserver::core::shared::state::AppState;
use goalserver::core::shared::utils::{create_conn, run_migrations};
use goalserver::goals::pg_store::PgGoalStore;
use goalserver::goals::{GoalStore, InMemoryGoalStore};
use goalserver::main_module::run_axum_server;

fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn GoalStore>> {
    let Some(url) = config.database.url.as_deref() else {
        warn!("No database configured, using the in-memory goal store (data is lost on exit)");
        return Ok(Arc::new(InMemoryGoalStore::new()));
    };

    let pool = create_conn(url, config.database.max_connections)
        .context("failed to create database pool")?;
    run_migrations(&pool)
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to run database migrations")?;
    info!("Connected to Postgres, migrations applied");
    Ok(Arc::new(PgGoalStore::new(pool)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::from_env()?;
    info!(
        "Starting goalserver {} on {}",
        env!("CARGO_PKG_VERSION"),
        config.bind_address()
    );

    let store = open_store(&config)?;
    let state = Arc::new(AppState::new(config, store));
    run_axum_server(state).await.context("server error")?;

    info!("goalserver stopped");
    Ok(())
}
