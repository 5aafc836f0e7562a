use anyhow::Context;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::goals::ReadPathPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "goalserver.toml";
pub const ENV_PREFIX: &str = "GOALSERVER_";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub goals: GoalsConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres URL. Without one the server keeps everything in memory.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GoalsConfig {
    /// Recompute PROJECTS-sourced objectives on reads instead of returning
    /// the stored value.
    pub recompute_projects_on_read: bool,
}

impl GoalsConfig {
    pub fn read_policy(&self) -> ReadPathPolicy {
        ReadPathPolicy {
            recompute_projects: self.recompute_projects_on_read,
        }
    }
}

impl AppConfig {
    /// Defaults, then `goalserver.toml` (or the file named by
    /// `GOALSERVER_CONFIG`), then `GOALSERVER_*` variables, then `DATABASE_URL`.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let path = std::env::var("GOALSERVER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        Self::layered(path, ENV_PREFIX)
            .extract()
            .with_context(|| format!("invalid configuration (file: {})", path.display()))
    }

    fn layered(path: &Path, env_prefix: &str) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(env_prefix).ignore(&["config"]).split("__"));
        if let Ok(url) = std::env::var("DATABASE_URL") {
            figment = figment.merge(Serialized::default("database.url", url));
        }
        figment
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
