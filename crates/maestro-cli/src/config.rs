use maestro_orchestrator::OrchestratorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration, loaded from a TOML file. Every key has a
/// default so the server runs with no config file at all.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub orchestrator: OrchestratorSection,
    pub runner: RunnerSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// "debug" or "release".
    pub mode: String,
    pub jwt_secret: String,
    pub allow_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            mode: "debug".to_string(),
            jwt_secret: String::new(),
            allow_origins: vec!["*".to_string()],
        }
    }
}

/// Connection settings for a SQL storage adapter. The core runs on the
/// in-memory store when no adapter is wired in.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// "mysql" or "postgres".
    pub driver: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: "mysql".to_string(),
            host: "localhost".to_string(),
            port: 3306,
            database: String::new(),
            username: String::new(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub workers: usize,
    pub queue_size: usize,
    pub workspace_dir: PathBuf,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            workers: defaults.workers,
            queue_size: defaults.queue_size,
            workspace_dir: PathBuf::from("/tmp/maestro-workspaces"),
        }
    }
}

impl From<&OrchestratorSection> for OrchestratorConfig {
    fn from(section: &OrchestratorSection) -> Self {
        Self {
            workers: section.workers,
            queue_size: section.queue_size,
            workspace_dir: section.workspace_dir.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunnerSection {
    pub script: PathBuf,
    pub interpreter: String,
    /// Proxy endpoint injected into the runner environment when set.
    pub proxy: Option<String>,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            script: PathBuf::from("scripts/agno_runner.py"),
            interpreter: "python3".to_string(),
            proxy: None,
        }
    }
}

impl AppConfig {
    /// Parse the file at `path`, or fall back to defaults when it does
    /// not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config = toml::from_str(&raw)?;
        Ok(config)
    }
}
