//! Application configuration: TOML file, then environment, then flags.

use af_runner::{ExecutorConfig, OrchestratorConfig};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const EXECUTOR_URL_ENV: &str = "AGENTFLOW_EXECUTOR_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub executor: ExecutorConfig,
    pub orchestrator: OrchestratorConfig,
    /// Default database for persisted debug sessions.
    pub trace_db: Option<PathBuf>,
}

impl AppConfig {
    /// `<config_dir>/agentflow/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("agentflow").join("config.toml"))
    }

    /// Load from `explicit`, or from the default path when it exists.
    /// An explicit path that cannot be read is an error.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Self::from_toml(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply the environment override for the executor URL.
    pub fn apply_env(&mut self) {
        self.override_executor_url(std::env::var(EXECUTOR_URL_ENV).ok());
    }

    pub fn override_executor_url(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.executor.base_url = url;
        }
    }
}
