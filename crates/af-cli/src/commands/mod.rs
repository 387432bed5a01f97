//! Subcommand implementations.

pub mod debug;
pub mod remote;
pub mod trace;

use crate::config::AppConfig;
use af_core::graph::WorkflowDefinition;
use af_runner::{HttpExecutor, Orchestrator};
use anyhow::{bail, Context};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

pub(crate) fn load_workflow(path: &Path) -> anyhow::Result<WorkflowDefinition> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid workflow {}", path.display()))
}

/// Parse `--input`: inline JSON, or `@path` to read it from a file.
pub(crate) fn parse_input(raw: Option<&str>) -> anyhow::Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input {path}"))?,
        None => raw.to_string(),
    };
    match serde_json::from_str(&text).context("Input is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("Input must be a JSON object, got {other}"),
    }
}

/// Split `node=condition` into its parts; a bare node id is unconditional.
pub(crate) fn parse_breakpoint(raw: &str) -> (String, Option<String>) {
    match raw.split_once('=') {
        Some((node, condition)) => (node.trim().to_string(), Some(condition.trim().to_string())),
        None => (raw.trim().to_string(), None),
    }
}

pub(crate) fn orchestrator(config: &AppConfig) -> anyhow::Result<Orchestrator> {
    let executor = HttpExecutor::new(&config.executor)?;
    tracing::debug!(base_url = %executor.base_url(), "using remote executor");
    Ok(Orchestrator::new(Arc::new(executor), config.orchestrator.clone()))
}

pub(crate) fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
