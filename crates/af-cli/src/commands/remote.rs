//! Commands backed by the remote executor.

use super::{load_workflow, orchestrator, parse_input, print_json};
use crate::config::AppConfig;
use af_core::execution::ExecutionMode;
use af_runner::{ExecutionCallbacks, RunOptions, RunOutcome};
use std::path::Path;
use std::time::Duration;

pub async fn run(
    config: &AppConfig,
    workflow_path: &Path,
    input: Option<&str>,
    mode: ExecutionMode,
    timeout_secs: Option<u64>,
) -> anyhow::Result<()> {
    let workflow = load_workflow(workflow_path)?;
    let input = parse_input(input)?;

    let callbacks = ExecutionCallbacks::new()
        .on_execution_start(|id| tracing::info!(execution_id = id, "run started"))
        .on_streaming_update(|update| {
            let node = update.node_id().unwrap_or("-");
            eprintln!("[{:?}] {node}", update.update_type);
        });
    let orch = orchestrator(config)?.with_callbacks(callbacks);

    let mut options = RunOptions::mode(mode);
    if let Some(secs) = timeout_secs {
        options = options.with_timeout(Duration::from_secs(secs));
    }

    match orch.run(&workflow, input, options).await? {
        RunOutcome::Completed(result) => print_json(&result),
        RunOutcome::Deferred(accepted) => print_json(&accepted),
    }
}

pub async fn status(config: &AppConfig, execution_id: &str) -> anyhow::Result<()> {
    let status = orchestrator(config)?.get_status(execution_id).await?;
    println!("{status}");
    Ok(())
}

pub async fn cancel(config: &AppConfig, execution_id: &str) -> anyhow::Result<()> {
    if orchestrator(config)?.cancel(execution_id).await? {
        println!("cancelled {execution_id}");
    } else {
        println!("cancellation of {execution_id} was not acknowledged");
    }
    Ok(())
}

pub async fn validate(config: &AppConfig, workflow_path: &Path) -> anyhow::Result<()> {
    let workflow = load_workflow(workflow_path)?;
    let report = orchestrator(config)?.validate(&workflow).await?;
    print_json(&report)?;
    if !report.valid {
        anyhow::bail!("workflow {} is invalid", workflow.id);
    }
    Ok(())
}

pub async fn templates(config: &AppConfig) -> anyhow::Result<()> {
    print_json(&orchestrator(config)?.templates().await?)
}

pub async fn statistics(config: &AppConfig) -> anyhow::Result<()> {
    print_json(&orchestrator(config)?.statistics().await?)
}
