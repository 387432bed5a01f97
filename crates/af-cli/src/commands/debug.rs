//! Interactive local walk with breakpoints.
//!
//! While paused, reads one command per line from stdin:
//! `c` continue, `s` step, `m` metrics, `h` history, `t <index>` time travel,
//! `q` quit (the walk stops before the next node).

use super::{load_workflow, orchestrator, parse_breakpoint, parse_input, print_json};
use crate::config::AppConfig;
use af_core::debug::ExecutionState;
use af_debug::DebugCoordinator;
use af_runner::EchoExecutor;
use af_trace::TraceStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

enum Command {
    Continue,
    Step,
    Metrics,
    History,
    TimeTravel(usize),
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next().unwrap_or("");
    match cmd {
        "c" => Ok(Command::Continue),
        "s" => Ok(Command::Step),
        "m" => Ok(Command::Metrics),
        "h" => Ok(Command::History),
        "q" => Ok(Command::Quit),
        "t" => parts
            .next()
            .and_then(|i| i.parse().ok())
            .map(Command::TimeTravel)
            .ok_or_else(|| "usage: t <index>".to_string()),
        "" => Err("commands: c, s, m, h, t <index>, q".into()),
        other => Err(format!("unknown command `{other}` (c, s, m, h, t <index>, q)")),
    }
}

pub async fn run(
    config: &AppConfig,
    workflow_path: &Path,
    input: Option<&str>,
    breakpoints: &[String],
    trace_db: Option<PathBuf>,
) -> anyhow::Result<()> {
    let workflow = load_workflow(workflow_path)?;
    let input = parse_input(input)?;

    let debugger = Arc::new(DebugCoordinator::new());
    debugger.start_debugging().await;
    for raw in breakpoints {
        let (node_id, condition) = parse_breakpoint(raw);
        if workflow.node(&node_id).is_none() {
            tracing::warn!(node_id = %node_id, "breakpoint on unknown node");
        }
        debugger.add_breakpoint(&node_id, condition).await;
    }

    let orch = Arc::new(orchestrator(config)?.with_debugger(debugger.clone()));
    let walker = orch.clone();
    let mut walk = tokio::spawn(async move {
        walker.run_local(&workflow, input, &EchoExecutor).await
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let outcome = loop {
        tokio::select! {
            biased;
            joined = &mut walk => break joined?,
            _ = wait_for_pause(&debugger) => {}
        }

        if let Some(state) = debugger.current_state().await {
            eprintln!("paused at {} ({})", state.node_id, state.status.as_str());
        }
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            // stdin closed: run to completion.
            debugger.continue_execution().await;
            break walk.await?;
        };

        match parse_command(&line) {
            Ok(Command::Continue) => debugger.continue_execution().await,
            Ok(Command::Step) => debugger.step_over().await,
            Ok(Command::Metrics) => print_json(&debugger.performance_metrics().await)?,
            Ok(Command::History) => print_history(&debugger.history().await),
            Ok(Command::TimeTravel(index)) => match debugger.time_travel_to(index).await {
                Ok(()) => {
                    if let Some(state) = debugger.current_state().await {
                        print_json(&state)?;
                    }
                }
                Err(e) => eprintln!("{e}"),
            },
            Ok(Command::Quit) => {
                if let Some(current) = orch.current_execution().await {
                    orch.cancel(&current.execution_id).await?;
                }
                debugger.continue_execution().await;
                break walk.await?;
            }
            Err(message) => eprintln!("{message}"),
        }
    };

    let history = debugger.history().await;
    let result = orch.current_execution().await;
    if let Some(db) = trace_db {
        let store = TraceStore::open(&db)?;
        if let Some(result) = &result {
            store.insert_states(&result.execution_id, &history)?;
            store.insert_run(result)?;
            tracing::info!(session = %result.execution_id, db = %db.display(), "debug session saved");
        }
    }

    print_json(&debugger.performance_metrics().await)?;
    match outcome {
        Ok(result) => print_json(&result),
        Err(e) => Err(e.into()),
    }
}

async fn wait_for_pause(debugger: &DebugCoordinator) {
    while !debugger.is_paused().await {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn print_history(history: &[ExecutionState]) {
    for (i, state) in history.iter().enumerate() {
        let duration = state
            .duration_ms
            .map(|ms| format!(" {ms}ms"))
            .unwrap_or_default();
        println!(
            "{i:>4}  {}  {:<8} {}{duration}",
            state.timestamp.format("%H:%M:%S%.3f"),
            state.status.as_str(),
            state.node_id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert!(matches!(parse_command("c"), Ok(Command::Continue)));
        assert!(matches!(parse_command(" t 3 "), Ok(Command::TimeTravel(3))));
        assert!(parse_command("t").is_err());
        assert!(parse_command("t x").is_err());
        assert!(parse_command("jump").is_err());
    }
}
