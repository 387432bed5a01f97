//! Local step-wise walk: run nodes one at a time in topological order,
//! each through the debug coordinator.

use crate::RunnerError;
use af_core::execution::{ExecutionResult, ExecutionStatus};
use af_core::graph::{NodeDefinition, WorkflowDefinition};
use af_debug::DebugCoordinator;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// Executes the work of a single node.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, node: &NodeDefinition, inputs: Value) -> Result<Value, RunnerError>;
}

/// Dry-run executor: echoes the node type, config and inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoExecutor;

#[async_trait]
impl NodeExecutor for EchoExecutor {
    async fn execute(&self, node: &NodeDefinition, inputs: Value) -> Result<Value, RunnerError> {
        Ok(serde_json::json!({
            "node_type": node.node_type,
            "config": node.config,
            "inputs": inputs,
        }))
    }
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

/// Topological order by Kahn levels, keeping definition order inside a level.
///
/// Fails on edges that reference unknown nodes and on cycles.
pub fn execution_order(workflow: &WorkflowDefinition) -> Result<Vec<String>, RunnerError> {
    let position: HashMap<&str, usize> = workflow
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();
    if position.len() != workflow.nodes.len() {
        return Err(RunnerError::Scheduling("duplicate node id".into()));
    }

    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); workflow.nodes.len()];
    let mut in_degree = vec![0usize; workflow.nodes.len()];
    for edge in &workflow.edges {
        let (Some(&from), Some(&to)) = (
            position.get(edge.source.as_str()),
            position.get(edge.target.as_str()),
        ) else {
            return Err(RunnerError::Scheduling(format!(
                "edge {} references an unknown node ({} -> {})",
                edge.id, edge.source, edge.target
            )));
        };
        adj[from].push(to);
        in_degree[to] += 1;
    }

    let mut order = Vec::with_capacity(workflow.nodes.len());
    let mut level: Vec<usize> = (0..workflow.nodes.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();

    while !level.is_empty() {
        let mut next = Vec::new();
        for &i in &level {
            order.push(workflow.nodes[i].id.clone());
            for &j in &adj[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    next.push(j);
                }
            }
        }
        next.sort_unstable();
        level = next;
    }

    if order.len() != workflow.nodes.len() {
        let done: HashSet<&str> = order.iter().map(String::as_str).collect();
        let stuck: Vec<&str> = workflow
            .nodes
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| !done.contains(id))
            .collect();
        return Err(RunnerError::Scheduling(format!(
            "cycle detected involving: {}",
            stuck.join(", ")
        )));
    }
    Ok(order)
}

/// Assemble a node's input from upstream outputs.
///
/// Root nodes receive the run input. Otherwise each incoming edge contributes
/// one entry keyed by its target handle (or the source node id); when the
/// edge names a source handle present in the upstream output, only that
/// field is passed.
pub fn gather_inputs(
    workflow: &WorkflowDefinition,
    node_id: &str,
    outputs: &HashMap<String, Value>,
    run_input: &Map<String, Value>,
) -> Value {
    let mut incoming = workflow.incoming_edges(node_id).peekable();
    if incoming.peek().is_none() {
        return Value::Object(run_input.clone());
    }

    let mut inputs = Map::new();
    for edge in incoming {
        let Some(output) = outputs.get(&edge.source) else {
            continue;
        };
        let value = edge
            .source_handle
            .as_deref()
            .and_then(|handle| output.get(handle))
            .unwrap_or(output)
            .clone();
        let key = edge.target_handle.clone().unwrap_or_else(|| edge.source.clone());
        inputs.insert(key, value);
    }
    Value::Object(inputs)
}

// ---------------------------------------------------------------------------
// Walk
// ---------------------------------------------------------------------------

/// Outcome of a local walk. `failure` is set when a node failed.
#[derive(Debug)]
pub struct WalkReport {
    pub result: ExecutionResult,
    pub failure: Option<RunnerError>,
}

/// Run every node sequentially. `cancelled` is checked before each node.
pub async fn walk(
    execution_id: &str,
    workflow: &WorkflowDefinition,
    input: &Map<String, Value>,
    executor: &dyn NodeExecutor,
    debugger: &DebugCoordinator,
    cancelled: &AtomicBool,
) -> Result<WalkReport, RunnerError> {
    let order = execution_order(workflow)?;
    let mut result = ExecutionResult::running(execution_id, Utc::now());
    let mut outputs: HashMap<String, Value> = HashMap::new();
    let mut failure = None;

    for node_id in &order {
        if cancelled.load(Ordering::SeqCst) {
            tracing::info!(execution_id, node_id = %node_id, "walk cancelled before node");
            result.transition(ExecutionStatus::Cancelled);
            break;
        }
        let Some(node) = workflow.node(node_id) else {
            continue;
        };

        let inputs = gather_inputs(workflow, node_id, &outputs, input);
        let outcome = debugger
            .execute_node(node_id, Some(inputs.clone()), || executor.execute(node, inputs))
            .await;

        match outcome {
            Ok(output) => {
                result.set_node_result(node_id, output.clone());
                outputs.insert(node_id.clone(), output);
            }
            Err(e) => {
                tracing::error!(execution_id, node_id = %node_id, "node failed: {e}");
                let message = e.to_string();
                result.fail(format!("node {node_id} failed: {message}"));
                failure = Some(match e {
                    RunnerError::NodeExecution { .. } => e,
                    _ => RunnerError::NodeExecution {
                        node_id: node_id.clone(),
                        message,
                    },
                });
                break;
            }
        }
    }

    if !result.status.is_terminal() {
        // Sink outputs become the run results.
        let sinks: Map<String, Value> = workflow
            .nodes
            .iter()
            .filter(|n| !workflow.edges.iter().any(|e| e.source == n.id))
            .filter_map(|n| outputs.get(&n.id).map(|v| (n.id.clone(), v.clone())))
            .collect();
        result.results = Some(sinks);
        result.transition(ExecutionStatus::Completed);
    }

    Ok(WalkReport { result, failure })
}
