//! HTTP implementation of [`RemoteExecutor`] over reqwest.

use crate::config::ExecutorConfig;
use crate::executor::{ByteStream, ExecuteRequest, RemoteExecutor};
use crate::RunnerError;
use af_core::execution::{
    AsyncExecution, ExecutionResult, ExecutionStatus, ValidationReport,
};
use af_core::graph::WorkflowDefinition;
use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpExecutor {
    http_client: reqwest::Client,
    base_url: Url,
}

impl HttpExecutor {
    pub fn new(config: &ExecutorConfig) -> Result<Self, RunnerError> {
        let base_url = normalize_base(&config.base_url)?;
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| RunnerError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, RunnerError> {
        self.base_url
            .join(path)
            .map_err(|e| RunnerError::Config(format!("Invalid endpoint {path}: {e}")))
    }

    async fn post_json(&self, path: &str, body: &impl serde::Serialize) -> Result<Value, RunnerError> {
        let url = self.endpoint(path)?;
        tracing::debug!(%url, "POST");
        let response = self
            .http_client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| RunnerError::Transport(format!("POST {path} failed: {e}")))?;
        read_body(response).await
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, RunnerError> {
        let url = self.endpoint(path)?;
        tracing::debug!(%url, "GET");
        let response = self
            .http_client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| RunnerError::Transport(format!("GET {path} failed: {e}")))?;
        read_body(response).await
    }
}

#[async_trait]
impl RemoteExecutor for HttpExecutor {
    async fn execute(&self, request: &ExecuteRequest) -> Result<ExecutionResult, RunnerError> {
        let mut envelope = parse_envelope(self.post_json("execute", request).await?)?;
        take_field(&mut envelope, "result")
    }

    async fn execute_async(
        &self,
        request: &ExecuteRequest,
    ) -> Result<AsyncExecution, RunnerError> {
        let envelope = parse_envelope(self.post_json("execute-async", request).await?)?;
        serde_json::from_value(envelope)
            .map_err(|e| RunnerError::Decode(format!("execute-async reply: {e}")))
    }

    async fn execute_stream(&self, request: &ExecuteRequest) -> Result<ByteStream, RunnerError> {
        let url = self.endpoint("execute")?;
        tracing::debug!(%url, "POST (streaming)");
        let response = self
            .http_client
            .post(url)
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| RunnerError::Transport(format!("POST execute failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RunnerError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let chunks = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| RunnerError::Transport(format!("stream read failed: {e}")))
        });
        Ok(Box::pin(chunks))
    }

    async fn cancel(&self, execution_id: &str) -> Result<bool, RunnerError> {
        let reply = self
            .post_json(&format!("cancel/{execution_id}"), &serde_json::json!({}))
            .await?;
        if let Err(RunnerError::Remote(reason)) = parse_envelope(reply) {
            tracing::debug!(execution_id, reason = %reason, "cancel refused");
            return Ok(false);
        }
        Ok(true)
    }

    async fn status(&self, execution_id: &str) -> Result<ExecutionStatus, RunnerError> {
        let mut envelope =
            parse_envelope(self.get_json(&format!("status/{execution_id}"), &[]).await?)?;
        decode_status(take_field(&mut envelope, "status")?)
    }

    async fn validate(
        &self,
        workflow: &WorkflowDefinition,
    ) -> Result<ValidationReport, RunnerError> {
        let workflow_data = serde_json::to_string(workflow)
            .map_err(|e| RunnerError::Decode(format!("workflow serialization: {e}")))?;
        let reply = self
            .get_json("validate", &[("workflow_data", workflow_data)])
            .await?;
        serde_json::from_value(reply)
            .map_err(|e| RunnerError::Decode(format!("validation report: {e}")))
    }

    async fn templates(&self) -> Result<Value, RunnerError> {
        self.get_json("templates", &[]).await
    }

    async fn statistics(&self) -> Result<Value, RunnerError> {
        self.get_json("statistics", &[]).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Ensure the base URL ends with `/` so endpoint paths join beneath it.
fn normalize_base(raw: &str) -> Result<Url, RunnerError> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).map_err(|e| RunnerError::Config(format!("Invalid executor URL {raw}: {e}")))
}

async fn read_body(response: reqwest::Response) -> Result<Value, RunnerError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| RunnerError::Transport(format!("Failed to read response: {e}")))?;
    if !status.is_success() {
        return Err(RunnerError::Http {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|e| RunnerError::Decode(format!("Invalid JSON: {e}")))
}

/// Check the `{success, ...}` envelope. `success: false` becomes
/// [`RunnerError::Remote`]; a missing flag is treated as success.
fn parse_envelope(reply: Value) -> Result<Value, RunnerError> {
    if reply.get("success").and_then(Value::as_bool) == Some(false) {
        let message = reply
            .get("error")
            .map(|e| match e {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "unknown error".into());
        return Err(RunnerError::Remote(message));
    }
    Ok(reply)
}

fn take_field<T: DeserializeOwned>(envelope: &mut Value, field: &str) -> Result<T, RunnerError> {
    let value = envelope
        .get_mut(field)
        .map(Value::take)
        .ok_or_else(|| RunnerError::Decode(format!("reply has no `{field}`")))?;
    serde_json::from_value(value).map_err(|e| RunnerError::Decode(format!("`{field}`: {e}")))
}

/// The `status` reply field is either a bare status or a full result.
fn decode_status(mut status: Value) -> Result<ExecutionStatus, RunnerError> {
    if status.is_object() {
        return take_field(&mut status, "status");
    }
    serde_json::from_value(status).map_err(|e| RunnerError::Decode(format!("`status`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Orchestrator, OrchestratorConfig, RunOptions, RunOutcome};
    use af_core::execution::ExecutionMode;
    use mockito::{Matcher, Server};
    use std::sync::Arc;
    use serde_json::json;

    #[test]
    fn base_url_gets_trailing_slash() {
        let url = normalize_base("http://localhost:8000/api/workflows").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/workflows/");
        assert_eq!(
            url.join("cancel/abc").unwrap().as_str(),
            "http://localhost:8000/api/workflows/cancel/abc"
        );
        assert!(matches!(normalize_base("not a url"), Err(RunnerError::Config(_))));
    }

    #[test]
    fn envelope_failure_is_remote_error() {
        let err = parse_envelope(json!({"success": false, "error": "boom"})).unwrap_err();
        assert!(matches!(err, RunnerError::Remote(ref m) if m == "boom"));

        let ok = parse_envelope(json!({"success": true, "status": "running"})).unwrap();
        assert_eq!(ok["status"], "running");
    }

    #[test]
    fn take_field_decodes_typed_values() {
        let mut envelope = json!({"success": true, "status": "completed"});
        let status: ExecutionStatus = take_field(&mut envelope, "status").unwrap();
        assert_eq!(status, ExecutionStatus::Completed);

        let missing: Result<ExecutionStatus, _> = take_field(&mut envelope, "result");
        assert!(matches!(missing, Err(RunnerError::Decode(_))));
    }

    #[test]
    fn status_reply_may_be_a_full_result() {
        let full = json!({"execution_id": "r", "status": "failed", "start_time": "2024-01-01T00:00:00Z"});
        assert_eq!(decode_status(full).unwrap(), ExecutionStatus::Failed);
        assert_eq!(decode_status(json!("running")).unwrap(), ExecutionStatus::Running);
        assert!(matches!(decode_status(json!("bogus")), Err(RunnerError::Decode(_))));
    }

    #[test]
    fn execute_reply_result_decodes() {
        let mut envelope = json!({
            "success": true,
            "result": {
                "execution_id": "run-1",
                "status": "completed",
                "start_time": "2024-01-01T00:00:00Z",
                "end_time": "2024-01-01T00:00:02Z",
                "results": {"answer": 42}
            }
        });
        let result: ExecutionResult = take_field(&mut envelope, "result").unwrap();
        assert_eq!(result.execution_id, "run-1");
        assert_eq!(result.duration_ms(), Some(2000));
    }

    // -----------------------------------------------------------------------
    // Against a mock server
    // -----------------------------------------------------------------------

    fn executor(server: &Server) -> HttpExecutor {
        HttpExecutor::new(&ExecutorConfig {
            base_url: format!("{}/api/workflows", server.url()),
            ..Default::default()
        })
        .unwrap()
    }

    fn workflow() -> WorkflowDefinition {
        serde_json::from_value(json!({
            "id": "wf-1",
            "name": "demo",
            "nodes": [{"id": "a", "type": "llm", "config": {}}],
            "edges": []
        }))
        .unwrap()
    }

    fn request(mode: ExecutionMode) -> ExecuteRequest {
        ExecuteRequest::new(workflow(), serde_json::Map::new(), mode)
    }

    #[tokio::test]
    async fn execute_unwraps_result_envelope() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/workflows/execute")
            .match_body(Matcher::PartialJson(json!({"execution_mode": "blocking"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"success": true, "result": {
                    "execution_id": "run-1",
                    "status": "completed",
                    "start_time": "2024-01-01T00:00:00Z",
                    "results": {"answer": 42}
                }}"#,
            )
            .create_async()
            .await;

        let result = executor(&server)
            .execute(&request(ExecutionMode::Blocking))
            .await
            .unwrap();
        assert_eq!(result.execution_id, "run-1");
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.results.unwrap()["answer"], 42);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_http_error() {
        let mut server = Server::new_async().await;
        let _failing = server
            .mock("POST", "/api/workflows/execute")
            .with_status(503)
            .with_body("overloaded")
            .expect(2)
            .create_async()
            .await;
        let executor = executor(&server);

        let err = executor
            .execute(&request(ExecutionMode::Blocking))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Http { status: 503, ref body } if body == "overloaded"));

        let err = executor
            .execute_stream(&request(ExecutionMode::Streaming))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RunnerError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn cancel_reports_refusal_as_false() {
        let mut server = Server::new_async().await;
        let accepted = server
            .mock("POST", "/api/workflows/cancel/run-1")
            .with_status(200)
            .with_body(r#"{"success": true}"#)
            .create_async()
            .await;
        let _refused = server
            .mock("POST", "/api/workflows/cancel/run-2")
            .with_status(200)
            .with_body(r#"{"success": false, "error": "not running"}"#)
            .create_async()
            .await;
        let _broken = server
            .mock("POST", "/api/workflows/cancel/run-3")
            .with_status(500)
            .create_async()
            .await;
        let executor = executor(&server);

        assert!(executor.cancel("run-1").await.unwrap());
        accepted.assert_async().await;
        assert!(!executor.cancel("run-2").await.unwrap());
        assert!(matches!(
            executor.cancel("run-3").await,
            Err(RunnerError::Http { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn refused_cancel_leaves_deferred_run_running() {
        let mut server = Server::new_async().await;
        let _accepted = server
            .mock("POST", "/api/workflows/execute-async")
            .with_status(200)
            .with_body(r#"{"success": true, "execution_id": "run-2", "status_endpoint": "/status/run-2"}"#)
            .create_async()
            .await;
        let _refused = server
            .mock("POST", "/api/workflows/cancel/run-2")
            .with_status(200)
            .with_body(r#"{"success": false, "error": "already finishing"}"#)
            .create_async()
            .await;

        let orch = Orchestrator::new(Arc::new(executor(&server)), OrchestratorConfig::default());
        let outcome = orch
            .run(&workflow(), serde_json::Map::new(), RunOptions::mode(ExecutionMode::Deferred))
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Deferred(ref a) if a.execution_id == "run-2"));

        assert!(!orch.cancel("run-2").await.unwrap());
        assert_eq!(
            orch.current_execution().await.unwrap().status,
            ExecutionStatus::Running
        );
    }

    #[tokio::test]
    async fn validate_sends_workflow_as_query() {
        let mut server = Server::new_async().await;
        let encoded = serde_json::to_string(&workflow()).unwrap();
        let mock = server
            .mock("GET", "/api/workflows/validate")
            .match_query(Matcher::UrlEncoded("workflow_data".into(), encoded))
            .with_status(200)
            .with_body(r#"{"valid": false, "errors": ["no output node"]}"#)
            .create_async()
            .await;

        let report = executor(&server).validate(&workflow()).await.unwrap();
        assert!(!report.valid);
        assert_eq!(report.errors, vec![json!("no output node")]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn streamed_run_completes_through_orchestrator() {
        let mut server = Server::new_async().await;
        let body = "data: {\"execution_id\":\"s-1\",\"type\":\"workflow_start\",\"data\":{}}\n\n\
            data: {\"execution_id\":\"s-1\",\"type\":\"node_start\",\"data\":{\"node_id\":\"a\"}}\n\n\
            data: {\"execution_id\":\"s-1\",\"type\":\"node_complete\",\"data\":{\"node_id\":\"a\",\"output\":{\"text\":\"hi\"}}}\n\n\
            data: {\"execution_id\":\"s-1\",\"type\":\"workflow_complete\",\"data\":{\"results\":{\"answer\":42}}}\n\n";
        let mock = server
            .mock("POST", "/api/workflows/execute")
            .match_header("accept", "text/event-stream")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let orch = Orchestrator::new(Arc::new(executor(&server)), OrchestratorConfig::default());
        let outcome = orch
            .run(&workflow(), serde_json::Map::new(), RunOptions::mode(ExecutionMode::Streaming))
            .await
            .unwrap();
        let RunOutcome::Completed(result) = outcome else {
            panic!("expected completed outcome");
        };
        assert_eq!(result.execution_id, "s-1");
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.node_results.unwrap()["a"]["text"], "hi");
        assert_eq!(orch.streaming_updates().await.len(), 4);
        mock.assert_async().await;
    }
}
