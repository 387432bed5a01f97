//! SQLite-backed storage for debug records and run results.

use crate::query::TraceQuery;
use crate::TraceError;
use af_core::debug::{ExecutionState, NodeStatus};
use af_core::execution::ExecutionResult;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Trace store backed by a single SQLite database.
/// Uses Mutex<Connection> for thread safety (rusqlite::Connection is !Sync).
pub struct TraceStore {
    conn: Mutex<Connection>,
}

impl TraceStore {
    /// Open (or create) the trace database at the given path.
    pub fn open(path: &Path) -> Result<Self, TraceError> {
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened trace store");
        Self::with_connection(conn)
    }

    /// Create an in-memory trace store (useful for testing).
    pub fn in_memory() -> Result<Self, TraceError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, TraceError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, TraceError> {
        self.conn
            .lock()
            .map_err(|e| TraceError::Database(e.to_string()))
    }

    fn initialize_schema(&self) -> Result<(), TraceError> {
        self.lock()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS debug_states (
                session_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                node_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                status TEXT NOT NULL,
                input_json TEXT,
                output_json TEXT,
                error TEXT,
                duration_ms INTEGER,
                resource_json TEXT,
                PRIMARY KEY (session_id, seq)
            );

            CREATE INDEX IF NOT EXISTS idx_debug_states_node
                ON debug_states(node_id);

            CREATE TABLE IF NOT EXISTS runs (
                execution_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                start_time TEXT NOT NULL,
                result_json TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Debug records
    // -----------------------------------------------------------------------

    /// Append one record to a session. Returns its sequence number.
    pub fn insert_state(&self, session_id: &str, state: &ExecutionState) -> Result<i64, TraceError> {
        let conn = self.lock()?;
        insert_state_row(&conn, session_id, state)
    }

    /// Append records to a session in one transaction, preserving order.
    pub fn insert_states(
        &self,
        session_id: &str,
        states: &[ExecutionState],
    ) -> Result<usize, TraceError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for state in states {
            insert_state_row(&tx, session_id, state)?;
        }
        tx.commit()?;
        tracing::debug!(session_id, count = states.len(), "stored debug records");
        Ok(states.len())
    }

    /// Records matching `query`, in append order within each session.
    pub fn query_states(&self, query: &TraceQuery) -> Result<Vec<ExecutionState>, TraceError> {
        let conn = self.lock()?;
        let (filter, params) = query.to_sql();
        let sql = format!(
            "SELECT node_id, timestamp, status, input_json, output_json,
                    error, duration_ms, resource_json
             FROM debug_states{filter}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
            Ok(RawStateRow {
                node_id: row.get(0)?,
                timestamp: row.get(1)?,
                status: row.get(2)?,
                input_json: row.get(3)?,
                output_json: row.get(4)?,
                error: row.get(5)?,
                duration_ms: row.get(6)?,
                resource_json: row.get(7)?,
            })
        })?;

        let mut states = Vec::new();
        for row in rows {
            states.push(raw_to_state(row?)?);
        }
        Ok(states)
    }

    /// Distinct session ids, oldest first.
    pub fn sessions(&self) -> Result<Vec<String>, TraceError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT session_id FROM debug_states
             GROUP BY session_id ORDER BY MIN(timestamp)",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<String>, _>>().map_err(Into::into)
    }

    // -----------------------------------------------------------------------
    // Run results
    // -----------------------------------------------------------------------

    /// Insert or replace the stored result for its execution id.
    pub fn insert_run(&self, result: &ExecutionResult) -> Result<(), TraceError> {
        let json = serde_json::to_string(result)
            .map_err(|e| TraceError::Export(format!("run {}: {e}", result.execution_id)))?;
        self.lock()?.execute(
            "INSERT INTO runs (execution_id, status, start_time, result_json)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(execution_id) DO UPDATE SET
                status = excluded.status,
                start_time = excluded.start_time,
                result_json = excluded.result_json",
            rusqlite::params![
                result.execution_id,
                result.status.to_string(),
                result.start_time.to_rfc3339(),
                json,
            ],
        )?;
        Ok(())
    }

    pub fn get_run(&self, execution_id: &str) -> Result<Option<ExecutionResult>, TraceError> {
        let json: Option<String> = self
            .lock()?
            .query_row(
                "SELECT result_json FROM runs WHERE execution_id = ?1",
                rusqlite::params![execution_id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| parse_run(&j)).transpose()
    }

    /// Most recently started runs first.
    pub fn recent_runs(&self, limit: u32) -> Result<Vec<ExecutionResult>, TraceError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT result_json FROM runs ORDER BY start_time DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit], |row| row.get::<_, String>(0))?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(parse_run(&row?)?);
        }
        Ok(runs)
    }
}

fn insert_state_row(
    conn: &Connection,
    session_id: &str,
    state: &ExecutionState,
) -> Result<i64, TraceError> {
    let seq: i64 = conn.query_row(
        "SELECT COALESCE(MAX(seq) + 1, 0) FROM debug_states WHERE session_id = ?1",
        rusqlite::params![session_id],
        |row| row.get(0),
    )?;
    let resource_json = state
        .resource_usage
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| TraceError::Export(e.to_string()))?;

    conn.execute(
        "INSERT INTO debug_states (
            session_id, seq, node_id, timestamp, status,
            input_json, output_json, error, duration_ms, resource_json
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            session_id,
            seq,
            state.node_id,
            state.timestamp.to_rfc3339(),
            state.status.as_str(),
            state.input.as_ref().map(|v| v.to_string()),
            state.output.as_ref().map(|v| v.to_string()),
            state.error,
            state.duration_ms,
            resource_json,
        ],
    )?;
    Ok(seq)
}

/// Internal row struct for SQLite queries.
struct RawStateRow {
    node_id: String,
    timestamp: String,
    status: String,
    input_json: Option<String>,
    output_json: Option<String>,
    error: Option<String>,
    duration_ms: Option<i64>,
    resource_json: Option<String>,
}

fn raw_to_state(raw: RawStateRow) -> Result<ExecutionState, TraceError> {
    let corrupt = |field: &str, e: String| TraceError::Corrupt(format!("{field}: {e}"));
    let json = |field: &str, text: Option<String>| {
        text.map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| corrupt(field, e.to_string()))
    };

    Ok(ExecutionState {
        timestamp: DateTime::parse_from_rfc3339(&raw.timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| corrupt("timestamp", e.to_string()))?,
        status: parse_status(&raw.status).ok_or_else(|| corrupt("status", raw.status.clone()))?,
        input: json("input_json", raw.input_json)?,
        output: json("output_json", raw.output_json)?,
        resource_usage: raw
            .resource_json
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| corrupt("resource_json", e.to_string()))?,
        node_id: raw.node_id,
        error: raw.error,
        duration_ms: raw.duration_ms,
    })
}

fn parse_status(s: &str) -> Option<NodeStatus> {
    [
        NodeStatus::Running,
        NodeStatus::Success,
        NodeStatus::Error,
        NodeStatus::Paused,
    ]
    .into_iter()
    .find(|status| status.as_str() == s)
}

fn parse_run(json: &str) -> Result<ExecutionResult, TraceError> {
    serde_json::from_str(json).map_err(|e| TraceError::Corrupt(format!("result_json: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_core::debug::ResourceUsage;
    use af_core::execution::ExecutionStatus;
    use chrono::Duration;
    use serde_json::json;

    fn record(node: &str, status: NodeStatus) -> ExecutionState {
        ExecutionState::new(node, status)
    }

    #[test]
    fn states_round_trip_in_order() {
        let store = TraceStore::in_memory().unwrap();
        let mut done = record("a", NodeStatus::Success)
            .with_input(Some(json!({"q": 1})))
            .with_output(json!({"text": "hi"}))
            .with_duration(12);
        done.resource_usage = Some(ResourceUsage {
            memory_bytes: Some(1024),
            cpu_percent: None,
        });

        store
            .insert_states("s1", &[record("a", NodeStatus::Running), done.clone()])
            .unwrap();
        assert_eq!(store.insert_state("s1", &record("b", NodeStatus::Running)).unwrap(), 2);
        assert_eq!(store.insert_state("s2", &record("a", NodeStatus::Running)).unwrap(), 0);

        let states = store.query_states(&TraceQuery::session("s1")).unwrap();
        assert_eq!(states.len(), 3);
        assert_eq!(states[1], done);
        assert_eq!(states[2].node_id, "b");
    }

    #[test]
    fn query_filters() {
        let store = TraceStore::in_memory().unwrap();
        store
            .insert_states(
                "s1",
                &[
                    record("a", NodeStatus::Running),
                    record("a", NodeStatus::Error).with_error("boom"),
                    record("b", NodeStatus::Running),
                ],
            )
            .unwrap();

        let errors = store
            .query_states(&TraceQuery::session("s1").status(NodeStatus::Error))
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error.as_deref(), Some("boom"));

        let a = store.query_states(&TraceQuery::default().node("a")).unwrap();
        assert_eq!(a.len(), 2);

        let first = store.query_states(&TraceQuery::session("s1").limit(1)).unwrap();
        assert_eq!(first[0].status, NodeStatus::Running);
        assert_eq!(store.sessions().unwrap(), vec!["s1".to_string()]);
    }

    #[test]
    fn runs_upsert_and_order() {
        let store = TraceStore::in_memory().unwrap();
        let t0 = Utc::now();
        let mut older = ExecutionResult::running("r1", t0);
        let newer = ExecutionResult::running("r2", t0 + Duration::seconds(5));
        store.insert_run(&older).unwrap();
        store.insert_run(&newer).unwrap();

        older.transition(ExecutionStatus::Completed);
        store.insert_run(&older).unwrap();

        let fetched = store.get_run("r1").unwrap().unwrap();
        assert_eq!(fetched.status, ExecutionStatus::Completed);
        assert!(store.get_run("missing").unwrap().is_none());

        let recent = store.recent_runs(10).unwrap();
        let ids: Vec<&str> = recent.iter().map(|r| r.execution_id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r1"]);
    }
}
