//! Filters for debug record lookup.

use af_core::debug::NodeStatus;
use rusqlite::types::Value;

/// Query parameters for record lookup. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TraceQuery {
    pub session_id: Option<String>,
    pub node_id: Option<String>,
    pub status: Option<NodeStatus>,
    pub limit: Option<u32>,
}

impl TraceQuery {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }

    pub fn node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn status(mut self, status: NodeStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// `WHERE ... [LIMIT ?]` clause and its bound values.
    pub(crate) fn to_sql(&self) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        if let Some(session_id) = &self.session_id {
            clauses.push("session_id = ?");
            params.push(Value::Text(session_id.clone()));
        }
        if let Some(node_id) = &self.node_id {
            clauses.push("node_id = ?");
            params.push(Value::Text(node_id.clone()));
        }
        if let Some(status) = self.status {
            clauses.push("status = ?");
            params.push(Value::Text(status.as_str().to_string()));
        }

        let mut sql = String::new();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY session_id, seq");
        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            params.push(Value::Integer(i64::from(limit)));
        }
        (sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_filters_in_order() {
        let (sql, params) = TraceQuery::session("s1")
            .status(NodeStatus::Error)
            .limit(5)
            .to_sql();
        assert_eq!(
            sql,
            " WHERE session_id = ? AND status = ? ORDER BY session_id, seq LIMIT ?"
        );
        assert_eq!(
            params,
            vec![
                Value::Text("s1".into()),
                Value::Text("error".into()),
                Value::Integer(5)
            ]
        );
    }

    #[test]
    fn empty_query_matches_all() {
        let (sql, params) = TraceQuery::default().to_sql();
        assert_eq!(sql, " ORDER BY session_id, seq");
        assert!(params.is_empty());
    }
}
