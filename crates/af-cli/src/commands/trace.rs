//! Persisted session export.

use af_trace::{export::export_json, TraceQuery, TraceStore};
use std::path::Path;

pub fn export(db: &Path, session: Option<&str>) -> anyhow::Result<()> {
    let store = TraceStore::open(db)?;
    match session {
        Some(session) => {
            let states = store.query_states(&TraceQuery::session(session))?;
            if states.is_empty() {
                anyhow::bail!("no records for session {session}");
            }
            println!("{}", export_json(&states)?);
        }
        None => {
            for session in store.sessions()? {
                println!("{session}");
            }
        }
    }
    Ok(())
}
