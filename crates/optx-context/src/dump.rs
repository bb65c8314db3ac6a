//! # Query Dump
//!
//! A query dump collects everything needed to reproduce a planning problem offline: the
//! statement text, the session variables it ran with, and the errors raised while planning
//! it. Dumps are opt-in per connection; a context without a dump sink simply skips
//! recording.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::SessionVariables;

/// Dump sink shared between a connection and the optimizer contexts it creates.
pub type SharedDumpInfo = Arc<Mutex<QueryDumpInfo>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDumpInfo {
    pub query_id: Option<Uuid>,
    pub original_sql: String,
    pub session_variables: Option<SessionVariables>,
    pub exceptions: Vec<String>,
}

impl QueryDumpInfo {
    pub fn new(original_sql: impl Into<String>) -> Self {
        Self {
            original_sql: original_sql.into(),
            ..Default::default()
        }
    }

    pub fn into_shared(self) -> SharedDumpInfo {
        Arc::new(Mutex::new(self))
    }

    pub fn set_query_id(&mut self, query_id: Uuid) {
        self.query_id = Some(query_id);
    }

    /// Stores a copy of the session variables as they are right now.
    pub fn set_session_variables(&mut self, vars: &SessionVariables) {
        self.session_variables = Some(vars.clone());
    }

    pub fn add_exception(&mut self, message: impl Into<String>) {
        self.exceptions.push(message.into());
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_to_json() {
        let mut dump = QueryDumpInfo::new("select 1");
        dump.set_session_variables(&SessionVariables::default());
        dump.add_exception("planner timeout");

        let json = dump.to_json().unwrap();
        let parsed: QueryDumpInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.original_sql, "select 1");
        assert_eq!(parsed.exceptions, vec!["planner timeout".to_string()]);
        assert_eq!(
            parsed.session_variables.unwrap().new_planner_optimize_timeout,
            3000
        );
    }
}
