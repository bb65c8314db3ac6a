//! # Session Variables and Connections
//!
//! Session variables are the tunables a user can change per connection with `SET`. The
//! optimizer reads a handful of them:
//!
//! - `new_planner_optimize_timeout`: the wall-clock budget of one optimization, in
//!   milliseconds. Read live by the timeout guard on every check.
//! - `cbo_cte_reuse`, `cbo_cte_reuse_rate`, `cbo_cte_max_limit`: the CTE reuse knobs. Read
//!   once, when the optimizer context derives its CTE policy.
//!
//! The variables are shared through [`SharedSessionVariables`], so the connection and every
//! optimizer context it spawns look at the same values. The optimizer never writes them.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dump::SharedDumpInfo;

pub const DEFAULT_OPTIMIZE_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_CTE_REUSE_RATE: f64 = 1.15;
pub const DEFAULT_CTE_MAX_LIMIT: u32 = 10;

/// Optimizer-relevant session variables.
///
/// Parsing and validation of `SET` statements happens upstream; by the time values land
/// here they are trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionVariables {
    /// Optimization budget in milliseconds.
    pub new_planner_optimize_timeout: u64,
    /// Whether CTEs may be materialized once and reused.
    pub cbo_cte_reuse: bool,
    /// Cost ratio above which a CTE is inlined instead of reused.
    pub cbo_cte_reuse_rate: f64,
    /// Upper bound on the number of distinct CTEs that are materialized.
    pub cbo_cte_max_limit: u32,
}

impl Default for SessionVariables {
    fn default() -> Self {
        Self {
            new_planner_optimize_timeout: DEFAULT_OPTIMIZE_TIMEOUT_MS,
            cbo_cte_reuse: true,
            cbo_cte_reuse_rate: DEFAULT_CTE_REUSE_RATE,
            cbo_cte_max_limit: DEFAULT_CTE_MAX_LIMIT,
        }
    }
}

impl SessionVariables {
    pub fn into_shared(self) -> SharedSessionVariables {
        Arc::new(RwLock::new(self))
    }
}

/// Session variables shared between a connection and the contexts it creates.
pub type SharedSessionVariables = Arc<RwLock<SessionVariables>>;

/// An active client connection: the source of a query's identity, its session variables
/// and its dump sink.
#[derive(Debug, Clone)]
pub struct ConnectContext {
    query_id: Uuid,
    session_variables: SharedSessionVariables,
    dump_info: Option<SharedDumpInfo>,
}

impl ConnectContext {
    pub fn new(session_variables: SharedSessionVariables) -> Self {
        Self {
            query_id: Uuid::new_v4(),
            session_variables,
            dump_info: None,
        }
    }

    pub fn with_dump_info(mut self, dump_info: SharedDumpInfo) -> Self {
        self.dump_info = Some(dump_info);
        self
    }

    pub fn query_id(&self) -> Uuid {
        self.query_id
    }

    /// Assigns a fresh identity for the next statement on this connection.
    ///
    /// This is the query driver's hook for starting a new statement or retrying one. The
    /// optimizer never calls it: a context copies the id once, at construction.
    pub fn new_query_id(&mut self) -> Uuid {
        self.query_id = Uuid::new_v4();
        self.query_id
    }

    pub fn session_variables(&self) -> &SharedSessionVariables {
        &self.session_variables
    }

    pub fn dump_info(&self) -> Option<&SharedDumpInfo> {
        self.dump_info.as_ref()
    }
}
