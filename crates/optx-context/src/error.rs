//! # Optimizer Errors
//!
//! The context itself produces exactly one kind of failure: [`OptimizerError::BudgetExceeded`],
//! raised by the timeout guard. It is fatal for the current optimization attempt and must
//! reach the query driver untouched; a retry is the driver's decision and requires a new
//! context.
//!
//! The remaining variants are produced by external collaborators (rules and tasks) and only
//! pass through the scheduler loop on their way out.

use thiserror::Error;

use crate::context::PlanningPhase;

/// Result type for optimizer operations.
pub type Result<T> = std::result::Result<T, OptimizerError>;

/// Likely reasons for a search running past its budget.
pub const BUDGET_EXCEEDED_CAUSES: &[&str] = &[
    "the process spent a long time in garbage collection or was descheduled",
    "fetching external table metadata took a long time",
    "the query is very complex",
];

/// Mitigations offered to the user when the budget is exceeded.
pub const BUDGET_EXCEEDED_HINTS: &[&str] = &[
    "reduce the complexity of the query",
    "try the query again",
    "enlarge the new_planner_optimize_timeout session variable",
];

#[derive(Debug, Error)]
pub enum OptimizerError {
    /// The search ran longer than the `new_planner_optimize_timeout` budget.
    #[error(
        "optimizer used {elapsed_ms} ms in {phase} phase (budget {budget_ms} ms). \
         This is probably because {}. You could {}",
        numbered(BUDGET_EXCEEDED_CAUSES),
        numbered(.hints)
    )]
    BudgetExceeded {
        elapsed_ms: u64,
        budget_ms: u64,
        phase: PlanningPhase,
        hints: &'static [&'static str],
    },

    #[error("rule {rule} failed: {message}")]
    Rule { rule: String, message: String },

    #[error("task {task} failed: {message}")]
    Task { task: String, message: String },
}

impl OptimizerError {
    pub fn budget_exceeded(elapsed_ms: u64, budget_ms: u64, phase: PlanningPhase) -> Self {
        Self::BudgetExceeded {
            elapsed_ms,
            budget_ms,
            phase,
            hints: BUDGET_EXCEEDED_HINTS,
        }
    }

    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, Self::BudgetExceeded { .. })
    }

    /// Whether the context may be reused to try again. Always false: a retry needs a
    /// fresh context with a fresh identity and stopwatch.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

fn numbered(items: &[&str]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join(", ")
}
