//! # optx-context: Per-Query Optimizer Execution Context
//!
//! This crate implements the mutable state hub that a Cascades-style cost-based optimizer
//! threads through every rule application and every scheduled search task while it
//! explores the plan space of a single query.
//!
//! One [`context::OptimizerContext`] is built per optimization attempt, handed by
//! `&mut` reference to the task scheduler loop, and dropped once a plan has been chosen or
//! the wall-clock budget has been exhausted. A retry always builds a fresh context.
//!
//! ## Module Overview
//!
//! - **`context`**: The optimizer context itself: construction, accessors and the
//!   timeout guard.
//! - **`clock`**: Monotonic clocks and the stopwatch that tracks optimizer elapsed time.
//! - **`session`**: Session variables and the connection that owns them.
//! - **`cte`**: The CTE reuse policy derived from session variables.
//! - **`materialization`**: Materialized-view rewrite candidates collected during search.
//! - **`task`**: Search tasks, the task scheduler and the dispatch loop.
//! - **`rule`**: The Rule trait and the per-query rule set.
//! - **`memo`**: The search graph handle shared with the context.
//! - **`column`**: The column reference allocator.
//! - **`catalog`**: Catalog trait for table metadata lookups.
//! - **`dump`**: Diagnostic query dump sink.
//! - **`config`**: Optimizer strategy configuration.
//! - **`error`**: Optimizer error types.

pub mod catalog;
pub mod clock;
pub mod column;
pub mod config;
pub mod context;
pub mod cte;
pub mod dump;
pub mod error;
pub mod materialization;
pub mod memo;
pub mod rule;
pub mod session;
pub mod task;

pub use context::{OptimizerContext, OptimizerContextDeps, PlanningPhase, SessionBinding};
pub use error::{OptimizerError, Result};
