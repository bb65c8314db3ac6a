//! # Search Tasks and Scheduling
//!
//! The Cascades search is broken into small units of work ("tasks"): explore a group, fire
//! a rule on a group, and so on. Executing a task may produce follow-up tasks. A
//! [`TaskScheduler`] keeps the pending tasks and [`execute_tasks`] drains it.
//!
//! ## Dispatch Loop
//!
//! [`execute_tasks`] is where the optimizer's wall-clock budget is enforced. Before every
//! dispatch it calls `OptimizerContext::check_timeout`; an overrun aborts the loop with
//! `OptimizerError::BudgetExceeded`, leaving the remaining tasks unexecuted. The check runs
//! per task, so a query that blows its budget is stopped within one task's worth of work.
//!
//! Right before a task runs, the loop publishes a [`TaskContext`] describing it in the
//! context's handoff slot, so code running inside the task can see which task it belongs
//! to without the task being threaded through every call. The slot is cleared once the
//! scheduler runs dry. On error it is left as is, naming the last task dispatched.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::context::OptimizerContext;
use crate::error::{OptimizerError, Result};
use crate::memo::GroupId;
use crate::rule::{Rule, RuleType};

/// Describes the task currently holding the context's attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    pub name: String,
    pub group_id: Option<GroupId>,
    /// Optimizer elapsed time when the task was dispatched.
    pub dispatched_at_ms: u64,
}

impl TaskContext {
    pub fn new(name: impl Into<String>, group_id: Option<GroupId>, dispatched_at_ms: u64) -> Self {
        Self {
            name: name.into(),
            group_id,
            dispatched_at_ms,
        }
    }
}

impl fmt::Display for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.group_id {
            Some(group_id) => {
                write!(f, "{} on {} at {} ms", self.name, group_id, self.dispatched_at_ms)
            }
            None => write!(f, "{} at {} ms", self.name, self.dispatched_at_ms),
        }
    }
}

pub trait Task: Send {
    /// Runs the task and returns its follow-up tasks.
    fn execute(&self, ctx: &mut OptimizerContext) -> Result<Vec<Box<dyn Task>>>;

    fn describe(&self) -> String;

    /// The memo group this task works on, if any.
    fn group_id(&self) -> Option<GroupId> {
        None
    }
}

/// Holds the pending tasks of one optimization.
pub trait TaskScheduler: Send {
    fn push_task(&mut self, task: Box<dyn Task>);

    /// Removes and returns the next task to run.
    fn pop_task(&mut self) -> Option<Box<dyn Task>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs tasks one at a time, most recently pushed first.
#[derive(Default)]
pub struct SeriallyTaskScheduler {
    tasks: Vec<Box<dyn Task>>,
}

impl SeriallyTaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskScheduler for SeriallyTaskScheduler {
    fn push_task(&mut self, task: Box<dyn Task>) {
        self.tasks.push(task);
    }

    fn pop_task(&mut self) -> Option<Box<dyn Task>> {
        self.tasks.pop()
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }
}

/// Drains the context's scheduler, checking the timeout before every dispatch.
///
/// A task is only popped once the check has passed, so after an abort the scheduler
/// still holds every task that never ran.
///
/// Follow-up tasks returned by a task run in the order they were returned, ahead of any
/// task that was already pending. Returns the number of tasks executed.
pub fn execute_tasks(ctx: &mut OptimizerContext) -> Result<usize> {
    debug!(
        query_id = %ctx.query_id(),
        pending = ctx.task_scheduler().len(),
        "executing optimizer tasks"
    );
    let mut executed = 0;
    while !ctx.task_scheduler().is_empty() {
        ctx.check_timeout()?;
        let Some(task) = ctx.task_scheduler_mut().pop_task() else {
            break;
        };

        let task_ctx = TaskContext::new(task.describe(), task.group_id(), ctx.elapsed_millis());
        trace!(task = %task_ctx, "dispatching task");
        ctx.set_task_context(Some(Arc::new(task_ctx)));

        let follow_ups = task.execute(ctx)?;
        for follow_up in follow_ups.into_iter().rev() {
            ctx.task_scheduler_mut().push_task(follow_up);
        }
        executed += 1;
    }
    ctx.set_task_context(None);
    debug!(
        query_id = %ctx.query_id(),
        executed,
        elapsed_ms = ctx.elapsed_millis(),
        "optimizer tasks finished"
    );
    Ok(executed)
}

/// Fires every enabled transformation rule on a group, once.
pub struct ExploreGroupTask {
    group_id: GroupId,
}

impl ExploreGroupTask {
    pub fn new(group_id: GroupId) -> Self {
        Self { group_id }
    }
}

impl Task for ExploreGroupTask {
    fn execute(&self, ctx: &mut OptimizerContext) -> Result<Vec<Box<dyn Task>>> {
        let memo = ctx.memo().cloned().ok_or_else(|| OptimizerError::Task {
            task: self.describe(),
            message: "no memo attached to the optimizer context".to_string(),
        })?;
        {
            let mut memo = memo.write();
            let group = memo.group_mut(self.group_id).ok_or_else(|| OptimizerError::Task {
                task: self.describe(),
                message: format!("unknown group {}", self.group_id),
            })?;
            if group.explored {
                trace!(group_id = %self.group_id, "group already explored, skipping");
                return Ok(vec![]);
            }
            group.explored = true;
        }

        let tasks = ctx
            .enabled_rules(RuleType::Transformation)
            .into_iter()
            .map(|rule| Box::new(ApplyRuleTask::new(self.group_id, rule)) as Box<dyn Task>)
            .collect();
        Ok(tasks)
    }

    fn describe(&self) -> String {
        format!("explore_group {}", self.group_id)
    }

    fn group_id(&self) -> Option<GroupId> {
        Some(self.group_id)
    }
}

/// Fires a single rule on a group.
pub struct ApplyRuleTask {
    group_id: GroupId,
    rule: Arc<dyn Rule>,
}

impl ApplyRuleTask {
    pub fn new(group_id: GroupId, rule: Arc<dyn Rule>) -> Self {
        Self { group_id, rule }
    }
}

impl Task for ApplyRuleTask {
    fn execute(&self, ctx: &mut OptimizerContext) -> Result<Vec<Box<dyn Task>>> {
        trace!(rule = self.rule.name(), group_id = %self.group_id, "applying rule");
        self.rule.apply(self.group_id, ctx)?;
        Ok(vec![])
    }

    fn describe(&self) -> String {
        format!("apply_rule {}", self.rule.name())
    }

    fn group_id(&self) -> Option<GroupId> {
        Some(self.group_id)
    }
}
