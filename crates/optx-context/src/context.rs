//! # Optimizer Context
//!
//! [`OptimizerContext`] is the per-query state hub of the optimizer. Every rule, every
//! scheduled task and the plan selection phase reach the state they share through it:
//!
//! - the **collaborators** owned by the query driver: the memo, the column factory and the
//!   catalog, forwarded as shared handles;
//! - the **per-query allocations** made at construction: the rule set, the task scheduler,
//!   the stopwatch and the (empty) list of materialized-view candidates;
//! - the **session binding**: query id, session variables and the optional dump sink;
//! - the **derived CTE policy**, computed once from session variables;
//! - the **task handoff slot**, naming the task currently running.
//!
//! ## Ownership
//!
//! A context belongs to the single thread driving one query's optimization, which passes
//! it around as `&mut OptimizerContext`. Mutation of the candidate list, the handoff slot
//! and the CTE bookkeeping therefore needs exclusive access. The query id is `Copy` and
//! [`OptimizerContext::elapsed_tracker`] hands out a clone of the stopwatch, so diagnostic
//! code on other threads can read both without touching the context.
//!
//! ## Timeout Guard
//!
//! The search is bounded by the `new_planner_optimize_timeout` session variable. The
//! budget is read from the session variables on every check, so a change made by an
//! operator mid-query takes effect at the next check. The CTE policy is the opposite: it is
//! derived once and never refreshed. Both behaviors are intended.
//!
//! `check_timeout` is the only point where an optimization can be cut short. The task
//! loop in [`crate::task::execute_tasks`] calls it before every dispatch.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::catalog::{Catalog, InMemoryCatalog, TableId};
use crate::clock::{Clock, MonotonicClock, Stopwatch};
use crate::column::SharedColumnRefFactory;
use crate::config::OptimizerConfig;
use crate::cte::CteContext;
use crate::dump::SharedDumpInfo;
use crate::error::{OptimizerError, Result};
use crate::materialization::MaterializationContext;
use crate::memo::{RootWatch, SharedMemo};
use crate::rule::{Rule, RuleSet, RuleType};
use crate::session::{ConnectContext, SessionVariables, SharedSessionVariables};
use crate::task::{SeriallyTaskScheduler, TaskContext, TaskScheduler};

/// Where the search was when the timeout guard tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanningPhase {
    /// No root group in the memo yet: still rewriting the logical plan.
    Logical,
    /// The memo has a root group: Cascades search is under way.
    Memo,
}

impl fmt::Display for PlanningPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logical => write!(f, "logical"),
            Self::Memo => write!(f, "memo"),
        }
    }
}

/// How a context is tied to a client session.
#[derive(Debug, Clone)]
pub enum SessionBinding {
    /// No session: default session variables and a fresh random query id. The CTE policy
    /// stays at its baseline (reuse disabled).
    Detached,
    /// Bound to an active connection: its query id, its live session variables and its
    /// dump sink. The CTE policy is derived from the session variables.
    Connected(ConnectContext),
}

/// Everything needed to build an [`OptimizerContext`].
///
/// The memo, column factory and catalog are owned by the query driver and must outlive the
/// context; the context only keeps shared handles to them.
pub struct OptimizerContextDeps {
    pub memo: Option<SharedMemo>,
    pub column_ref_factory: SharedColumnRefFactory,
    pub catalog: Arc<dyn Catalog>,
    pub session: SessionBinding,
    pub optimizer_config: OptimizerConfig,
    pub rule_set: RuleSet,
    pub clock: Arc<dyn Clock>,
}

impl OptimizerContextDeps {
    /// Detached session, no memo, default config, empty rule set, real clock.
    pub fn new(column_ref_factory: SharedColumnRefFactory, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            memo: None,
            column_ref_factory,
            catalog,
            session: SessionBinding::Detached,
            optimizer_config: OptimizerConfig::default_config(),
            rule_set: RuleSet::new(),
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    /// Dependencies for exercising a memo in isolation: a detached session and an empty
    /// in-memory catalog.
    pub fn for_testing(memo: SharedMemo, column_ref_factory: SharedColumnRefFactory) -> Self {
        Self::new(column_ref_factory, Arc::new(InMemoryCatalog::new())).with_memo(memo)
    }

    pub fn with_memo(mut self, memo: SharedMemo) -> Self {
        self.memo = Some(memo);
        self
    }

    pub fn with_connect_context(mut self, connect_context: ConnectContext) -> Self {
        self.session = SessionBinding::Connected(connect_context);
        self
    }

    pub fn with_optimizer_config(mut self, optimizer_config: OptimizerConfig) -> Self {
        self.optimizer_config = optimizer_config;
        self
    }

    pub fn with_rule_set(mut self, rule_set: RuleSet) -> Self {
        self.rule_set = rule_set;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

pub struct OptimizerContext {
    query_id: Uuid,
    memo: Option<SharedMemo>,
    root_watch: Option<RootWatch>,
    rule_set: RuleSet,
    catalog: Arc<dyn Catalog>,
    task_scheduler: Box<dyn TaskScheduler>,
    column_ref_factory: SharedColumnRefFactory,
    session_variables: SharedSessionVariables,
    dump_info: Option<SharedDumpInfo>,
    cte_context: CteContext,
    current_task: Option<Arc<TaskContext>>,
    optimizer_config: OptimizerConfig,
    candidate_mvs: Vec<MaterializationContext>,
    update_table_id: Option<TableId>,
    enable_left_right_join_equivalence_derive: bool,
    stopwatch: Stopwatch,
}

impl OptimizerContext {
    /// Builds the context for one optimization attempt. Never fails.
    pub fn new(deps: OptimizerContextDeps) -> Self {
        let stopwatch = Stopwatch::start(deps.clock);
        let (binding, query_id, session_variables, dump_info, cte_context) = match deps.session {
            SessionBinding::Detached => (
                "detached",
                Uuid::new_v4(),
                SessionVariables::default().into_shared(),
                None,
                CteContext::default(),
            ),
            SessionBinding::Connected(connect_context) => {
                let cte_context =
                    CteContext::from_session_variables(&connect_context.session_variables().read());
                (
                    "connected",
                    connect_context.query_id(),
                    connect_context.session_variables().clone(),
                    connect_context.dump_info().cloned(),
                    cte_context,
                )
            }
        };

        debug!(
            %query_id,
            binding,
            enable_cte = cte_context.is_enable_cte(),
            inline_cte_ratio = cte_context.inline_cte_ratio(),
            max_cte_limit = cte_context.max_cte_limit(),
            rules = deps.rule_set.len(),
            "created optimizer context"
        );

        let root_watch = deps.memo.as_ref().map(|memo| memo.read().root_watch());

        Self {
            query_id,
            memo: deps.memo,
            root_watch,
            rule_set: deps.rule_set,
            catalog: deps.catalog,
            task_scheduler: Box::new(SeriallyTaskScheduler::new()),
            column_ref_factory: deps.column_ref_factory,
            session_variables,
            dump_info,
            cte_context,
            current_task: None,
            optimizer_config: deps.optimizer_config,
            candidate_mvs: Vec::new(),
            update_table_id: None,
            enable_left_right_join_equivalence_derive: true,
            stopwatch,
        }
    }

    /// Context for exercising a memo in isolation, without a session.
    pub fn for_testing(memo: SharedMemo, column_ref_factory: SharedColumnRefFactory) -> Self {
        Self::new(OptimizerContextDeps::for_testing(memo, column_ref_factory))
    }

    pub fn query_id(&self) -> Uuid {
        self.query_id
    }

    pub fn memo(&self) -> Option<&SharedMemo> {
        self.memo.as_ref()
    }

    pub fn rule_set(&self) -> &RuleSet {
        &self.rule_set
    }

    pub fn rule_set_mut(&mut self) -> &mut RuleSet {
        &mut self.rule_set
    }

    /// Rules of `rule_type` not disabled by the optimizer config, in registration order.
    pub fn enabled_rules(&self, rule_type: RuleType) -> Vec<Arc<dyn Rule>> {
        self.rule_set
            .rules_of_type(rule_type)
            .into_iter()
            .filter(|rule| !self.optimizer_config.is_rule_disabled(rule.name()))
            .collect()
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn task_scheduler(&self) -> &dyn TaskScheduler {
        self.task_scheduler.as_ref()
    }

    pub fn task_scheduler_mut(&mut self) -> &mut dyn TaskScheduler {
        self.task_scheduler.as_mut()
    }

    pub fn column_ref_factory(&self) -> &SharedColumnRefFactory {
        &self.column_ref_factory
    }

    pub fn session_variables(&self) -> &SharedSessionVariables {
        &self.session_variables
    }

    /// Points the context at a different set of session variables. The new budget applies
    /// from the next timeout check; the CTE policy is left as it was.
    pub fn set_session_variables(&mut self, session_variables: SharedSessionVariables) {
        self.session_variables = session_variables;
    }

    pub fn dump_info(&self) -> Option<&SharedDumpInfo> {
        self.dump_info.as_ref()
    }

    pub fn cte_context(&self) -> &CteContext {
        &self.cte_context
    }

    /// Mutable access for CTE producer/consumer bookkeeping. The reuse knobs themselves
    /// cannot be changed through it.
    pub fn cte_context_mut(&mut self) -> &mut CteContext {
        &mut self.cte_context
    }

    pub fn set_task_context(&mut self, task: Option<Arc<TaskContext>>) {
        self.current_task = task;
    }

    pub fn task_context(&self) -> Option<&Arc<TaskContext>> {
        self.current_task.as_ref()
    }

    pub fn optimizer_config(&self) -> &OptimizerConfig {
        &self.optimizer_config
    }

    /// Materialized-view candidates in the order they were discovered.
    pub fn candidate_mvs(&self) -> &[MaterializationContext] {
        &self.candidate_mvs
    }

    pub fn add_candidate_mv(&mut self, candidate: MaterializationContext) {
        trace!(query_id = %self.query_id, mv = %candidate.mv, "adding mv candidate");
        self.candidate_mvs.push(candidate);
    }

    pub fn set_enable_left_right_join_equivalence_derive(&mut self, enable: bool) {
        self.enable_left_right_join_equivalence_derive = enable;
    }

    pub fn is_enable_left_right_join_equivalence_derive(&self) -> bool {
        self.enable_left_right_join_equivalence_derive
    }

    /// Records the target table of the statement being planned, if it writes one.
    pub fn set_update_table_id(&mut self, table_id: Option<TableId>) {
        self.update_table_id = table_id;
    }

    pub fn update_table_id(&self) -> Option<TableId> {
        self.update_table_id
    }

    pub fn is_updating_table(&self, table_id: TableId) -> bool {
        self.update_table_id == Some(table_id)
    }

    /// Milliseconds since the context was created.
    pub fn elapsed_millis(&self) -> u64 {
        self.stopwatch.elapsed_millis()
    }

    /// A handle on the context's stopwatch that can be sent to other threads.
    pub fn elapsed_tracker(&self) -> Stopwatch {
        self.stopwatch.clone()
    }

    fn budget_millis(&self) -> u64 {
        self.session_variables.read().new_planner_optimize_timeout
    }

    /// Whether the elapsed time is strictly past the budget.
    pub fn reached_timeout(&self) -> bool {
        self.elapsed_millis() > self.budget_millis()
    }

    /// `Memo` once the memo has a resolvable root group, `Logical` before that.
    ///
    /// Never takes the memo lock, so it is safe to call while the memo is held for writing.
    pub fn planning_phase(&self) -> PlanningPhase {
        match &self.root_watch {
            Some(watch) if watch.is_resolved() => PlanningPhase::Memo,
            _ => PlanningPhase::Logical,
        }
    }

    /// Fails with [`OptimizerError::BudgetExceeded`] once the budget has been overrun.
    /// Keeps failing on every later call.
    pub fn check_timeout(&self) -> Result<()> {
        let elapsed_ms = self.elapsed_millis();
        let budget_ms = self.budget_millis();
        if elapsed_ms <= budget_ms {
            return Ok(());
        }

        let phase = self.planning_phase();
        warn!(
            query_id = %self.query_id,
            elapsed_ms,
            budget_ms,
            %phase,
            task = self.current_task.as_deref().map(|t| t.name.as_str()),
            "optimizer timeout"
        );
        let err = OptimizerError::budget_exceeded(elapsed_ms, budget_ms, phase);
        if let Some(dump_info) = &self.dump_info {
            dump_info.lock().add_exception(err.to_string());
        }
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableRef;
    use crate::clock::ManualClock;
    use crate::column::ColumnRefFactory;
    use crate::dump::QueryDumpInfo;
    use crate::memo::{Memo, MemoExpr};
    use std::time::Duration;

    fn connected(vars: SessionVariables, clock: Arc<ManualClock>) -> OptimizerContext {
        let conn = ConnectContext::new(vars.into_shared());
        let deps = OptimizerContextDeps::new(
            ColumnRefFactory::new().into_shared(),
            Arc::new(InMemoryCatalog::new()),
        )
        .with_connect_context(conn)
        .with_clock(clock);
        OptimizerContext::new(deps)
    }

    #[test]
    fn test_detached_context_defaults() {
        let ctx = OptimizerContext::for_testing(
            Memo::new().into_shared(),
            ColumnRefFactory::new().into_shared(),
        );
        assert_eq!(
            ctx.session_variables().read().clone(),
            SessionVariables::default()
        );
        assert_eq!(ctx.cte_context(), &CteContext::default());
        assert!(ctx.dump_info().is_none());
        assert!(ctx.candidate_mvs().is_empty());
        assert!(ctx.task_context().is_none());
        assert!(ctx.task_scheduler().is_empty());
        assert!(ctx.is_enable_left_right_join_equivalence_derive());
        assert_eq!(ctx.update_table_id(), None);
    }

    #[test]
    fn test_connected_context_takes_session_identity() {
        let shared = SessionVariables::default().into_shared();
        let dump = QueryDumpInfo::new("select 1").into_shared();
        let conn = ConnectContext::new(shared.clone()).with_dump_info(dump.clone());
        let query_id = conn.query_id();
        let ctx = OptimizerContext::new(
            OptimizerContextDeps::new(
                ColumnRefFactory::new().into_shared(),
                Arc::new(InMemoryCatalog::new()),
            )
            .with_connect_context(conn),
        );
        assert_eq!(ctx.query_id(), query_id);
        assert!(Arc::ptr_eq(ctx.session_variables(), &shared));
        assert!(Arc::ptr_eq(ctx.dump_info().unwrap(), &dump));
        assert!(ctx.cte_context().is_enable_cte());
    }

    #[test]
    fn test_reached_timeout_is_strictly_greater() {
        let clock = Arc::new(ManualClock::new());
        let vars = SessionVariables {
            new_planner_optimize_timeout: 10,
            ..Default::default()
        };
        let ctx = connected(vars, clock.clone());

        clock.advance(Duration::from_millis(10));
        assert!(!ctx.reached_timeout());
        assert!(ctx.check_timeout().is_ok());

        clock.advance(Duration::from_millis(1));
        assert!(ctx.reached_timeout());
        assert!(ctx.check_timeout().is_err());
        // Still failing on the next call.
        assert!(ctx.check_timeout().unwrap_err().is_budget_exceeded());
    }

    #[test]
    fn test_budget_is_read_live_but_cte_policy_is_not() {
        let clock = Arc::new(ManualClock::new());
        let ctx = connected(SessionVariables::default(), clock.clone());
        clock.advance(Duration::from_millis(50));
        assert!(!ctx.reached_timeout());

        {
            let mut vars = ctx.session_variables().write();
            vars.new_planner_optimize_timeout = 20;
            vars.cbo_cte_reuse = false;
            vars.cbo_cte_max_limit = 1;
        }
        assert!(ctx.reached_timeout());
        assert!(ctx.cte_context().is_enable_cte());
        assert_eq!(ctx.cte_context().max_cte_limit(), 10);
    }

    #[test]
    fn test_set_session_variables_changes_budget_only() {
        let clock = Arc::new(ManualClock::new());
        let mut ctx = connected(SessionVariables::default(), clock.clone());
        clock.advance(Duration::from_millis(5));

        let replacement = SessionVariables {
            new_planner_optimize_timeout: 1,
            cbo_cte_reuse: false,
            ..Default::default()
        };
        ctx.set_session_variables(replacement.into_shared());
        assert!(ctx.reached_timeout());
        assert!(ctx.cte_context().is_enable_cte());
    }

    #[test]
    fn test_planning_phase_follows_memo_root() {
        let memo = Memo::new().into_shared();
        let ctx = OptimizerContext::for_testing(memo.clone(), ColumnRefFactory::new().into_shared());
        assert_eq!(ctx.planning_phase(), PlanningPhase::Logical);

        let root = memo.write().add_group(MemoExpr::new("Scan(t)", vec![]));
        assert_eq!(ctx.planning_phase(), PlanningPhase::Logical);
        memo.write().set_root_group(root);
        assert_eq!(ctx.planning_phase(), PlanningPhase::Memo);

        let no_memo = OptimizerContext::new(OptimizerContextDeps::new(
            ColumnRefFactory::new().into_shared(),
            Arc::new(InMemoryCatalog::new()),
        ));
        assert_eq!(no_memo.planning_phase(), PlanningPhase::Logical);
    }

    #[test]
    fn test_planning_phase_while_memo_is_write_locked() {
        let memo = Memo::new().into_shared();
        let clock = Arc::new(ManualClock::new());
        let ctx = OptimizerContext::new(
            OptimizerContextDeps::for_testing(memo.clone(), ColumnRefFactory::new().into_shared())
                .with_clock(clock.clone()),
        );
        ctx.session_variables().write().new_planner_optimize_timeout = 0;
        clock.advance(Duration::from_millis(1));

        let mut guard = memo.write();
        let group = guard.add_group(MemoExpr::new("Scan(t)", vec![]));
        match ctx.check_timeout() {
            Err(OptimizerError::BudgetExceeded { phase, .. }) => {
                assert_eq!(phase, PlanningPhase::Logical)
            }
            other => panic!("unexpected result: {other:?}"),
        }

        guard.set_root_group(group);
        assert_eq!(ctx.planning_phase(), PlanningPhase::Memo);
    }

    #[test]
    fn test_timeout_is_recorded_in_dump() {
        let clock = Arc::new(ManualClock::new());
        let vars = SessionVariables {
            new_planner_optimize_timeout: 0,
            ..Default::default()
        }
        .into_shared();
        let dump = QueryDumpInfo::new("select * from t").into_shared();
        let conn = ConnectContext::new(vars).with_dump_info(dump.clone());
        let ctx = OptimizerContext::new(
            OptimizerContextDeps::new(
                ColumnRefFactory::new().into_shared(),
                Arc::new(InMemoryCatalog::new()),
            )
            .with_connect_context(conn)
            .with_clock(clock.clone()),
        );

        clock.advance(Duration::from_millis(3));
        assert!(ctx.check_timeout().is_err());
        let dump = dump.lock();
        assert_eq!(dump.exceptions.len(), 1);
        assert!(dump.exceptions[0].starts_with("optimizer used 3 ms in logical phase"));
    }

    #[test]
    fn test_update_table_and_join_equivalence_flags() {
        let mut ctx = connected(SessionVariables::default(), Arc::new(ManualClock::new()));
        ctx.set_update_table_id(Some(TableId(7)));
        assert!(ctx.is_updating_table(TableId(7)));
        assert!(!ctx.is_updating_table(TableId(8)));
        ctx.set_update_table_id(None);
        assert!(!ctx.is_updating_table(TableId(7)));

        ctx.set_enable_left_right_join_equivalence_derive(false);
        assert!(!ctx.is_enable_left_right_join_equivalence_derive());
    }

    #[test]
    fn test_candidate_mvs_keep_discovery_order() {
        let mut ctx = connected(SessionVariables::default(), Arc::new(ManualClock::new()));
        let mvs: Vec<_> = ["mv_a", "mv_b", "mv_a"]
            .iter()
            .enumerate()
            .map(|(i, name)| MaterializationContext::new(TableId(i as u64), TableRef::new("s", *name)))
            .collect();
        for mv in &mvs {
            ctx.add_candidate_mv(mv.clone());
        }
        assert_eq!(ctx.candidate_mvs(), mvs.as_slice());
    }
}
