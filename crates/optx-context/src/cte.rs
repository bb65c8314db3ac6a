//! # CTE Reuse Policy
//!
//! A common table expression referenced more than once can either be inlined at every
//! reference or computed once (a CTE "produce") and read back at every reference (a CTE
//! "consume"). [`CteContext`] holds the knobs the search consults when making that call,
//! plus bookkeeping about which CTEs exist and how often each is consumed.
//!
//! The knobs are derived from session variables once, when the optimizer context is built,
//! and stay fixed for the rest of the search. Changing `cbo_cte_reuse` mid-query has no
//! effect on a query that is already planning.

use std::collections::HashMap;

use crate::session::SessionVariables;

pub type CteId = u32;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CteContext {
    enable_cte: bool,
    inline_cte_ratio: f64,
    max_cte_limit: u32,
    produces: Vec<CteId>,
    consume_counts: HashMap<CteId, usize>,
}

impl CteContext {
    /// Derives the policy from the three CTE session variables.
    pub fn from_session_variables(vars: &SessionVariables) -> Self {
        let mut ctx = Self::default();
        ctx.reset();
        ctx.set_enable_cte(vars.cbo_cte_reuse);
        ctx.set_inline_cte_ratio(vars.cbo_cte_reuse_rate);
        ctx.set_max_cte_limit(vars.cbo_cte_max_limit);
        ctx
    }

    /// Returns the context to its baseline: reuse disabled, zero ratio and limit, and no
    /// registered CTEs.
    pub(crate) fn reset(&mut self) {
        self.enable_cte = false;
        self.inline_cte_ratio = 0.0;
        self.max_cte_limit = 0;
        self.produces.clear();
        self.consume_counts.clear();
    }

    pub fn is_enable_cte(&self) -> bool {
        self.enable_cte
    }

    pub(crate) fn set_enable_cte(&mut self, enable_cte: bool) {
        self.enable_cte = enable_cte;
    }

    pub fn inline_cte_ratio(&self) -> f64 {
        self.inline_cte_ratio
    }

    pub(crate) fn set_inline_cte_ratio(&mut self, ratio: f64) {
        self.inline_cte_ratio = ratio;
    }

    pub fn max_cte_limit(&self) -> u32 {
        self.max_cte_limit
    }

    pub(crate) fn set_max_cte_limit(&mut self, limit: u32) {
        self.max_cte_limit = limit;
    }

    /// Records that CTE `cte_id` has a producer. Registering twice is a no-op.
    pub fn add_cte_produce(&mut self, cte_id: CteId) {
        if !self.produces.contains(&cte_id) {
            self.produces.push(cte_id);
        }
    }

    /// CTE producers in registration order.
    pub fn cte_produces(&self) -> &[CteId] {
        &self.produces
    }

    pub fn add_cte_consume(&mut self, cte_id: CteId) {
        *self.consume_counts.entry(cte_id).or_default() += 1;
    }

    pub fn cte_consume_count(&self, cte_id: CteId) -> usize {
        self.consume_counts.get(&cte_id).copied().unwrap_or(0)
    }
}
