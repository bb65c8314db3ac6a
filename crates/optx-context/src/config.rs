//! # Optimizer Configuration
//!
//! Per-optimization switches chosen by the query driver, as opposed to session variables
//! which the user controls. The driver picks a strategy and may switch off individual
//! rules, for example to plan a statement with a reduced rule set after a rule misbehaves.

use std::collections::HashSet;

/// How the plan is searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizerStrategy {
    /// Full Cascades search over the memo.
    #[default]
    CostBased,
    /// Only heuristic rewrites; the memo search is skipped.
    RuleBased,
}

#[derive(Debug, Clone, Default)]
pub struct OptimizerConfig {
    strategy: OptimizerStrategy,
    disabled_rules: HashSet<String>,
}

impl OptimizerConfig {
    pub fn new(strategy: OptimizerStrategy) -> Self {
        Self {
            strategy,
            disabled_rules: HashSet::new(),
        }
    }

    pub fn default_config() -> Self {
        Self::default()
    }

    pub fn strategy(&self) -> OptimizerStrategy {
        self.strategy
    }

    pub fn is_rule_based(&self) -> bool {
        self.strategy == OptimizerStrategy::RuleBased
    }

    pub fn disable_rule(&mut self, name: impl Into<String>) {
        self.disabled_rules.insert(name.into());
    }

    pub fn enable_rule(&mut self, name: &str) {
        self.disabled_rules.remove(name);
    }

    pub fn is_rule_disabled(&self, name: &str) -> bool {
        self.disabled_rules.contains(name)
    }
}
