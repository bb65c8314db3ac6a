//! # Rule System
//!
//! This module defines the rule trait and the per-query rule set that the optimizer
//! context carries.
//!
//! ## Rule Types
//!
//! - **Transformation rules** (`RuleType::Transformation`): rewrite a logical expression
//!   into an equivalent logical expression, adding alternatives to the same memo group.
//! - **Implementation rules** (`RuleType::Implementation`): map a logical expression to
//!   physical operators.
//!
//! ## Application
//!
//! Rules receive the optimizer context by `&mut` reference. Everything a rule needs, the
//! memo, the column factory, the CTE policy, the MV candidate list, is reached through it.
//! Matching is the rule's own business: a rule that does not apply to the group it is
//! handed simply returns `Ok(())`.
//!
//! Rules are stored as `Arc<dyn Rule>` so a task can hold on to the rule it is about to
//! fire while handing the context to it mutably.

use std::sync::Arc;

use crate::context::OptimizerContext;
use crate::error::Result;
use crate::memo::GroupId;

/// Classification of optimization rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleType {
    /// Logical → Logical transformation (e.g., join commutativity).
    Transformation,
    /// Logical → Physical implementation (e.g., join → hash join).
    Implementation,
}

/// A rule transforms or implements the expressions of a memo group.
pub trait Rule: Send + Sync {
    /// Unique name of this rule.
    fn name(&self) -> &str;

    /// Whether this rule is a transformation or implementation rule.
    fn rule_type(&self) -> RuleType;

    /// Apply the rule to the expressions of `group_id`.
    fn apply(&self, group_id: GroupId, ctx: &mut OptimizerContext) -> Result<()>;
}

/// The ordered set of rules available to one optimization.
#[derive(Default, Clone)]
pub struct RuleSet {
    rules: Vec<Arc<dyn Rule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, rule: Arc<dyn Rule>) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Rule>> {
        self.rules.iter().find(|r| r.name() == name).cloned()
    }

    /// Rules of the given type, in registration order.
    pub fn rules_of_type(&self, rule_type: RuleType) -> Vec<Arc<dyn Rule>> {
        self.rules
            .iter()
            .filter(|r| r.rule_type() == rule_type)
            .cloned()
            .collect()
    }

    pub fn transformation_rules(&self) -> Vec<Arc<dyn Rule>> {
        self.rules_of_type(RuleType::Transformation)
    }

    pub fn implementation_rules(&self) -> Vec<Arc<dyn Rule>> {
        self.rules_of_type(RuleType::Implementation)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
