//! Materialized-view rewrite candidates.
//!
//! While exploring the plan space, MV matching may find that part of the query can be
//! answered from a materialized view. Each such finding is recorded as a
//! [`MaterializationContext`] and appended to the optimizer context's candidate list.
//! Plan selection later walks that list in discovery order; when two rewrites cost the
//! same, the earlier one wins.

use crate::catalog::{TableId, TableRef};
use crate::column::ColumnRefId;
use crate::memo::GroupId;

#[derive(Debug, Clone, PartialEq)]
pub struct MaterializationContext {
    pub mv_id: TableId,
    pub mv: TableRef,
    /// The memo group the view can substitute for, when known.
    pub query_group: Option<GroupId>,
    /// Columns of the view that the rewrite reads.
    pub output_columns: Vec<ColumnRefId>,
}

impl MaterializationContext {
    pub fn new(mv_id: TableId, mv: TableRef) -> Self {
        Self {
            mv_id,
            mv,
            query_group: None,
            output_columns: Vec::new(),
        }
    }

    pub fn with_query_group(mut self, group_id: GroupId) -> Self {
        self.query_group = Some(group_id);
        self
    }

    pub fn with_output_columns(mut self, columns: Vec<ColumnRefId>) -> Self {
        self.output_columns = columns;
        self
    }
}
