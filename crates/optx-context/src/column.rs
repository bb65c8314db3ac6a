//! Column reference allocation.
//!
//! Every column produced anywhere in a plan (scan outputs, projections, aggregates) gets a
//! query-wide unique [`ColumnRefId`] from the [`ColumnRefFactory`]. The factory is owned by
//! the query driver and outlives the optimizer context, which only forwards it.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnRefId(pub u32);

impl fmt::Display for ColumnRefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRefOperator {
    pub id: ColumnRefId,
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

impl fmt::Display for ColumnRefOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id.0, self.name)
    }
}

#[derive(Debug, Default)]
pub struct ColumnRefFactory {
    columns: Vec<ColumnRefOperator>,
}

pub type SharedColumnRefFactory = Arc<Mutex<ColumnRefFactory>>;

impl ColumnRefFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedColumnRefFactory {
        Arc::new(Mutex::new(self))
    }

    pub fn create(
        &mut self,
        name: impl Into<String>,
        data_type: impl Into<String>,
        nullable: bool,
    ) -> ColumnRefOperator {
        let column = ColumnRefOperator {
            id: ColumnRefId(self.columns.len() as u32 + 1),
            name: name.into(),
            data_type: data_type.into(),
            nullable,
        };
        self.columns.push(column.clone());
        column
    }

    pub fn get(&self, id: ColumnRefId) -> Option<&ColumnRefOperator> {
        // ids start at 1
        self.columns.get((id.0 as usize).checked_sub(1)?)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
