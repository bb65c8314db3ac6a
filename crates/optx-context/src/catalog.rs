//! # Catalog Interface
//!
//! The catalog tells the optimizer which tables exist and what identifies them. The
//! optimizer context holds it as an explicit `Arc<dyn Catalog>` handed in by the driver;
//! nothing in this crate reaches for a process-wide metadata manager, so tests can plug in
//! an [`InMemoryCatalog`].
//!
//! Table ids matter to the context for one reason: while planning an `UPDATE` or `DELETE`,
//! rules must not rewrite reads of the target table against a materialized view, and the
//! context records the target by id (see `OptimizerContext::set_update_table_id`).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Reference to a table in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Catalog-assigned table identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId(pub u64);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Metadata the optimizer needs about a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    pub id: TableId,
    pub table: TableRef,
    pub columns: Vec<String>,
    /// Whether this table is a materialized view.
    pub is_materialized_view: bool,
}

/// Catalog provides table metadata.
pub trait Catalog: Send + Sync {
    fn get_table(&self, table: &TableRef) -> Option<TableMeta>;
    fn get_table_by_id(&self, id: TableId) -> Option<TableMeta>;
}

/// In-memory catalog for testing and development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    tables: HashMap<TableRef, TableMeta>,
    by_id: HashMap<TableId, TableRef>,
    next_id: u64,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table and returns its newly assigned id. Re-registering a table replaces
    /// its columns but keeps its id.
    pub fn add_table(&mut self, table: TableRef, columns: Vec<String>) -> TableId {
        self.insert(table, columns, false)
    }

    pub fn add_materialized_view(&mut self, table: TableRef, columns: Vec<String>) -> TableId {
        self.insert(table, columns, true)
    }

    fn insert(&mut self, table: TableRef, columns: Vec<String>, is_mv: bool) -> TableId {
        let id = match self.tables.get(&table) {
            Some(existing) => existing.id,
            None => {
                self.next_id += 1;
                TableId(self.next_id)
            }
        };
        self.by_id.insert(id, table.clone());
        self.tables.insert(
            table.clone(),
            TableMeta {
                id,
                table,
                columns,
                is_materialized_view: is_mv,
            },
        );
        id
    }
}

impl Catalog for InMemoryCatalog {
    fn get_table(&self, table: &TableRef) -> Option<TableMeta> {
        self.tables.get(table).cloned()
    }

    fn get_table_by_id(&self, id: TableId) -> Option<TableMeta> {
        self.by_id
            .get(&id)
            .and_then(|table| self.tables.get(table))
            .cloned()
    }
}
