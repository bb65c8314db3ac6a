//! # Memo Handle
//!
//! The memo is the search graph: groups of logically equivalent expressions, each
//! expression referring to its inputs by group id. The optimizer context does not search
//! it; it only forwards a shared handle to tasks and rules, and asks it one question when
//! the timeout guard trips: has a root group been established yet? A memo without a root
//! means the query never made it past logical rewriting.
//!
//! The root check must not block: the timeout guard can run inside a task that holds the
//! memo's write lock. Each memo therefore publishes whether its root resolves through a
//! [`RootWatch`], which the context reads without locking.
//!
//! Expressions are stored as opaque operator descriptions. The representation used by the
//! search itself lives with the rules that produce it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Unique identifier for a group in the memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(pub usize);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

/// An expression stored in a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoExpr {
    pub op: String,
    pub children: Vec<GroupId>,
}

impl MemoExpr {
    pub fn new(op: impl Into<String>, children: Vec<GroupId>) -> Self {
        Self {
            op: op.into(),
            children,
        }
    }
}

/// A set of logically equivalent expressions.
#[derive(Debug, Clone)]
pub struct Group {
    pub id: GroupId,
    pub exprs: Vec<MemoExpr>,
    /// Set once transformation rules have been fired for every expression in the group.
    pub explored: bool,
}

/// Lock-free view of whether a memo's root group resolves.
#[derive(Debug, Clone, Default)]
pub struct RootWatch(Arc<AtomicBool>);

impl RootWatch {
    pub fn is_resolved(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn publish(&self, resolved: bool) {
        self.0.store(resolved, Ordering::Release);
    }
}

#[derive(Debug, Default)]
pub struct Memo {
    groups: Vec<Group>,
    root: Option<GroupId>,
    root_watch: RootWatch,
}

/// Memo shared between the query driver, the optimizer context and running tasks.
pub type SharedMemo = Arc<RwLock<Memo>>;

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedMemo {
        Arc::new(RwLock::new(self))
    }

    /// Creates a new group holding `expr` and returns its id.
    pub fn add_group(&mut self, expr: MemoExpr) -> GroupId {
        let id = GroupId(self.groups.len());
        self.groups.push(Group {
            id,
            exprs: vec![expr],
            explored: false,
        });
        // A root set ahead of its group resolves once the group exists.
        self.root_watch.publish(self.root_group().is_some());
        id
    }

    /// Adds `expr` to an existing group. Duplicates are ignored; returns whether the
    /// expression was new, or `None` if the group does not exist.
    pub fn add_expr_to_group(&mut self, group_id: GroupId, expr: MemoExpr) -> Option<bool> {
        let group = self.groups.get_mut(group_id.0)?;
        if group.exprs.contains(&expr) {
            return Some(false);
        }
        group.exprs.push(expr);
        Some(true)
    }

    pub fn set_root_group(&mut self, group_id: GroupId) {
        self.root = Some(group_id);
        self.root_watch.publish(self.root_group().is_some());
    }

    /// A handle that reports root resolution without taking the memo lock.
    pub fn root_watch(&self) -> RootWatch {
        self.root_watch.clone()
    }

    /// The root group, if one has been set and it exists.
    pub fn root_group(&self) -> Option<&Group> {
        self.root.and_then(|id| self.groups.get(id.0))
    }

    pub fn group(&self, group_id: GroupId) -> Option<&Group> {
        self.groups.get(group_id.0)
    }

    pub fn group_mut(&mut self, group_id: GroupId) -> Option<&mut Group> {
        self.groups.get_mut(group_id.0)
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn num_exprs(&self) -> usize {
        self.groups.iter().map(|g| g.exprs.len()).sum()
    }
}
