//! # Catalog Interface
//!
//! The catalog provides the enumerator with metadata about base relations:
//! relation-level and column-level statistics, and the CHECK constraints declared
//! on each relation. Statistics size scans and joins; constraints let the append
//! pushdown derive extra filters for the inner side of a join under an append.
//!
//! ## Trait Design
//!
//! The `Catalog` trait is minimal and used as a trait object (`dyn Catalog`) so
//! different backends can provide metadata. For testing and development,
//! `InMemoryCatalog` is populated programmatically.
//!
//! ## Key Lookups
//!
//! Relations are identified by their `RelId`:
//! - `relation_stats`: row count, total size and per-column statistics. Returns
//!   `None` if the relation is unknown.
//! - `relation_constraints`: CHECK constraints, written against the relation's own
//!   columns. Empty if there are none or the relation is unknown.

use crate::expr::{ColumnRef, Expr};
use crate::relids::RelId;
use crate::stats::{ColumnStatistics, Statistics};
use std::collections::HashMap;

/// Catalog provides statistics and constraint information.
pub trait Catalog: Send + Sync {
    fn relation_stats(&self, rel: RelId) -> Option<Statistics>;
    fn relation_constraints(&self, rel: RelId) -> Vec<Expr>;

    fn column_stats(&self, col: &ColumnRef) -> Option<ColumnStatistics> {
        self.relation_stats(col.rel)
            .and_then(|s| s.column_stats.get(&col.name).cloned())
    }
}

/// In-memory catalog for testing and development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    pub table_stats: HashMap<RelId, Statistics>,
    pub check_constraints: HashMap<RelId, Vec<Expr>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, rel: RelId, stats: Statistics) {
        self.table_stats.insert(rel, stats);
    }

    pub fn add_check_constraint(&mut self, rel: RelId, constraint: Expr) {
        self.check_constraints.entry(rel).or_default().push(constraint);
    }
}

impl Catalog for InMemoryCatalog {
    fn relation_stats(&self, rel: RelId) -> Option<Statistics> {
        self.table_stats.get(&rel).cloned()
    }

    fn relation_constraints(&self, rel: RelId) -> Vec<Expr> {
        self.check_constraints.get(&rel).cloned().unwrap_or_default()
    }

    fn column_stats(&self, col: &ColumnRef) -> Option<ColumnStatistics> {
        self.table_stats
            .get(&col.rel)
            .and_then(|s| s.column_stats.get(&col.name).cloned())
    }
}
