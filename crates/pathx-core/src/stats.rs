//! # Statistics and Selectivity
//!
//! This module defines the statistics the cost model reads and the estimation
//! formulas used to size join results, parameterized scans and unique-ified inputs.
//!
//! ## Statistics Hierarchy
//!
//! - **Relation-level**: row count and total size in bytes.
//! - **Column-level**: number of distinct values (NDV), null fraction, average width.
//!
//! ## Selectivity Estimation
//!
//! - **Equality between columns**: 1 / max(NDV_left, NDV_right), the containment
//!   assumption (the smaller domain is contained in the larger one).
//! - **Equality with a constant**: 1 / NDV, or 0.005 without statistics.
//! - **Range**: fixed 1/3 heuristic.
//! - **AND**: product (independence assumption). **OR**: inclusion-exclusion.
//! - **Default**: 0.1 (10%) when no better estimate is available.
//!
//! ## Group Counts
//!
//! The number of distinct groups over a set of expressions is the product of
//! their NDVs, capped by the input row count. Unique-ification uses it to size
//! its output.

use crate::catalog::Catalog;
use crate::expr::{BinaryOp, ColumnRef, Expr, ScalarValue, UnaryOp};
use crate::restrictinfo::RestrictInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Default filter selectivity when we can't determine it.
pub const DEFAULT_FILTER_SELECTIVITY: f64 = 0.1;
/// Selectivity of `col = const` without column statistics.
pub const DEFAULT_EQ_SEL: f64 = 0.005;
/// Selectivity of a range comparison.
pub const DEFAULT_INEQ_SEL: f64 = 1.0 / 3.0;
/// NDV assumed for a column without statistics.
pub const DEFAULT_NUM_DISTINCT: f64 = 200.0;

/// Statistics for a base relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub row_count: f64,
    pub total_size_bytes: f64,
    pub column_stats: HashMap<String, ColumnStatistics>,
}

impl Statistics {
    pub fn new(row_count: f64, total_size_bytes: f64) -> Self {
        Self {
            row_count,
            total_size_bytes,
            column_stats: HashMap::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, stats: ColumnStatistics) -> Self {
        self.column_stats.insert(name.into(), stats);
        self
    }

    /// Number of pages the relation occupies, at least one.
    pub fn pages(&self, page_size: f64) -> f64 {
        (self.total_size_bytes / page_size).ceil().max(1.0)
    }
}

/// Per-column statistics used for selectivity estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnStatistics {
    /// Number of distinct values (NDV). Used for equality selectivity: sel = 1/NDV.
    pub distinct_count: f64,
    /// Fraction of rows that are NULL [0.0, 1.0].
    pub null_fraction: f64,
    /// Average width of a value in bytes.
    pub avg_width: f64,
}

impl ColumnStatistics {
    pub fn new(distinct_count: f64, null_fraction: f64) -> Self {
        Self {
            distinct_count,
            null_fraction,
            avg_width: 8.0,
        }
    }
}

/// Round a row estimate and keep it at least 1.
pub fn clamp_row_est(rows: f64) -> f64 {
    if rows <= 1.0 {
        1.0
    } else {
        rows.round()
    }
}

fn column_ndv(catalog: &dyn Catalog, col: &ColumnRef) -> Option<f64> {
    catalog
        .column_stats(col)
        .map(|cs| cs.distinct_count.max(1.0))
}

/// Estimated fraction of rows satisfying `expr`.
pub fn clause_selectivity(expr: &Expr, catalog: &dyn Catalog) -> f64 {
    match expr {
        Expr::Literal(ScalarValue::Bool(true)) => 1.0,
        Expr::Literal(_) => 0.0,
        Expr::And(exprs) => exprs
            .iter()
            .map(|e| clause_selectivity(e, catalog))
            .product(),
        Expr::Or(exprs) => exprs.iter().fold(0.0, |acc, e| {
            let s = clause_selectivity(e, catalog);
            acc + s - acc * s
        }),
        Expr::UnaryOp { op: UnaryOp::Not, operand } => 1.0 - clause_selectivity(operand, catalog),
        Expr::UnaryOp { op: UnaryOp::IsNull, operand } => null_fraction(operand, catalog),
        Expr::UnaryOp { op: UnaryOp::IsNotNull, operand } => 1.0 - null_fraction(operand, catalog),
        Expr::BinaryOp { op, left, right } => match op {
            BinaryOp::Eq => equality_selectivity(left, right, catalog),
            BinaryOp::NotEq => 1.0 - equality_selectivity(left, right, catalog),
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => DEFAULT_INEQ_SEL,
            _ => DEFAULT_FILTER_SELECTIVITY,
        },
        _ => DEFAULT_FILTER_SELECTIVITY,
    }
}

fn null_fraction(expr: &Expr, catalog: &dyn Catalog) -> f64 {
    match expr {
        Expr::Column(c) => catalog
            .column_stats(c)
            .map_or(DEFAULT_EQ_SEL, |cs| cs.null_fraction),
        _ => DEFAULT_EQ_SEL,
    }
}

fn equality_selectivity(left: &Expr, right: &Expr, catalog: &dyn Catalog) -> f64 {
    match (left, right) {
        (Expr::Column(l), Expr::Column(r)) => {
            let l = column_ndv(catalog, l).unwrap_or(DEFAULT_NUM_DISTINCT);
            let r = column_ndv(catalog, r).unwrap_or(DEFAULT_NUM_DISTINCT);
            1.0 / l.max(r)
        }
        (Expr::Column(c), _) | (_, Expr::Column(c)) => {
            column_ndv(catalog, c).map_or(DEFAULT_EQ_SEL, |ndv| 1.0 / ndv)
        }
        _ => DEFAULT_EQ_SEL,
    }
}

/// Combined selectivity of a list of clauses, all of which must hold.
pub fn clauselist_selectivity(clauses: &[Arc<RestrictInfo>], catalog: &dyn Catalog) -> f64 {
    clauses
        .iter()
        .map(|ri| clause_selectivity(&ri.clause, catalog))
        .product()
}

/// Rows a scan of a relation with `rows` rows returns once `clauses` are applied
/// on top of its own restrictions.
pub fn parameterized_baserel_size(rows: f64, clauses: &[Arc<RestrictInfo>], catalog: &dyn Catalog) -> f64 {
    clamp_row_est(rows * clauselist_selectivity(clauses, catalog))
}

/// Estimated number of distinct combinations of `exprs` over `input_rows` rows.
///
/// Start with 1 and multiply by each expression's NDV; expressions that are not
/// plain columns, or columns without statistics, count as `DEFAULT_NUM_DISTINCT`.
pub fn estimate_num_groups(exprs: &[Expr], input_rows: f64, catalog: &dyn Catalog) -> f64 {
    if exprs.is_empty() {
        return 1.0;
    }
    let mut groups = 1.0_f64;
    for expr in exprs {
        let ndv = match expr {
            Expr::Column(c) => column_ndv(catalog, c).unwrap_or(DEFAULT_NUM_DISTINCT),
            Expr::Literal(_) => 1.0,
            _ => DEFAULT_NUM_DISTINCT,
        };
        groups *= ndv;
    }
    clamp_row_est(groups.min(input_rows))
}
