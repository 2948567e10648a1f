//! # Planner Context
//!
//! `PlannerContext` is the planning-session state the join enumerator reads but never
//! modifies: the base relations and their append children, the outer-join ordering
//! constraints, LATERAL references, placeholder evaluation points, equivalence
//! classes, and the ordering the query ultimately wants.
//!
//! ## Special Joins
//!
//! A `SpecialJoinInfo` describes one non-inner join from the query text. Its minimal
//! left- and right-hand sets are what the enumerator uses to decide whether a
//! parameterized path is purposeful (see `param_source_rels` in `pathx-join`). Plain
//! inner joins have no entry in `join_info_list`; callers pass
//! `SpecialJoinInfo::inner` for them.

use crate::equivalence::EquivalenceClasses;
use crate::expr::{ColumnRef, Expr, JoinType};
use crate::pathkeys::PathKey;
use crate::relation::Relation;
use crate::relids::{RelId, RelIds};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata for one outer, semi or anti join of the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialJoinInfo {
    pub jointype: JoinType,
    /// Base relations the left side must contain for the join to be legal.
    pub min_lefthand: RelIds,
    /// Base relations the right side must contain for the join to be legal.
    pub min_righthand: RelIds,
    /// Base relations syntactically on the left side.
    pub syn_lefthand: RelIds,
    /// Base relations syntactically on the right side.
    pub syn_righthand: RelIds,
    /// For semi joins: the right-hand expressions a unique-ified right side must be
    /// distinct on.
    pub semi_rhs_exprs: Vec<Expr>,
    /// Can the right side be unique-ified by sorting?
    pub semi_can_btree: bool,
    /// Can the right side be unique-ified by hashing?
    pub semi_can_hash: bool,
}

impl SpecialJoinInfo {
    /// Stand-in for a plain inner join between `left` and `right`.
    pub fn inner(left: RelIds, right: RelIds) -> Self {
        Self {
            jointype: JoinType::Inner,
            min_lefthand: left.clone(),
            min_righthand: right.clone(),
            syn_lefthand: left,
            syn_righthand: right,
            semi_rhs_exprs: Vec::new(),
            semi_can_btree: false,
            semi_can_hash: false,
        }
    }

    pub fn outer(jointype: JoinType, left: RelIds, right: RelIds) -> Self {
        Self {
            jointype,
            ..Self::inner(left, right)
        }
    }

    pub fn semi(left: RelIds, right: RelIds, rhs_exprs: Vec<Expr>) -> Self {
        Self {
            jointype: JoinType::Semi,
            semi_rhs_exprs: rhs_exprs,
            semi_can_btree: true,
            semi_can_hash: true,
            ..Self::inner(left, right)
        }
    }
}

/// A LATERAL reference: `lateral_rhs` uses values from `lateral_lhs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LateralJoinInfo {
    pub lateral_lhs: RelIds,
    pub lateral_rhs: RelIds,
}

/// A deferred computed expression (placeholder) and where it can be evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceHolderInfo {
    /// Minimal set of relations at whose join the placeholder is computed.
    pub eval_at: RelIds,
    /// Relations outside `eval_at` the expression references laterally.
    pub lateral: RelIds,
}

/// Parent-to-child mapping for one append (partition or inheritance) child.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendRelInfo {
    pub parent: RelId,
    pub child: RelId,
    /// Child column for each parent column, indexed by the parent column ordinal.
    pub translated_columns: Vec<ColumnRef>,
}

impl AppendRelInfo {
    /// Rewrite parent column references into child column references. Columns of
    /// other relations pass through unchanged; a parent column without a mapping
    /// makes the whole translation fail.
    pub fn translate(&self, expr: &Expr) -> Option<Expr> {
        expr.try_map_columns(&mut |c| {
            if c.rel != self.parent {
                return Some(Expr::Column(c.clone()));
            }
            self.translated_columns
                .get(c.index as usize)
                .map(|child| Expr::Column(child.clone()))
        })
    }
}

/// Session-wide planner state consulted by the join enumerator.
#[derive(Debug, Clone, Default)]
pub struct PlannerContext {
    pub all_baserels: RelIds,
    pub join_info_list: Vec<SpecialJoinInfo>,
    pub lateral_info_list: Vec<LateralJoinInfo>,
    pub placeholder_list: Vec<PlaceHolderInfo>,
    pub eclasses: EquivalenceClasses,
    /// Ordering requested by the query (ORDER BY, merge above, ...).
    pub query_pathkeys: Vec<PathKey>,
    pub append_rel_list: Vec<AppendRelInfo>,
    /// Base relations, including append children.
    pub base_rels: BTreeMap<RelId, Relation>,
}

impl PlannerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a base relation. Append children are registered here too but are
    /// not part of `all_baserels`.
    pub fn add_base_rel(&mut self, rel: Relation) {
        if let Some(id) = rel.relids.singleton_member() {
            let is_child = self.append_rel_list.iter().any(|a| a.child == id);
            if !is_child {
                self.all_baserels.insert(id);
            }
            self.base_rels.insert(id, rel);
        }
    }

    pub fn base_rel(&self, id: RelId) -> Option<&Relation> {
        self.base_rels.get(&id)
    }

    /// Register an append child mapping and translate equivalence-class members
    /// for it.
    pub fn add_append_rel(&mut self, appinfo: AppendRelInfo) {
        self.all_baserels.remove(appinfo.child);
        self.eclasses.add_child_members(&appinfo);
        self.append_rel_list.push(appinfo);
    }

    pub fn append_rel_for_child(&self, child: RelId) -> Option<&AppendRelInfo> {
        self.append_rel_list.iter().find(|a| a.child == child)
    }
}
