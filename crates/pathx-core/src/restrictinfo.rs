//! # Restriction Clauses
//!
//! A `RestrictInfo` wraps one predicate together with the facts the join enumerator
//! needs about it: which relations each operand reads, whether it can serve as a
//! merge or hash key, and whether it was pushed down from above an outer join.
//! All of this is computed once, when the clause is built, and never changes.
//!
//! Which operand is "outer" depends on the pair of relations being joined, so it is
//! not stored here. The clause classifier returns an [`OrientedClause`] for each
//! clause it accepts, pairing the shared clause with its orientation for the
//! current call.

use crate::equivalence::{EcId, EquivalenceClasses};
use crate::expr::Expr;
use crate::relids::RelIds;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct RestrictInfo {
    pub clause: Expr,
    /// Clause originates above this join level (a WHERE clause, or a condition of a
    /// join further out) rather than from this join's own ON condition.
    pub is_pushed_down: bool,
    /// Binary operator clause whose operands reference disjoint, non-empty sets of
    /// relations.
    pub can_join: bool,
    pub clause_relids: RelIds,
    pub left_relids: RelIds,
    pub right_relids: RelIds,
    pub mergeable: bool,
    pub hashjoinable: bool,
    pub left_ec: Option<EcId>,
    pub right_ec: Option<EcId>,
}

impl RestrictInfo {
    pub fn new(clause: Expr, is_pushed_down: bool, eclasses: &EquivalenceClasses) -> Self {
        let clause_relids = clause.relids();
        let mut info = Self {
            clause_relids,
            is_pushed_down,
            can_join: false,
            left_relids: RelIds::empty(),
            right_relids: RelIds::empty(),
            mergeable: false,
            hashjoinable: false,
            left_ec: None,
            right_ec: None,
            clause,
        };

        if let Some((op, left, right)) = info.clause.as_binary() {
            if op.is_comparison() {
                let left_relids = left.relids();
                let right_relids = right.relids();
                if !left_relids.is_empty()
                    && !right_relids.is_empty()
                    && !left_relids.overlaps(&right_relids)
                {
                    info.can_join = true;
                    info.mergeable = op.is_mergejoinable();
                    info.hashjoinable = op.is_hashjoinable();
                    if info.mergeable {
                        info.left_ec = eclasses.class_for_expr(left);
                        info.right_ec = eclasses.class_for_expr(right);
                    }
                }
                info.left_relids = left_relids;
                info.right_relids = right_relids;
            }
        }
        info
    }

    /// Shorthand for a shared, pushed-down filter clause.
    pub fn filter(clause: Expr, eclasses: &EquivalenceClasses) -> Arc<Self> {
        Arc::new(Self::new(clause, true, eclasses))
    }

    /// Operands of the clause, when it is a binary operator clause.
    pub fn operands(&self) -> Option<(&Expr, &Expr)> {
        self.clause.as_binary().map(|(_, l, r)| (l, r))
    }
}

impl fmt::Display for RestrictInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.clause)
    }
}

/// A clause paired with which of its operands belongs to the outer input of the
/// join currently being enumerated.
#[derive(Debug, Clone)]
pub struct OrientedClause {
    pub rinfo: Arc<RestrictInfo>,
    pub outer_is_left: bool,
}

impl OrientedClause {
    pub fn new(rinfo: Arc<RestrictInfo>, outer_is_left: bool) -> Self {
        Self {
            rinfo,
            outer_is_left,
        }
    }

    pub fn outer_ec(&self) -> Option<EcId> {
        if self.outer_is_left {
            self.rinfo.left_ec
        } else {
            self.rinfo.right_ec
        }
    }

    pub fn inner_ec(&self) -> Option<EcId> {
        if self.outer_is_left {
            self.rinfo.right_ec
        } else {
            self.rinfo.left_ec
        }
    }

    /// Equivalence class on the requested side: the outer one when `outer` is true.
    pub fn ec_for_side(&self, outer: bool) -> Option<EcId> {
        if outer {
            self.outer_ec()
        } else {
            self.inner_ec()
        }
    }

    pub fn is_same_clause(&self, other: &OrientedClause) -> bool {
        Arc::ptr_eq(&self.rinfo, &other.rinfo)
    }
}

impl PartialEq for OrientedClause {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_clause(other) && self.outer_is_left == other.outer_is_left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinaryOp;
    use crate::relids::RelId;

    fn eclasses() -> EquivalenceClasses {
        let mut ecs = EquivalenceClasses::new();
        ecs.add_class(
            vec![Expr::column(RelId(1), "k", 0), Expr::column(RelId(2), "k", 0)],
            false,
        );
        ecs
    }

    #[test]
    fn test_equijoin_clause() {
        let ecs = eclasses();
        let ri = RestrictInfo::new(
            Expr::eq(Expr::column(RelId(1), "k", 0), Expr::column(RelId(2), "k", 0)),
            false,
            &ecs,
        );
        assert!(ri.can_join && ri.mergeable && ri.hashjoinable);
        assert_eq!(ri.left_relids, RelIds::from_ids(&[1]));
        assert_eq!(ri.right_relids, RelIds::from_ids(&[2]));
        assert_eq!(ri.left_ec, ri.right_ec);
        assert!(ri.left_ec.is_some());
    }

    #[test]
    fn test_inequality_is_joinable_but_not_mergeable() {
        let ri = RestrictInfo::new(
            Expr::binary(
                BinaryOp::Lt,
                Expr::column(RelId(1), "k", 0),
                Expr::column(RelId(2), "k", 0),
            ),
            false,
            &eclasses(),
        );
        assert!(ri.can_join);
        assert!(!ri.mergeable && !ri.hashjoinable);
        assert!(ri.left_ec.is_none());
    }

    #[test]
    fn test_mixed_sides_cannot_join() {
        let ri = RestrictInfo::new(
            Expr::eq(
                Expr::binary(
                    BinaryOp::Add,
                    Expr::column(RelId(1), "k", 0),
                    Expr::column(RelId(2), "k", 0),
                ),
                Expr::column(RelId(2), "x", 1),
            ),
            false,
            &eclasses(),
        );
        assert!(!ri.can_join);
        assert_eq!(ri.clause_relids, RelIds::from_ids(&[1, 2]));
    }

    #[test]
    fn test_orientation_selects_side() {
        let ecs = eclasses();
        let ri = Arc::new(RestrictInfo::new(
            Expr::eq(Expr::column(RelId(1), "k", 0), Expr::column(RelId(2), "k", 0)),
            false,
            &ecs,
        ));
        let a = OrientedClause::new(ri.clone(), true);
        let b = OrientedClause::new(ri, false);
        assert!(a.is_same_clause(&b));
        assert_ne!(a, b);
        assert_eq!(a.outer_ec(), b.inner_ec());
    }
}
