//! Clause classification for merge and hash joins.
//!
//! A join clause can drive a merge or hash join only when one operand is computed
//! entirely from the outer input and the other entirely from the inner input. The
//! classifier never touches the shared `RestrictInfo`; the side each operand falls
//! on is returned alongside the clause as an `OrientedClause`.
//!
//! Clauses pushed down from above an outer join are filters on the join result,
//! not conditions of the join itself, so they are ignored when the join is an
//! outer join.

use pathx_core::context::PlannerContext;
use pathx_core::expr::JoinType;
use pathx_core::relids::RelIds;
use pathx_core::restrictinfo::{OrientedClause, RestrictInfo};
use std::sync::Arc;

/// Which operand of `rinfo` belongs to the outer input: `Some(true)` for the left
/// operand, `Some(false)` for the right one, `None` if the operands do not split
/// cleanly between the two inputs.
pub fn clause_sides_match_join(rinfo: &RestrictInfo, outer: &RelIds, inner: &RelIds) -> Option<bool> {
    let (left, right) = (&rinfo.left_relids, &rinfo.right_relids);
    if left.is_empty() || right.is_empty() {
        return None;
    }
    if left.is_subset_of(outer) && right.is_subset_of(inner) {
        Some(true)
    } else if left.is_subset_of(inner) && right.is_subset_of(outer) {
        Some(false)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct MergeClauseSelection {
    pub clauses: Vec<OrientedClause>,
    /// False when a RIGHT or FULL join has a join clause that cannot be used as a
    /// merge key. Such a join can then not be executed as a merge join at all,
    /// and is not a nested loop candidate either.
    pub mergejoin_allowed: bool,
}

/// Collect the clauses of `restrictlist` usable as merge keys for joining `outer`
/// to `inner`.
///
/// A usable clause is a mergejoinable operator clause with cleanly separated
/// sides, both of whose operands belong to an equivalence class that is not
/// reduced to a constant.
pub fn select_mergejoin_clauses(
    ctx: &PlannerContext,
    outer: &RelIds,
    inner: &RelIds,
    restrictlist: &[Arc<RestrictInfo>],
    jointype: JoinType,
) -> MergeClauseSelection {
    let is_outer_join = jointype.is_outer_join();
    let mut have_nonmergeable_joinclause = false;
    let mut clauses = Vec::new();

    for rinfo in restrictlist {
        if is_outer_join && rinfo.is_pushed_down {
            continue;
        }
        if !rinfo.can_join || !rinfo.mergeable {
            // A constant-true or constant-false ON condition does not stop a
            // merge join.
            if !rinfo.clause.is_literal() {
                have_nonmergeable_joinclause = true;
            }
            continue;
        }
        let Some(outer_is_left) = clause_sides_match_join(rinfo, outer, inner) else {
            have_nonmergeable_joinclause = true;
            continue;
        };
        let usable = match (rinfo.left_ec, rinfo.right_ec) {
            (Some(left), Some(right)) => {
                !ctx.eclasses.must_be_redundant(left) && !ctx.eclasses.must_be_redundant(right)
            }
            _ => false,
        };
        if !usable {
            have_nonmergeable_joinclause = true;
            continue;
        }
        clauses.push(OrientedClause::new(rinfo.clone(), outer_is_left));
    }

    let mergejoin_allowed = match jointype {
        JoinType::Right | JoinType::Full => !have_nonmergeable_joinclause,
        _ => true,
    };
    MergeClauseSelection {
        clauses,
        mergejoin_allowed,
    }
}

/// Collect the clauses of `restrictlist` usable as hash keys for joining `outer`
/// to `inner`.
pub fn select_hashjoin_clauses(
    outer: &RelIds,
    inner: &RelIds,
    restrictlist: &[Arc<RestrictInfo>],
    jointype: JoinType,
) -> Vec<OrientedClause> {
    let is_outer_join = jointype.is_outer_join();
    restrictlist
        .iter()
        .filter(|rinfo| !(is_outer_join && rinfo.is_pushed_down))
        .filter(|rinfo| rinfo.can_join && rinfo.hashjoinable)
        .filter_map(|rinfo| {
            clause_sides_match_join(rinfo, outer, inner).map(|outer_is_left| OrientedClause::new(rinfo.clone(), outer_is_left))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathx_core::expr::{BinaryOp, Expr, ScalarValue};
    use pathx_core::relids::RelId;

    fn col(rel: u32, name: &str) -> Expr {
        Expr::column(RelId(rel), name, 0)
    }

    fn context() -> PlannerContext {
        let mut ctx = PlannerContext::new();
        ctx.eclasses.add_class(vec![col(1, "k"), col(2, "k")], false);
        ctx
    }

    fn clause(ctx: &PlannerContext, expr: Expr, pushed_down: bool) -> Arc<RestrictInfo> {
        Arc::new(RestrictInfo::new(expr, pushed_down, &ctx.eclasses))
    }

    fn ids(v: &[u32]) -> RelIds {
        RelIds::from_ids(v)
    }

    #[test]
    fn test_orientation_follows_input_order() {
        let ctx = context();
        let ri = clause(&ctx, Expr::eq(col(1, "k"), col(2, "k")), false);
        assert_eq!(clause_sides_match_join(&ri, &ids(&[1]), &ids(&[2])), Some(true));
        assert_eq!(clause_sides_match_join(&ri, &ids(&[2]), &ids(&[1])), Some(false));
        assert_eq!(clause_sides_match_join(&ri, &ids(&[1, 2]), &ids(&[3])), None);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let ctx = context();
        let ri = clause(&ctx, Expr::eq(col(2, "k"), col(1, "k")), false);
        let before = (*ri).clone();
        let list = vec![ri.clone()];

        let first = select_mergejoin_clauses(&ctx, &ids(&[1]), &ids(&[2]), &list, JoinType::Inner);
        let second = select_mergejoin_clauses(&ctx, &ids(&[1]), &ids(&[2]), &list, JoinType::Inner);
        assert_eq!(first.clauses, second.clauses);
        assert!(!first.clauses[0].outer_is_left);
        assert_eq!(*ri, before);

        let swapped = select_mergejoin_clauses(&ctx, &ids(&[2]), &ids(&[1]), &list, JoinType::Inner);
        assert!(swapped.clauses[0].outer_is_left);
        assert_eq!(first.clauses, select_mergejoin_clauses(&ctx, &ids(&[1]), &ids(&[2]), &list, JoinType::Inner).clauses);
    }

    #[test]
    fn test_nonmergeable_clause_blocks_full_join_merge() {
        let ctx = context();
        let list = vec![
            clause(&ctx, Expr::eq(col(1, "k"), col(2, "k")), false),
            clause(&ctx, Expr::binary(BinaryOp::Lt, col(1, "x"), col(2, "x")), false),
        ];
        let full = select_mergejoin_clauses(&ctx, &ids(&[1]), &ids(&[2]), &list, JoinType::Full);
        assert_eq!(full.clauses.len(), 1);
        assert!(!full.mergejoin_allowed);

        let left = select_mergejoin_clauses(&ctx, &ids(&[1]), &ids(&[2]), &list, JoinType::Left);
        assert!(left.mergejoin_allowed);
    }

    #[test]
    fn test_constant_and_pushed_down_clauses_do_not_block() {
        let ctx = context();
        let list = vec![
            clause(&ctx, Expr::Literal(ScalarValue::Bool(true)), false),
            clause(&ctx, Expr::binary(BinaryOp::Lt, col(1, "x"), col(2, "x")), true),
        ];
        let full = select_mergejoin_clauses(&ctx, &ids(&[1]), &ids(&[2]), &list, JoinType::Full);
        assert!(full.clauses.is_empty());
        assert!(full.mergejoin_allowed);
    }

    #[test]
    fn test_clause_without_equivalence_class_is_not_a_merge_key() {
        let ctx = context();
        let list = vec![clause(&ctx, Expr::eq(col(1, "x"), col(2, "x")), false)];
        let sel = select_mergejoin_clauses(&ctx, &ids(&[1]), &ids(&[2]), &list, JoinType::Right);
        assert!(sel.clauses.is_empty());
        assert!(!sel.mergejoin_allowed);
        // Hash join only needs hashable operators.
        assert_eq!(select_hashjoin_clauses(&ids(&[1]), &ids(&[2]), &list, JoinType::Right).len(), 1);
    }

    #[test]
    fn test_hash_clauses_skip_pushed_down_for_outer_joins() {
        let ctx = context();
        let list = vec![clause(&ctx, Expr::eq(col(1, "k"), col(2, "k")), true)];
        assert!(select_hashjoin_clauses(&ids(&[1]), &ids(&[2]), &list, JoinType::Left).is_empty());
        assert_eq!(select_hashjoin_clauses(&ids(&[1]), &ids(&[2]), &list, JoinType::Inner).len(), 1);
    }
}
