//! # Path Keys (Sort Orders)
//!
//! A path key says "sorted by equivalence class X, ascending or descending, with
//! nulls first or last". A list of path keys describes the complete ordering a path
//! delivers, or the ordering some consumer requires. Orderings are compared by prefix
//! containment: `[a, b]` satisfies a requirement for `[a]`, never the other way.
//!
//! ## Merge Join Helpers
//!
//! The functions at the bottom of this module translate between merge clauses and
//! orderings:
//!
//! - `select_outer_pathkeys_for_merge`: a good default outer ordering for a set of
//!   merge clauses.
//! - `find_mergeclauses_for_pathkeys`: the merge clauses usable with an existing
//!   ordering, in the order that ordering imposes.
//! - `make_inner_pathkeys_for_merge`: the inner ordering matching a list of merge
//!   clauses and the outer ordering they were derived from.
//! - `build_join_pathkeys`: the ordering a join result inherits from its outer input,
//!   cut down to the part anything above could use.

use crate::context::PlannerContext;
use crate::equivalence::{EcId, EquivalenceClasses};
use crate::error::PlanError;
use crate::expr::JoinType;
use crate::relation::Relation;
use crate::restrictinfo::OrientedClause;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathKey {
    pub ec: EcId,
    pub descending: bool,
    pub nulls_first: bool,
}

impl PathKey {
    /// Ascending, nulls last: the default ordering chosen for merge keys.
    pub fn asc(ec: EcId) -> Self {
        Self {
            ec,
            descending: false,
            nulls_first: false,
        }
    }

    fn with_ec(self, ec: EcId) -> Self {
        Self { ec, ..self }
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{}",
            self.ec,
            if self.descending { "DESC" } else { "ASC" },
            if self.nulls_first { " NULLS FIRST" } else { "" }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKeysComparison {
    Equal,
    /// The first list is a strict extension of the second.
    Better1,
    /// The second list is a strict extension of the first.
    Better2,
    Different,
}

pub fn compare_pathkeys(keys1: &[PathKey], keys2: &[PathKey]) -> PathKeysComparison {
    if keys1.iter().zip(keys2.iter()).any(|(a, b)| a != b) {
        return PathKeysComparison::Different;
    }
    match keys1.len().cmp(&keys2.len()) {
        std::cmp::Ordering::Equal => PathKeysComparison::Equal,
        std::cmp::Ordering::Greater => PathKeysComparison::Better1,
        std::cmp::Ordering::Less => PathKeysComparison::Better2,
    }
}

/// Does an input sorted by `actual` satisfy the requirement `required`?
pub fn pathkeys_contained_in(required: &[PathKey], actual: &[PathKey]) -> bool {
    matches!(
        compare_pathkeys(required, actual),
        PathKeysComparison::Equal | PathKeysComparison::Better2
    )
}

/// A key adds nothing to `keys` when its class is constant or already sorted on.
pub fn pathkey_is_redundant(key: &PathKey, keys: &[PathKey], eclasses: &EquivalenceClasses) -> bool {
    eclasses.must_be_redundant(key.ec) || keys.iter().any(|k| k.ec == key.ec)
}

/// Pick an outer ordering covering every merge clause.
///
/// If the query's requested ordering is made entirely of merge-clause classes, it is
/// used as the leading part, so the join result can feed the final ORDER BY without
/// a sort. The remaining classes follow in decreasing order of how many of the join
/// relation's pending join clauses mention them (ties keep clause order).
pub fn select_outer_pathkeys_for_merge(
    ctx: &PlannerContext,
    mergeclauses: &[OrientedClause],
    joinrel: &Relation,
) -> Vec<PathKey> {
    let mut candidates: Vec<(Option<EcId>, usize)> = Vec::new();
    for clause in mergeclauses {
        let Some(oeclass) = clause.outer_ec() else {
            continue;
        };
        if candidates.iter().any(|(ec, _)| *ec == Some(oeclass)) {
            continue;
        }
        let score = joinrel
            .joininfo
            .iter()
            .filter(|ri| ri.mergeable && (ri.left_ec == Some(oeclass) || ri.right_ec == Some(oeclass)))
            .count();
        candidates.push((Some(oeclass), score));
    }

    let mut pathkeys = Vec::new();
    if !ctx.query_pathkeys.is_empty()
        && ctx
            .query_pathkeys
            .iter()
            .all(|qk| candidates.iter().any(|(ec, _)| *ec == Some(qk.ec)))
    {
        pathkeys.extend(ctx.query_pathkeys.iter().copied());
        for (ec, _) in candidates.iter_mut() {
            if ctx.query_pathkeys.iter().any(|qk| Some(qk.ec) == *ec) {
                *ec = None;
            }
        }
    }

    loop {
        let mut best: Option<(usize, usize)> = None;
        for (i, (ec, score)) in candidates.iter().enumerate() {
            if ec.is_none() {
                continue;
            }
            if best.map_or(true, |(_, s)| *score > s) {
                best = Some((i, *score));
            }
        }
        let Some((i, _)) = best else {
            break;
        };
        if let Some(ec) = candidates[i].0.take() {
            pathkeys.push(PathKey::asc(ec));
        }
    }
    pathkeys
}

/// The merge clauses usable with the ordering `pathkeys`, ordered to match it.
///
/// `outer_keys` says whether `pathkeys` describes the outer (true) or inner (false)
/// side of the join. Matching stops at the first key no clause matches: a merge join
/// can only use clauses for a prefix of its input ordering.
pub fn find_mergeclauses_for_pathkeys(
    pathkeys: &[PathKey],
    outer_keys: bool,
    clauses: &[OrientedClause],
) -> Vec<OrientedClause> {
    let mut mergeclauses = Vec::new();
    for key in pathkeys {
        let matched: Vec<&OrientedClause> = clauses
            .iter()
            .filter(|c| c.ec_for_side(outer_keys) == Some(key.ec))
            .collect();
        if matched.is_empty() {
            break;
        }
        mergeclauses.extend(matched.into_iter().cloned());
    }
    mergeclauses
}

/// Build the inner-side ordering for `mergeclauses`, which must have been selected
/// for `outer_pathkeys` by [`find_mergeclauses_for_pathkeys`].
pub fn make_inner_pathkeys_for_merge(
    mergeclauses: &[OrientedClause],
    outer_pathkeys: &[PathKey],
    eclasses: &EquivalenceClasses,
) -> Result<Vec<PathKey>, PlanError> {
    let mut pathkeys: Vec<PathKey> = Vec::new();
    let mut outer_iter = outer_pathkeys.iter();
    let mut current: Option<&PathKey> = None;

    for clause in mergeclauses {
        let (Some(oeclass), Some(ieclass)) = (clause.outer_ec(), clause.inner_ec()) else {
            return Err(PlanError::PathKeyMismatch);
        };

        // The outer class must match the current outer key or the next one.
        let opathkey = match current {
            Some(k) if k.ec == oeclass => k,
            _ => {
                let next = outer_iter.next().ok_or(PlanError::TooFewPathKeys)?;
                if next.ec != oeclass {
                    return Err(PlanError::PathKeyMismatch);
                }
                current = Some(next);
                next
            }
        };

        let pathkey = if ieclass == oeclass {
            *opathkey
        } else {
            opathkey.with_ec(ieclass)
        };
        if !pathkey_is_redundant(&pathkey, &pathkeys, eclasses) {
            pathkeys.push(pathkey);
        }
    }
    Ok(pathkeys)
}

/// Output ordering of a join whose outer input is sorted by `outer_pathkeys`.
///
/// RIGHT and FULL joins emit NULL-extended rows in no particular order, so their
/// output is unordered.
pub fn build_join_pathkeys(
    ctx: &PlannerContext,
    joinrel: &Relation,
    jointype: JoinType,
    outer_pathkeys: &[PathKey],
) -> Vec<PathKey> {
    if matches!(jointype, JoinType::Full | JoinType::Right) {
        return Vec::new();
    }
    truncate_useless_pathkeys(ctx, joinrel, outer_pathkeys)
}

/// Keep the longest prefix of `pathkeys` that is useful either for a later merge
/// join or for the query's requested ordering.
pub fn truncate_useless_pathkeys(
    ctx: &PlannerContext,
    rel: &Relation,
    pathkeys: &[PathKey],
) -> Vec<PathKey> {
    let useful = pathkeys_useful_for_merging(ctx, rel, pathkeys)
        .max(pathkeys_useful_for_ordering(&ctx.query_pathkeys, pathkeys));
    pathkeys[..useful].to_vec()
}

fn pathkeys_useful_for_merging(ctx: &PlannerContext, rel: &Relation, pathkeys: &[PathKey]) -> usize {
    pathkeys
        .iter()
        .take_while(|key| {
            ctx.eclasses.useful_for_merging(key.ec, &rel.relids)
                || rel.joininfo.iter().any(|ri| {
                    ri.mergeable && (ri.left_ec == Some(key.ec) || ri.right_ec == Some(key.ec))
                })
        })
        .count()
}

fn pathkeys_useful_for_ordering(query_pathkeys: &[PathKey], pathkeys: &[PathKey]) -> usize {
    if query_pathkeys.is_empty() || pathkeys.is_empty() {
        return 0;
    }
    if pathkeys_contained_in(query_pathkeys, pathkeys) {
        query_pathkeys.len()
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::relids::{RelId, RelIds};
    use crate::restrictinfo::RestrictInfo;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn key(ec: u32) -> PathKey {
        PathKey::asc(EcId(ec))
    }

    #[test]
    fn test_compare_pathkeys() {
        assert_eq!(compare_pathkeys(&[key(0)], &[key(0)]), PathKeysComparison::Equal);
        assert_eq!(compare_pathkeys(&[key(0), key(1)], &[key(0)]), PathKeysComparison::Better1);
        assert_eq!(compare_pathkeys(&[], &[key(0)]), PathKeysComparison::Better2);
        assert_eq!(compare_pathkeys(&[key(1)], &[key(0)]), PathKeysComparison::Different);
        assert!(pathkeys_contained_in(&[key(0)], &[key(0), key(1)]));
        assert!(pathkeys_contained_in(&[], &[]));
        assert!(!pathkeys_contained_in(&[key(0), key(1)], &[key(0)]));
    }

    /// Two classes: {r1.a, r2.a} and {r1.b, r2.b}; clauses r1.a = r2.a, r2.b = r1.b.
    fn two_clause_setup() -> (PlannerContext, Vec<OrientedClause>) {
        let mut ctx = PlannerContext::new();
        ctx.eclasses.add_class(
            vec![Expr::column(RelId(1), "a", 0), Expr::column(RelId(2), "a", 0)],
            false,
        );
        ctx.eclasses.add_class(
            vec![Expr::column(RelId(1), "b", 1), Expr::column(RelId(2), "b", 1)],
            false,
        );
        let c1 = Arc::new(RestrictInfo::new(
            Expr::eq(Expr::column(RelId(1), "a", 0), Expr::column(RelId(2), "a", 0)),
            false,
            &ctx.eclasses,
        ));
        let c2 = Arc::new(RestrictInfo::new(
            Expr::eq(Expr::column(RelId(2), "b", 1), Expr::column(RelId(1), "b", 1)),
            false,
            &ctx.eclasses,
        ));
        let clauses = vec![OrientedClause::new(c1, true), OrientedClause::new(c2, false)];
        (ctx, clauses)
    }

    #[test]
    fn test_select_outer_pathkeys_prefers_query_order() {
        let (mut ctx, clauses) = two_clause_setup();
        let joinrel = Relation::join(RelIds::from_ids(&[1, 2]), 100.0, 16);

        let default = select_outer_pathkeys_for_merge(&ctx, &clauses, &joinrel);
        assert_eq!(default, vec![key(0), key(1)]);

        ctx.query_pathkeys = vec![key(1)];
        let preferred = select_outer_pathkeys_for_merge(&ctx, &clauses, &joinrel);
        assert_eq!(preferred, vec![key(1), key(0)]);
    }

    #[test]
    fn test_find_mergeclauses_stops_at_unmatched_key() {
        let (_, clauses) = two_clause_setup();
        let found = find_mergeclauses_for_pathkeys(&[key(1), key(7), key(0)], true, &clauses);
        assert_eq!(found.len(), 1);
        assert!(found[0].is_same_clause(&clauses[1]));

        let all = find_mergeclauses_for_pathkeys(&[key(1), key(0)], true, &clauses);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_make_inner_pathkeys() {
        let (ctx, clauses) = two_clause_setup();
        let outer = vec![key(1), key(0)];
        let ordered = find_mergeclauses_for_pathkeys(&outer, true, &clauses);
        let inner = make_inner_pathkeys_for_merge(&ordered, &outer, &ctx.eclasses);
        assert_eq!(inner.ok(), Some(vec![key(1), key(0)]));

        let too_few = make_inner_pathkeys_for_merge(&clauses, &[key(0)], &ctx.eclasses);
        assert!(matches!(too_few, Err(PlanError::TooFewPathKeys)));

        let wrong = make_inner_pathkeys_for_merge(&clauses, &[key(1), key(0)], &ctx.eclasses);
        assert!(matches!(wrong, Err(PlanError::PathKeyMismatch)));
    }

    #[test]
    fn test_build_join_pathkeys() {
        let (mut ctx, _) = two_clause_setup();
        let joinrel = Relation::join(RelIds::from_ids(&[1, 2]), 100.0, 16);
        let outer = vec![key(0), key(1)];

        // Both classes are fully inside the join and nothing asked for an order.
        assert!(build_join_pathkeys(&ctx, &joinrel, JoinType::Inner, &outer).is_empty());

        ctx.query_pathkeys = vec![key(0)];
        assert_eq!(build_join_pathkeys(&ctx, &joinrel, JoinType::Inner, &outer), vec![key(0)]);
        assert!(build_join_pathkeys(&ctx, &joinrel, JoinType::Full, &outer).is_empty());
    }

    fn arb_keys() -> impl Strategy<Value = Vec<PathKey>> {
        prop::collection::vec(0u32..4, 0..5).prop_map(|ecs| ecs.into_iter().map(key).collect())
    }

    proptest! {
        #[test]
        fn prop_compare_pathkeys_is_antisymmetric(a in arb_keys(), b in arb_keys()) {
            let flipped = match compare_pathkeys(&a, &b) {
                PathKeysComparison::Better1 => PathKeysComparison::Better2,
                PathKeysComparison::Better2 => PathKeysComparison::Better1,
                other => other,
            };
            prop_assert_eq!(compare_pathkeys(&b, &a), flipped);
        }

        #[test]
        fn prop_prefix_is_contained(a in arb_keys(), cut in 0usize..5) {
            let cut = cut.min(a.len());
            prop_assert!(pathkeys_contained_in(&a[..cut], &a));
        }
    }
}
