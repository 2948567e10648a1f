//! Joining underneath an append.
//!
//! When the outer input is an append over child relations (partitions, for
//! instance), the join can instead be computed once per child and the results
//! appended:
//!
//! ```text
//! Join (P.k = S.k)                 Append
//!   Append                           Join (P1.k = S.k)
//!     Scan P1  CHECK (k % 2 = 0)       Scan P1
//!     Scan P2  CHECK (k % 2 = 1)       Scan S  filter (S.k % 2 = 0)
//!   Scan S                           Join (P2.k = S.k)
//!                                      Scan P2
//!                                      Scan S  filter (S.k % 2 = 1)
//! ```
//!
//! The gain comes from the children's CHECK constraints. Substituting each
//! constrained column with its equi-join partner gives a filter the inner rows
//! must pass to find any match in that child, so each per-child join reads only
//! part of the inner relation.
//!
//! Every child must be planned successfully. If any step fails for any child, the
//! attempt is dropped and nothing is added; the regular strategies are unaffected.

use crate::clauses::clause_sides_match_join;
use crate::planner::{JoinSearch, PushdownOutcome};
use pathx_core::context::{AppendRelInfo, PlannerContext, SpecialJoinInfo};
use pathx_core::error::PlanError;
use pathx_core::expr::{ColumnRef, Expr};
use pathx_core::path::{ParamPathInfo, Path, PathKind, ScanKind};
use pathx_core::pathnode::{create_append_path, create_scan_path};
use pathx_core::relids::{RelId, RelIds};
use pathx_core::restrictinfo::RestrictInfo;
use pathx_core::stats::{parameterized_baserel_size, Statistics};
use std::sync::Arc;
use tracing::debug;

/// Why an append pushdown attempt was abandoned.
#[derive(Debug, thiserror::Error)]
enum PushdownAbort {
    #[error("{0} is not an append child")]
    NotAppendChild(RelIds),
    #[error("clause {0} cannot be translated to the child")]
    Untranslatable(String),
    #[error("CHECK constraint {0} does not follow from the join clauses")]
    ConstraintMismatch(String),
    #[error("planning the child join failed: {0}")]
    ChildJoin(#[from] PlanError),
    #[error("child join {0} has only parameterized paths")]
    ParameterizedChild(RelIds),
}

enum Attempt {
    Skipped(&'static str),
    Aborted(PushdownAbort),
    Built(Vec<Path>),
}

impl JoinSearch<'_> {
    /// Offer per-child append paths, if every child can be planned.
    pub(crate) fn try_append_pushdown(&mut self) {
        match self.build_pushdown_paths() {
            Attempt::Skipped(reason) => {
                debug!("append pushdown {}: skipped, {}", self.joinrel.relids, reason);
                self.stats.pushdown = PushdownOutcome::Skipped;
            }
            Attempt::Aborted(reason) => {
                debug!("append pushdown {}: aborted, {}", self.joinrel.relids, reason);
                self.stats.pushdown = PushdownOutcome::Aborted;
            }
            Attempt::Built(paths) => {
                let count = paths.len();
                for path in paths {
                    self.submit(path);
                }
                debug!("append pushdown {}: offered {} append paths", self.joinrel.relids, count);
                self.stats.pushdown = PushdownOutcome::Added(count);
            }
        }
    }

    fn build_pushdown_paths(&self) -> Attempt {
        let outerrel = self.outerrel;
        let innerrel = self.innerrel;

        if !outerrel.is_base_table() {
            return Attempt::Skipped("outer relation is not a table");
        }
        let has_join_clause = self
            .extra
            .restrictlist
            .iter()
            .any(|rinfo| clause_sides_match_join(rinfo, &outerrel.relids, &innerrel.relids).is_some());
        if !has_join_clause {
            return Attempt::Skipped("no join clauses");
        }
        // Derived filters would conflict with an existing parameterization.
        if innerrel.has_param_paths() {
            return Attempt::Skipped("inner relation already has parameterized paths");
        }

        for outer_path in &outerrel.pathlist {
            let PathKind::Append { subpaths } = &outer_path.kind else {
                continue;
            };

            let mut built = Vec::new();
            for inner_path in &innerrel.pathlist {
                let PathKind::Scan(scan) = &inner_path.kind else {
                    continue;
                };
                if !scan.is_table_scan() {
                    continue;
                }

                let mut child_paths = Vec::with_capacity(subpaths.len());
                for subpath in subpaths {
                    match self.plan_child_join(subpath, inner_path, scan) {
                        Ok(path) => child_paths.push(path),
                        Err(abort) => return Attempt::Aborted(abort),
                    }
                }
                built.push(create_append_path(
                    self.planner.cost_model.as_ref(),
                    &*self.joinrel,
                    child_paths,
                ));
            }

            if !built.is_empty() {
                return Attempt::Built(built);
            }
        }
        Attempt::Skipped("no append path on the outer relation")
    }

    /// Plan the join of one append child with the inner relation, giving the
    /// inner relation an extra filtered scan when the child's constraints allow.
    /// Returns the cheapest path of the child join.
    fn plan_child_join(
        &self,
        subpath: &Arc<Path>,
        inner_path: &Arc<Path>,
        scan: &ScanKind,
    ) -> Result<Arc<Path>, PushdownAbort> {
        let ctx = self.ctx;
        let innerrel = self.innerrel;

        let child = subpath
            .parent
            .singleton_member()
            .ok_or_else(|| PushdownAbort::NotAppendChild(subpath.parent.clone()))?;
        let appinfo = ctx
            .append_rel_for_child(child)
            .ok_or_else(|| PushdownAbort::NotAppendChild(subpath.parent.clone()))?;
        let child_rel = ctx.base_rel(child).ok_or(PlanError::UnknownRelation(child))?;

        let child_restrictlist = self
            .extra
            .restrictlist
            .iter()
            .map(|rinfo| translate_clause(rinfo, appinfo, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        let child_joinclauses: Vec<&Arc<RestrictInfo>> = child_restrictlist
            .iter()
            .filter(|rinfo| clause_sides_match_join(rinfo, &child_rel.relids, &innerrel.relids).is_some())
            .collect();

        let filters = self.filters_from_constraints(child, &child_joinclauses)?;

        // Child-scoped copy of the inner relation whose only path is `inner_path`,
        // filtered when the constraints gave anything. The shared relation is
        // never modified.
        let mut inner_copy = innerrel.clone();
        inner_copy.pathlist.clear();
        if filters.is_empty() {
            inner_copy.add_path(inner_path.clone());
        } else {
            let stats = innerrel
                .relids
                .singleton_member()
                .and_then(|id| self.planner.catalog.relation_stats(id))
                .unwrap_or_else(|| Statistics::new(innerrel.rows, innerrel.rows * f64::from(innerrel.width)));
            let rows = parameterized_baserel_size(innerrel.rows, &filters, self.planner.catalog.as_ref());
            let param_info = ParamPathInfo {
                required_outer: RelIds::empty(),
                rows,
                clauses: filters,
            };
            let filtered = create_scan_path(
                self.planner.cost_model.as_ref(),
                innerrel,
                scan.clone(),
                &stats,
                inner_path.pathkeys.clone(),
                Some(param_info),
            );
            inner_copy.rows = rows;
            inner_copy.add_path(Arc::new(filtered));
        }
        inner_copy.set_cheapest()?;

        let child_sjinfo = translate_sjinfo(self.extra.sjinfo, appinfo);
        let child_join = self
            .planner
            .make_join_rel(ctx, child_rel, &inner_copy, &child_sjinfo, &child_restrictlist)?;

        let cheapest = child_join.cheapest_total()?;
        if cheapest.is_parameterized() {
            return Err(PushdownAbort::ParameterizedChild(child_join.relids.clone()));
        }
        Ok(cheapest.clone())
    }

    /// Rewrite each CHECK constraint of `child` into a filter on the inner
    /// relation. A constraint column with no equi-join partner aborts the
    /// attempt; constraints are never partially rewritten.
    fn filters_from_constraints(
        &self,
        child: RelId,
        joinclauses: &[&Arc<RestrictInfo>],
    ) -> Result<Vec<Arc<RestrictInfo>>, PushdownAbort> {
        let constraints = self.planner.catalog.relation_constraints(child);
        let mut filters = Vec::with_capacity(constraints.len());
        for constraint in &constraints {
            let substituted = constraint
                .try_map_columns(&mut |column| join_partner(column, joinclauses))
                .ok_or_else(|| PushdownAbort::ConstraintMismatch(constraint.to_string()))?;
            filters.push(RestrictInfo::filter(substituted, &self.ctx.eclasses));
        }
        Ok(filters)
    }
}

/// The other operand of an equi-join clause that has `column` as one operand.
fn join_partner(column: &ColumnRef, joinclauses: &[&Arc<RestrictInfo>]) -> Option<Expr> {
    let target = Expr::Column(column.clone());
    joinclauses
        .iter()
        .filter(|rinfo| rinfo.can_join && rinfo.hashjoinable)
        .find_map(|rinfo| {
            let (left, right) = rinfo.operands()?;
            if *left == target {
                Some(right.clone())
            } else if *right == target {
                Some(left.clone())
            } else {
                None
            }
        })
}

fn translate_clause(
    rinfo: &Arc<RestrictInfo>,
    appinfo: &AppendRelInfo,
    ctx: &PlannerContext,
) -> Result<Arc<RestrictInfo>, PushdownAbort> {
    let clause = appinfo
        .translate(&rinfo.clause)
        .ok_or_else(|| PushdownAbort::Untranslatable(rinfo.to_string()))?;
    Ok(Arc::new(RestrictInfo::new(clause, rinfo.is_pushed_down, &ctx.eclasses)))
}

fn translate_relids(relids: &RelIds, appinfo: &AppendRelInfo) -> RelIds {
    let mut translated = relids.clone();
    if translated.contains(appinfo.parent) {
        translated.remove(appinfo.parent);
        translated.insert(appinfo.child);
    }
    translated
}

fn translate_sjinfo(sjinfo: &SpecialJoinInfo, appinfo: &AppendRelInfo) -> SpecialJoinInfo {
    SpecialJoinInfo {
        jointype: sjinfo.jointype,
        min_lefthand: translate_relids(&sjinfo.min_lefthand, appinfo),
        min_righthand: translate_relids(&sjinfo.min_righthand, appinfo),
        syn_lefthand: translate_relids(&sjinfo.syn_lefthand, appinfo),
        syn_righthand: translate_relids(&sjinfo.syn_righthand, appinfo),
        semi_rhs_exprs: sjinfo
            .semi_rhs_exprs
            .iter()
            .map(|expr| appinfo.translate(expr).unwrap_or_else(|| expr.clone()))
            .collect(),
        semi_can_btree: sjinfo.semi_can_btree,
        semi_can_hash: sjinfo.semi_can_hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathx_core::equivalence::EquivalenceClasses;

    #[test]
    fn test_join_partner_substitution() {
        let ecs = EquivalenceClasses::new();
        let pk = ColumnRef::new(RelId(11), "k", 0);
        let sk = Expr::column(RelId(2), "k", 0);
        let clause = Arc::new(RestrictInfo::new(Expr::eq(Expr::Column(pk.clone()), sk.clone()), false, &ecs));
        assert_eq!(join_partner(&pk, &[&clause]), Some(sk));
        assert_eq!(join_partner(&ColumnRef::new(RelId(11), "x", 1), &[&clause]), None);
    }

    #[test]
    fn test_sjinfo_translated_to_child() {
        let appinfo = AppendRelInfo {
            parent: RelId(1),
            child: RelId(11),
            translated_columns: vec![ColumnRef::new(RelId(11), "k", 0)],
        };
        let sjinfo = SpecialJoinInfo::semi(
            RelIds::from_ids(&[1]),
            RelIds::from_ids(&[2]),
            vec![Expr::column(RelId(2), "k", 0)],
        );
        let child = translate_sjinfo(&sjinfo, &appinfo);
        assert_eq!(child.min_lefthand, RelIds::from_ids(&[11]));
        assert_eq!(child.syn_righthand, RelIds::from_ids(&[2]));
        assert_eq!(child.semi_rhs_exprs, sjinfo.semi_rhs_exprs);
    }
}
