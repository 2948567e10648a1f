//! Candidate admission.
//!
//! Every generator hands its candidates to one of the `try_*_path` methods, which
//! run the same four steps: resolve the parameterization, estimate a lower bound
//! on the cost, ask the join relation whether a path that cheap could survive, and
//! only then build the full path and offer it to `add_path`. Most candidates stop
//! at the precheck, before anything is allocated.

use crate::param::{nestloop_required_outer, non_nestloop_required_outer};
use crate::planner::JoinSearch;
use pathx_core::cost::{JoinCostInput, JoinMethod};
use pathx_core::error::PlanError;
use pathx_core::expr::JoinType;
use pathx_core::path::Path;
use pathx_core::pathkeys::{pathkeys_contained_in, PathKey};
use pathx_core::pathnode::{
    create_hashjoin_path, create_mergejoin_path, create_nestloop_path, create_unique_path, JoinPathContext,
};
use pathx_core::relation::Relation;
use pathx_core::relids::RelIds;
use pathx_core::restrictinfo::OrientedClause;
use std::sync::Arc;
use tracing::trace;

impl JoinSearch<'_> {
    fn cost_input<'p>(&'p self, jointype: JoinType, outer: &'p Path, inner: &'p Path) -> JoinCostInput<'p> {
        JoinCostInput {
            jointype,
            outer,
            inner,
            sjinfo: self.extra.sjinfo,
            semifactors: &self.extra.semifactors,
        }
    }

    fn path_context(&self, jointype: JoinType) -> JoinPathContext<'_> {
        JoinPathContext {
            cost_model: self.planner.cost_model.as_ref(),
            joinrel: &*self.joinrel,
            jointype,
            sjinfo: self.extra.sjinfo,
            semifactors: &self.extra.semifactors,
            selectivity: self.extra.selectivity,
            enable_material: self.planner.config.enable_material,
        }
    }

    fn precheck(&mut self, startup_cost: f64, total_cost: f64, pathkeys: &[PathKey], required_outer: &RelIds) -> bool {
        let worth_building = self
            .joinrel
            .add_path_precheck(startup_cost, total_cost, pathkeys, required_outer);
        if !worth_building {
            self.stats.rejected_by_precheck += 1;
            trace!(
                "precheck {}: rejected cost={:.2}..{:.2}",
                self.joinrel.relids,
                startup_cost,
                total_cost
            );
        }
        worth_building
    }

    fn rejected_by_parameterization(&mut self, method: &str, outer: &Path, inner: &Path) {
        self.stats.rejected_by_parameterization += 1;
        trace!(
            "{} {}: parameterization rejected (outer requires {}, inner requires {})",
            method,
            self.joinrel.relids,
            outer.required_outer(),
            inner.required_outer()
        );
    }

    /// Offer a fully built path to the join relation.
    pub(crate) fn submit(&mut self, path: Path) -> bool {
        self.stats.submitted += 1;
        if !path.is_parameterized() {
            let total = path.total_cost;
            self.stats.cheapest_submitted_total = Some(
                self.stats
                    .cheapest_submitted_total
                    .map_or(total, |best| best.min(total)),
            );
        }
        let admitted = self.joinrel.add_path(Arc::new(path));
        if admitted {
            self.stats.admitted += 1;
        }
        admitted
    }

    /// Unique-ify `path` of `rel` on the semi join's right-hand expressions.
    pub(crate) fn unique_ify(&self, rel: &Relation, path: &Arc<Path>) -> Result<Arc<Path>, PlanError> {
        create_unique_path(
            self.planner.cost_model.as_ref(),
            self.planner.catalog.as_ref(),
            rel,
            path,
            self.extra.sjinfo,
        )
        .map(Arc::new)
        .ok_or_else(|| PlanError::UniquifyFailed(rel.relids.clone()))
    }

    pub(crate) fn try_nestloop_path(
        &mut self,
        outer: &Arc<Path>,
        inner: &Arc<Path>,
        pathkeys: Vec<PathKey>,
        jointype: JoinType,
    ) -> Result<(), PlanError> {
        self.stats.nestloop_considered += 1;
        let Some(required_outer) = nestloop_required_outer(self.ctx, &self.extra, outer, inner) else {
            self.rejected_by_parameterization("nestloop", outer, inner);
            return Ok(());
        };

        let workspace = self
            .planner
            .cost_model
            .initial_join_cost(JoinMethod::NestLoop, &self.cost_input(jointype, outer, inner))?;
        if !self.precheck(workspace.startup_cost, workspace.total_cost, &pathkeys, &required_outer) {
            return Ok(());
        }

        let path = create_nestloop_path(
            &self.path_context(jointype),
            &workspace,
            outer.clone(),
            inner.clone(),
            self.extra.restrictlist,
            pathkeys,
            required_outer,
        )?;
        self.submit(path);
        Ok(())
    }

    /// `outersortkeys` and `innersortkeys` are the explicit sorts the caller wants;
    /// a sort the input's existing order already satisfies is dropped.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn try_mergejoin_path(
        &mut self,
        outer: &Arc<Path>,
        inner: &Arc<Path>,
        pathkeys: Vec<PathKey>,
        mergeclauses: Vec<OrientedClause>,
        mut outersortkeys: Vec<PathKey>,
        mut innersortkeys: Vec<PathKey>,
        jointype: JoinType,
    ) -> Result<(), PlanError> {
        self.stats.mergejoin_considered += 1;
        let Some(required_outer) = non_nestloop_required_outer(&self.extra, outer, inner) else {
            self.rejected_by_parameterization("mergejoin", outer, inner);
            return Ok(());
        };

        if !outersortkeys.is_empty() && pathkeys_contained_in(&outersortkeys, &outer.pathkeys) {
            outersortkeys.clear();
        }
        if !innersortkeys.is_empty() && pathkeys_contained_in(&innersortkeys, &inner.pathkeys) {
            innersortkeys.clear();
        }

        let method = JoinMethod::MergeJoin {
            mergeclauses: &mergeclauses,
            outersortkeys: &outersortkeys,
            innersortkeys: &innersortkeys,
        };
        let workspace = self
            .planner
            .cost_model
            .initial_join_cost(method, &self.cost_input(jointype, outer, inner))?;
        if !self.precheck(workspace.startup_cost, workspace.total_cost, &pathkeys, &required_outer) {
            return Ok(());
        }

        let path = create_mergejoin_path(
            &self.path_context(jointype),
            &workspace,
            outer.clone(),
            inner.clone(),
            self.extra.restrictlist,
            pathkeys,
            required_outer,
            mergeclauses,
            outersortkeys,
            innersortkeys,
        )?;
        self.submit(path);
        Ok(())
    }

    pub(crate) fn try_hashjoin_path(
        &mut self,
        outer: &Arc<Path>,
        inner: &Arc<Path>,
        hashclauses: Vec<OrientedClause>,
        jointype: JoinType,
    ) -> Result<(), PlanError> {
        self.stats.hashjoin_considered += 1;
        let Some(required_outer) = non_nestloop_required_outer(&self.extra, outer, inner) else {
            self.rejected_by_parameterization("hashjoin", outer, inner);
            return Ok(());
        };

        let method = JoinMethod::HashJoin {
            hashclauses: &hashclauses,
        };
        let workspace = self
            .planner
            .cost_model
            .initial_join_cost(method, &self.cost_input(jointype, outer, inner))?;
        // Hash join output is unordered.
        if !self.precheck(workspace.startup_cost, workspace.total_cost, &[], &required_outer) {
            return Ok(());
        }

        let path = create_hashjoin_path(
            &self.path_context(jointype),
            &workspace,
            outer.clone(),
            inner.clone(),
            self.extra.restrictlist,
            required_outer,
            hashclauses,
        )?;
        self.submit(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::JoinSearchConfig;
    use crate::extra::JoinPathExtraData;
    use crate::planner::{JoinPathStats, JoinPlanner, JoinSearch};
    use pathx_core::catalog::InMemoryCatalog;
    use pathx_core::context::{PlannerContext, SpecialJoinInfo};
    use pathx_core::cost::{DefaultCostModel, SemiAntiJoinFactors};
    use pathx_core::expr::{Expr, JoinType};
    use pathx_core::path::{Path, PathKind, ScanKind};
    use pathx_core::pathkeys::PathKey;
    use pathx_core::relation::Relation;
    use pathx_core::relids::{RelId, RelIds};
    use pathx_core::restrictinfo::{OrientedClause, RestrictInfo};
    use std::sync::Arc;

    fn col(rel: u32, name: &str, index: u32) -> Expr {
        Expr::column(RelId(rel), name, index)
    }

    fn sorted_scan(rel: u32, pathkeys: Vec<PathKey>) -> Arc<Path> {
        Arc::new(Path {
            kind: PathKind::Scan(ScanKind::IndexScan { index: "k_idx".into() }),
            parent: RelIds::from_ids(&[rel]),
            param_info: None,
            rows: 1000.0,
            width: 16,
            startup_cost: 0.5,
            total_cost: 80.0,
            pathkeys,
        })
    }

    /// Offer a merge join of R(k, x) and S(k) on R.k = S.k that asks for both
    /// inputs sorted on k, with the outer input already ordered by `outer_order`.
    fn merge_with_outer_order(outer_order: &[&str]) -> Path {
        let mut ctx = PlannerContext::new();
        let k = ctx.eclasses.add_class(vec![col(1, "k", 0), col(2, "k", 0)], false);
        let x = ctx.eclasses.add_class(vec![col(1, "x", 1)], false);
        let outer_keys: Vec<PathKey> = outer_order
            .iter()
            .map(|name| PathKey::asc(if *name == "k" { k } else { x }))
            .collect();

        let rinfo = Arc::new(RestrictInfo::new(Expr::eq(col(1, "k", 0), col(2, "k", 0)), false, &ctx.eclasses));
        let restrictlist = vec![rinfo.clone()];
        let sjinfo = SpecialJoinInfo::inner(RelIds::from_ids(&[1]), RelIds::from_ids(&[2]));
        let planner = JoinPlanner::new(
            Arc::new(DefaultCostModel::default()),
            Arc::new(InMemoryCatalog::new()),
            JoinSearchConfig::default(),
        );
        let outerrel = Relation::base(RelId(1), 1000.0, 16);
        let innerrel = Relation::base(RelId(2), 1000.0, 16);
        let mut joinrel = Relation::join(RelIds::from_ids(&[1, 2]), 1000.0, 32);

        let mergeclauses = vec![OrientedClause::new(rinfo, true)];
        let mut search = JoinSearch {
            planner: &planner,
            ctx: &ctx,
            joinrel: &mut joinrel,
            outerrel: &outerrel,
            innerrel: &innerrel,
            jointype: JoinType::Inner,
            extra: JoinPathExtraData {
                restrictlist: &restrictlist,
                mergeclause_list: mergeclauses.clone(),
                mergejoin_allowed: true,
                sjinfo: &sjinfo,
                semifactors: SemiAntiJoinFactors::default(),
                selectivity: 0.001,
                param_source_rels: RelIds::empty(),
                extra_lateral_rels: RelIds::empty(),
            },
            stats: JoinPathStats::default(),
        };

        let outer = sorted_scan(1, outer_keys);
        let inner = sorted_scan(2, Vec::new());
        search
            .try_mergejoin_path(
                &outer,
                &inner,
                vec![PathKey::asc(k)],
                mergeclauses,
                vec![PathKey::asc(k)],
                vec![PathKey::asc(k)],
                JoinType::Inner,
            )
            .expect("merge join costs");
        assert_eq!(search.stats.submitted, 1);
        let path = joinrel.pathlist.first().cloned().expect("admitted merge path");
        (*path).clone()
    }

    #[test]
    fn test_sort_elided_for_exact_outer_order() {
        let path = merge_with_outer_order(&["k"]);
        let PathKind::MergeJoin(merge) = &path.kind else {
            panic!("expected a merge join, got {}", path);
        };
        assert!(merge.outersortkeys.is_empty());
        assert_eq!(merge.outer_sort_cost, 0.0);
        assert_eq!(merge.innersortkeys.len(), 1);
        assert!(merge.inner_sort_cost > 0.0);
    }

    #[test]
    fn test_sort_elided_for_longer_outer_order() {
        let path = merge_with_outer_order(&["k", "x"]);
        let PathKind::MergeJoin(merge) = &path.kind else {
            panic!("expected a merge join, got {}", path);
        };
        assert!(merge.outersortkeys.is_empty());
        assert_eq!(merge.outer_sort_cost, 0.0);
    }

    #[test]
    fn test_unsorted_outer_keeps_sort() {
        let path = merge_with_outer_order(&[]);
        let PathKind::MergeJoin(merge) = &path.kind else {
            panic!("expected a merge join, got {}", path);
        };
        assert_eq!(merge.outersortkeys.len(), 1);
        assert!(merge.outer_sort_cost > 0.0);
    }
}
