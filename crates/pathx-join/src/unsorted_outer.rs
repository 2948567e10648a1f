//! Nested loops and merge joins that keep each outer path's existing order.
//!
//! Every outer path is tried, not just the cheapest ones, since its order is
//! preserved by a nested loop and may be what a merge join needs. For each
//! outer path:
//!
//! - nested loops against every inner path in the per-parameterization cheapest
//!   list, and against a materialized copy of the cheapest inner path;
//! - a merge join on the merge clauses the outer order happens to satisfy, with
//!   the cheapest inner path sorted to match;
//! - merge joins against inner paths already ordered on some prefix of those
//!   keys, longest prefix first, whenever such a path is strictly cheaper than
//!   anything tried so far.
//!
//! | join type            | nested loop | merge must use all clauses |
//! |----------------------|-------------|----------------------------|
//! | INNER LEFT SEMI ANTI | yes         | no                         |
//! | RIGHT FULL           | no          | yes                        |
//! | unique-ify variants  | yes (inner) | no                         |

use crate::planner::JoinSearch;
use pathx_core::admission::{compare_path_costs, get_cheapest_path_for_pathkeys, CostCriterion};
use pathx_core::error::PlanError;
use pathx_core::expr::JoinType;
use pathx_core::path::Path;
use pathx_core::pathkeys::{
    build_join_pathkeys, find_mergeclauses_for_pathkeys, make_inner_pathkeys_for_merge, pathkeys_contained_in, PathKey,
};
use pathx_core::pathnode::create_material_path;
use pathx_core::relids::RelIds;
use pathx_core::restrictinfo::OrientedClause;
use std::cmp::Ordering;
use std::sync::Arc;

impl JoinSearch<'_> {
    pub(crate) fn match_unsorted_outer(&mut self) -> Result<(), PlanError> {
        let outerrel = self.outerrel;
        let innerrel = self.innerrel;
        let save_jointype = self.jointype;

        let (nestjoin_ok, use_all_clauses, jointype) = match save_jointype {
            JoinType::Inner | JoinType::Left | JoinType::Semi | JoinType::Anti => (true, false, save_jointype),
            JoinType::Right | JoinType::Full => (false, true, save_jointype),
            JoinType::UniqueOuter | JoinType::UniqueInner => (true, false, JoinType::Inner),
        };

        let mut inner_cheapest_total = Some(innerrel.cheapest_total()?.clone())
            .filter(|path| !path.param_by_rel(&outerrel.relids));
        let mut matpath: Option<Arc<Path>> = None;

        if save_jointype == JoinType::UniqueInner {
            let Some(inner) = inner_cheapest_total.take() else {
                return Ok(());
            };
            inner_cheapest_total = Some(self.unique_ify(innerrel, &inner)?);
        } else if nestjoin_ok && self.planner.config.enable_material {
            // Rescanning a materialized inner path is cheap unless the path is
            // already buffered.
            if let Some(inner) = inner_cheapest_total.as_ref().filter(|p| !p.materializes_output()) {
                matpath = Some(Arc::new(create_material_path(self.planner.cost_model.as_ref(), inner)));
            }
        }

        let mergeclause_list = self.extra.mergeclause_list.clone();

        for candidate in &outerrel.pathlist {
            // Nothing can supply the outer path's parameters from the inner side.
            if candidate.param_by_rel(&innerrel.relids) {
                continue;
            }

            let outerpath = if save_jointype == JoinType::UniqueOuter {
                if !Arc::ptr_eq(candidate, outerrel.cheapest_total()?) {
                    continue;
                }
                self.unique_ify(outerrel, candidate)?
            } else {
                candidate.clone()
            };

            let merge_pathkeys = build_join_pathkeys(self.ctx, self.joinrel, jointype, &outerpath.pathkeys);

            if save_jointype == JoinType::UniqueInner {
                if let Some(inner) = &inner_cheapest_total {
                    self.try_nestloop_path(&outerpath, inner, merge_pathkeys.clone(), jointype)?;
                }
            } else if nestjoin_ok {
                for innerpath in &innerrel.cheapest_parameterized_paths {
                    self.try_nestloop_path(&outerpath, innerpath, merge_pathkeys.clone(), jointype)?;
                }
                if let Some(mat) = &matpath {
                    self.try_nestloop_path(&outerpath, mat, merge_pathkeys.clone(), jointype)?;
                }
            }

            // A unique-ified outer path has no useful order.
            if save_jointype == JoinType::UniqueOuter {
                continue;
            }
            let Some(inner_cheapest_total) = &inner_cheapest_total else {
                continue;
            };

            let mergeclauses = find_mergeclauses_for_pathkeys(&outerpath.pathkeys, true, &mergeclause_list);
            // FULL joins without any join clause still merge, on no keys at all.
            if mergeclauses.is_empty() && jointype != JoinType::Full {
                continue;
            }
            if use_all_clauses && mergeclauses.len() != mergeclause_list.len() {
                continue;
            }

            let innersortkeys = make_inner_pathkeys_for_merge(&mergeclauses, &outerpath.pathkeys, &self.ctx.eclasses)?;

            self.try_mergejoin_path(
                &outerpath,
                inner_cheapest_total,
                merge_pathkeys.clone(),
                mergeclauses.clone(),
                Vec::new(),
                innersortkeys.clone(),
                jointype,
            )?;

            // The unique-ified inner path is the only inner candidate.
            if save_jointype == JoinType::UniqueInner {
                continue;
            }

            self.merge_with_presorted_inner(
                &outerpath,
                inner_cheapest_total,
                &merge_pathkeys,
                &mergeclauses,
                &innersortkeys,
                use_all_clauses,
                jointype,
            )?;
        }
        Ok(())
    }

    /// Try inner paths already sorted on a prefix of `innersortkeys`, from the
    /// full key list down to a single key. A shorter prefix uses fewer merge
    /// clauses, so its path is only tried when strictly cheaper than the best
    /// found with more keys. Total and startup cost are tracked separately.
    #[allow(clippy::too_many_arguments)]
    fn merge_with_presorted_inner(
        &mut self,
        outerpath: &Arc<Path>,
        inner_cheapest_total: &Arc<Path>,
        merge_pathkeys: &[PathKey],
        mergeclauses: &[OrientedClause],
        innersortkeys: &[PathKey],
        use_all_clauses: bool,
        jointype: JoinType,
    ) -> Result<(), PlanError> {
        let innerrel = self.innerrel;
        let num_sortkeys = innersortkeys.len();

        // The sorted merge above already covers the cheapest inner path when it
        // needed no sort.
        let (mut cheapest_startup_inner, mut cheapest_total_inner) =
            if pathkeys_contained_in(innersortkeys, &inner_cheapest_total.pathkeys) {
                (Some(inner_cheapest_total.clone()), Some(inner_cheapest_total.clone()))
            } else {
                (None, None)
            };

        let clauses_for = |trial: &[PathKey]| -> Vec<OrientedClause> {
            if trial.len() < num_sortkeys {
                find_mergeclauses_for_pathkeys(trial, false, mergeclauses)
            } else {
                mergeclauses.to_vec()
            }
        };

        let unparameterized = RelIds::empty();
        for sortkeycnt in (1..=num_sortkeys).rev() {
            let trialsortkeys = &innersortkeys[..sortkeycnt];
            let mut newclauses: Option<Vec<OrientedClause>> = None;

            if let Some(innerpath) =
                get_cheapest_path_for_pathkeys(&innerrel.pathlist, trialsortkeys, &unparameterized, CostCriterion::Total)
            {
                let cheaper = cheapest_total_inner
                    .as_ref()
                    .map_or(true, |best| compare_path_costs(innerpath, best, CostCriterion::Total) == Ordering::Less);
                if cheaper {
                    let clauses = clauses_for(trialsortkeys);
                    self.try_mergejoin_path(
                        outerpath,
                        innerpath,
                        merge_pathkeys.to_vec(),
                        clauses.clone(),
                        Vec::new(),
                        Vec::new(),
                        jointype,
                    )?;
                    newclauses = Some(clauses);
                    cheapest_total_inner = Some(innerpath.clone());
                }
            }

            if let Some(innerpath) =
                get_cheapest_path_for_pathkeys(&innerrel.pathlist, trialsortkeys, &unparameterized, CostCriterion::Startup)
            {
                let cheaper = cheapest_startup_inner
                    .as_ref()
                    .map_or(true, |best| compare_path_costs(innerpath, best, CostCriterion::Startup) == Ordering::Less);
                if cheaper {
                    let already_tried = cheapest_total_inner
                        .as_ref()
                        .is_some_and(|best| Arc::ptr_eq(best, innerpath));
                    if !already_tried {
                        let clauses = newclauses.take().unwrap_or_else(|| clauses_for(trialsortkeys));
                        self.try_mergejoin_path(
                            outerpath,
                            innerpath,
                            merge_pathkeys.to_vec(),
                            clauses,
                            Vec::new(),
                            Vec::new(),
                            jointype,
                        )?;
                    }
                    cheapest_startup_inner = Some(innerpath.clone());
                }
            }

            // RIGHT and FULL joins cannot drop any merge clause.
            if use_all_clauses {
                break;
            }
        }
        Ok(())
    }
}
