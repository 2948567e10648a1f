//! Merge joins over explicitly sorted inputs.
//!
//! Only the cheapest-total path of each input is considered, sorted as needed.
//! Any ordering that covers every merge clause works, so several candidate outer
//! orderings are tried: the heuristic one, then one per merge key with that key
//! moved to the front. The differences matter only above this join, where the
//! result's order may save a sort.

use crate::planner::JoinSearch;
use pathx_core::error::PlanError;
use pathx_core::expr::JoinType;
use pathx_core::pathkeys::{
    build_join_pathkeys, find_mergeclauses_for_pathkeys, make_inner_pathkeys_for_merge, select_outer_pathkeys_for_merge,
    PathKey,
};

impl JoinSearch<'_> {
    pub(crate) fn sort_inner_and_outer(&mut self) -> Result<(), PlanError> {
        let outerrel = self.outerrel;
        let innerrel = self.innerrel;
        let mut outer_path = outerrel.cheapest_total()?.clone();
        let mut inner_path = innerrel.cheapest_total()?.clone();

        // A path needing parameters from the other input cannot be sorted and
        // merged against it.
        if outer_path.param_by_rel(&innerrel.relids) || inner_path.param_by_rel(&outerrel.relids) {
            return Ok(());
        }

        let jointype = match self.jointype {
            JoinType::UniqueOuter => {
                outer_path = self.unique_ify(outerrel, &outer_path)?;
                JoinType::Inner
            }
            JoinType::UniqueInner => {
                inner_path = self.unique_ify(innerrel, &inner_path)?;
                JoinType::Inner
            }
            jointype => jointype,
        };

        let mergeclause_list = self.extra.mergeclause_list.clone();
        let all_pathkeys = select_outer_pathkeys_for_merge(self.ctx, &mergeclause_list, self.joinrel);

        for (i, front) in all_pathkeys.iter().enumerate() {
            let outerkeys: Vec<PathKey> = if i == 0 {
                all_pathkeys.clone()
            } else {
                std::iter::once(*front)
                    .chain(
                        all_pathkeys
                            .iter()
                            .enumerate()
                            .filter(|(j, _)| *j != i)
                            .map(|(_, key)| *key),
                    )
                    .collect()
            };

            let cur_mergeclauses = find_mergeclauses_for_pathkeys(&outerkeys, true, &mergeclause_list);
            if cur_mergeclauses.len() != mergeclause_list.len() {
                return Err(PlanError::MergeClausesNotConsumed {
                    used: cur_mergeclauses.len(),
                    available: mergeclause_list.len(),
                });
            }
            let innerkeys = make_inner_pathkeys_for_merge(&cur_mergeclauses, &outerkeys, &self.ctx.eclasses)?;
            let merge_pathkeys = build_join_pathkeys(self.ctx, self.joinrel, jointype, &outerkeys);

            self.try_mergejoin_path(
                &outer_path,
                &inner_path,
                merge_pathkeys,
                cur_mergeclauses,
                outerkeys,
                innerkeys,
                jointype,
            )?;
        }
        Ok(())
    }
}
