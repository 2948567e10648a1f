//! Hash joins.
//!
//! The inner input is hashed on the hash-joinable clauses, so its order is
//! irrelevant and only the cheapest paths of each input are worth trying. Outer
//! paths are tried by cheapest startup cost (for plans that stop early) and by
//! each parameterization.

use crate::clauses::select_hashjoin_clauses;
use crate::planner::JoinSearch;
use pathx_core::error::PlanError;
use pathx_core::expr::JoinType;
use std::sync::Arc;

impl JoinSearch<'_> {
    pub(crate) fn hash_inner_and_outer(&mut self) -> Result<(), PlanError> {
        let outerrel = self.outerrel;
        let innerrel = self.innerrel;

        let hashclauses =
            select_hashjoin_clauses(&outerrel.relids, &innerrel.relids, self.extra.restrictlist, self.jointype);
        if hashclauses.is_empty() {
            return Ok(());
        }

        let cheapest_startup_outer = outerrel.cheapest_startup_path.clone();
        let cheapest_total_outer = outerrel.cheapest_total()?.clone();
        let cheapest_total_inner = innerrel.cheapest_total()?.clone();

        if cheapest_total_outer.param_by_rel(&innerrel.relids) || cheapest_total_inner.param_by_rel(&outerrel.relids) {
            return Ok(());
        }

        match self.jointype {
            JoinType::UniqueOuter => {
                let outer = self.unique_ify(outerrel, &cheapest_total_outer)?;
                self.try_hashjoin_path(&outer, &cheapest_total_inner, hashclauses, JoinType::Inner)?;
            }
            JoinType::UniqueInner => {
                let inner = self.unique_ify(innerrel, &cheapest_total_inner)?;
                self.try_hashjoin_path(&cheapest_total_outer, &inner, hashclauses.clone(), JoinType::Inner)?;
                if let Some(startup) = cheapest_startup_outer.as_ref() {
                    if !Arc::ptr_eq(startup, &cheapest_total_outer) {
                        self.try_hashjoin_path(startup, &inner, hashclauses, JoinType::Inner)?;
                    }
                }
            }
            jointype => {
                if let Some(startup) = cheapest_startup_outer.as_ref() {
                    self.try_hashjoin_path(startup, &cheapest_total_inner, hashclauses.clone(), jointype)?;
                }

                for outerpath in &outerrel.cheapest_parameterized_paths {
                    if outerpath.param_by_rel(&innerrel.relids) {
                        continue;
                    }
                    for innerpath in &innerrel.cheapest_parameterized_paths {
                        if innerpath.param_by_rel(&outerrel.relids) {
                            continue;
                        }
                        let already_tried = cheapest_startup_outer
                            .as_ref()
                            .is_some_and(|startup| Arc::ptr_eq(startup, outerpath))
                            && Arc::ptr_eq(innerpath, &cheapest_total_inner);
                        if already_tried {
                            continue;
                        }
                        self.try_hashjoin_path(outerpath, innerpath, hashclauses.clone(), jointype)?;
                    }
                }
            }
        }
        Ok(())
    }
}
