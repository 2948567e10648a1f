//! # Join Planner
//!
//! `JoinPlanner` is the entry point of the enumerator. For one join relation and
//! one ordered pair of inputs, `add_paths_to_joinrel` proposes every candidate
//! join path worth considering and offers each to the join relation's path list.
//!
//! ## Enumeration Order
//!
//! 1. Build the call context: merge-joinable clauses, semi/anti join factors, the
//!    relations allowed to parameterize results, and extra lateral requirements.
//! 2. Try planning the join underneath an append outer input (inner and semi
//!    joins only).
//! 3. Sort-merge: explicitly sort both cheapest inputs.
//! 4. Unsorted outer: nested loops against every outer path, plus merge joins that
//!    reuse whatever order each outer path already has.
//! 5. Hash joins.
//! 6. Extension hooks.
//!
//! Steps 3 and 4 are skipped entirely for a RIGHT or FULL join with a join clause
//! that is not merge-joinable; FULL joins then have no way to be executed unless
//! hashing applies.
//!
//! `make_join_rel` wraps this for a pair of relations: it builds the join relation,
//! enumerates each input order the join type permits, and picks the cheapest
//! paths.

use crate::clauses::{select_mergejoin_clauses, MergeClauseSelection};
use crate::config::JoinSearchConfig;
use crate::extra::{extra_lateral_rels, param_source_rels, JoinPathExtraData};
use crate::hook::JoinPathHook;
use pathx_core::catalog::Catalog;
use pathx_core::context::{PlannerContext, SpecialJoinInfo};
use pathx_core::cost::{CostModel, SemiAntiJoinFactors};
use pathx_core::error::PlanError;
use pathx_core::expr::JoinType;
use pathx_core::pathnode::create_unique_path;
use pathx_core::relation::Relation;
use pathx_core::restrictinfo::RestrictInfo;
use pathx_core::stats::clauselist_selectivity;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// What happened to the append pushdown during one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum PushdownOutcome {
    /// Disabled, or the join type does not allow it.
    #[default]
    NotAttempted,
    /// Preconditions not met; nothing was built.
    Skipped,
    /// Some child could not be planned; everything built was discarded.
    Aborted,
    /// Number of append paths offered to the join relation.
    Added(usize),
}

/// Counters for one `add_paths_to_joinrel` call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JoinPathStats {
    pub nestloop_considered: usize,
    pub mergejoin_considered: usize,
    pub hashjoin_considered: usize,
    pub rejected_by_parameterization: usize,
    pub rejected_by_precheck: usize,
    /// Fully built paths offered to `add_path`.
    pub submitted: usize,
    pub admitted: usize,
    /// Lowest total cost among submitted unparameterized paths.
    pub cheapest_submitted_total: Option<f64>,
    pub mergejoin_allowed: bool,
    pub pushdown: PushdownOutcome,
    pub hook_paths_admitted: usize,
}

/// Generates join paths with a pluggable cost model and catalog.
pub struct JoinPlanner {
    pub cost_model: Arc<dyn CostModel>,
    pub catalog: Arc<dyn Catalog>,
    pub config: JoinSearchConfig,
    pub(crate) hooks: Vec<Box<dyn JoinPathHook>>,
}

impl JoinPlanner {
    pub fn new(cost_model: Arc<dyn CostModel>, catalog: Arc<dyn Catalog>, config: JoinSearchConfig) -> Self {
        Self {
            cost_model,
            catalog,
            config,
            hooks: Vec::new(),
        }
    }

    /// Register a hook run after the built-in generators on every call.
    pub fn with_hook(mut self, hook: Box<dyn JoinPathHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Build an empty join relation for `rel1` and `rel2`, sized with the
    /// selectivity of `restrictlist`.
    pub fn build_join_rel(
        &self,
        rel1: &Relation,
        rel2: &Relation,
        sjinfo: &SpecialJoinInfo,
        restrictlist: &[Arc<RestrictInfo>],
    ) -> Relation {
        let relids = rel1.relids.union(&rel2.relids);
        let selectivity = clauselist_selectivity(restrictlist, self.catalog.as_ref());
        let rows = self
            .cost_model
            .join_rel_size(rel1.rows, rel2.rows, sjinfo.jointype, selectivity);

        // Clauses still referencing relations outside the join.
        let mut joininfo: Vec<Arc<RestrictInfo>> = Vec::new();
        for rinfo in rel1.joininfo.iter().chain(rel2.joininfo.iter()) {
            if rinfo.clause_relids.is_subset_of(&relids) || joininfo.iter().any(|r| Arc::ptr_eq(r, rinfo)) {
                continue;
            }
            joininfo.push(rinfo.clone());
        }

        Relation::join(relids, rows, rel1.width + rel2.width).with_joininfo(joininfo)
    }

    /// Plan the join of `rel1` and `rel2` described by `sjinfo`.
    ///
    /// `rel1` is the syntactic left side. Both input orders are enumerated when
    /// the join type allows it: inner and FULL joins are symmetric, LEFT joins are
    /// also tried as RIGHT joins with the inputs swapped, and semi joins are also
    /// tried as inner joins against a unique-ified right side.
    pub fn make_join_rel(
        &self,
        ctx: &PlannerContext,
        rel1: &Relation,
        rel2: &Relation,
        sjinfo: &SpecialJoinInfo,
        restrictlist: &[Arc<RestrictInfo>],
    ) -> Result<Relation, PlanError> {
        let mut joinrel = self.build_join_rel(rel1, rel2, sjinfo, restrictlist);

        let mut orders: Vec<(&Relation, &Relation, JoinType)> = Vec::new();
        match sjinfo.jointype {
            JoinType::Inner => {
                orders.push((rel1, rel2, JoinType::Inner));
                orders.push((rel2, rel1, JoinType::Inner));
            }
            JoinType::Left => {
                orders.push((rel1, rel2, JoinType::Left));
                orders.push((rel2, rel1, JoinType::Right));
            }
            JoinType::Right => {
                orders.push((rel1, rel2, JoinType::Right));
                orders.push((rel2, rel1, JoinType::Left));
            }
            JoinType::Full => {
                orders.push((rel1, rel2, JoinType::Full));
                orders.push((rel2, rel1, JoinType::Full));
            }
            JoinType::Semi => {
                if sjinfo.min_lefthand.is_subset_of(&rel1.relids) && sjinfo.min_righthand.is_subset_of(&rel2.relids) {
                    orders.push((rel1, rel2, JoinType::Semi));
                }
                if rel2.relids == sjinfo.syn_righthand && self.can_unique_ify(rel2, sjinfo) {
                    orders.push((rel1, rel2, JoinType::UniqueInner));
                    orders.push((rel2, rel1, JoinType::UniqueOuter));
                }
            }
            JoinType::Anti => orders.push((rel1, rel2, JoinType::Anti)),
            jointype @ (JoinType::UniqueOuter | JoinType::UniqueInner) => {
                return Err(PlanError::UnsupportedJoinType {
                    jointype,
                    context: "make_join_rel",
                })
            }
        }

        for (outer, inner, jointype) in orders {
            self.add_paths_to_joinrel(ctx, &mut joinrel, outer, inner, jointype, sjinfo, restrictlist)?;
        }

        joinrel.set_cheapest()?;
        debug!(
            "make_join_rel {}: {} paths, cheapest total {:.2}",
            joinrel.relids,
            joinrel.pathlist.len(),
            joinrel.cheapest_total()?.total_cost
        );
        Ok(joinrel)
    }

    fn can_unique_ify(&self, rel: &Relation, sjinfo: &SpecialJoinInfo) -> bool {
        rel.cheapest_total_path.as_ref().is_some_and(|path| {
            create_unique_path(self.cost_model.as_ref(), self.catalog.as_ref(), rel, path, sjinfo).is_some()
        })
    }

    /// Offer every worthwhile join path for `outerrel` joined to `innerrel` to
    /// `joinrel`. Both inputs must already have had `set_cheapest` run.
    #[allow(clippy::too_many_arguments)]
    pub fn add_paths_to_joinrel(
        &self,
        ctx: &PlannerContext,
        joinrel: &mut Relation,
        outerrel: &Relation,
        innerrel: &Relation,
        jointype: JoinType,
        sjinfo: &SpecialJoinInfo,
        restrictlist: &[Arc<RestrictInfo>],
    ) -> Result<JoinPathStats, PlanError> {
        let selectivity = clauselist_selectivity(restrictlist, self.catalog.as_ref());

        // FULL joins have no strategy but merge and hash, so they ignore the
        // merge join switch.
        let MergeClauseSelection {
            clauses: mergeclause_list,
            mergejoin_allowed,
        } = if self.config.enable_mergejoin || jointype == JoinType::Full {
            select_mergejoin_clauses(ctx, &outerrel.relids, &innerrel.relids, restrictlist, jointype)
        } else {
            MergeClauseSelection {
                clauses: Vec::new(),
                mergejoin_allowed: true,
            }
        };

        let semifactors = match jointype {
            JoinType::Semi | JoinType::Anti => {
                self.cost_model
                    .semi_anti_join_factors(jointype, outerrel.rows, innerrel.rows, selectivity)
            }
            _ => SemiAntiJoinFactors::default(),
        };

        let extra = JoinPathExtraData {
            restrictlist,
            mergeclause_list,
            mergejoin_allowed,
            sjinfo,
            semifactors,
            selectivity,
            param_source_rels: param_source_rels(ctx, &joinrel.relids),
            extra_lateral_rels: extra_lateral_rels(ctx, &joinrel.relids, &outerrel.relids, &innerrel.relids),
        };

        let mut search = JoinSearch {
            planner: self,
            ctx,
            joinrel,
            outerrel,
            innerrel,
            jointype,
            extra,
            stats: JoinPathStats {
                mergejoin_allowed,
                ..JoinPathStats::default()
            },
        };
        search.run()?;

        let stats = search.stats;
        debug!(
            "add_paths_to_joinrel {} = {} {} {}: nestloop={} merge={} hash={} submitted={} admitted={} pushdown={:?}",
            search.joinrel.relids,
            outerrel.relids,
            jointype,
            innerrel.relids,
            stats.nestloop_considered,
            stats.mergejoin_considered,
            stats.hashjoin_considered,
            stats.submitted,
            stats.admitted,
            stats.pushdown
        );
        Ok(stats)
    }
}

/// State of one `add_paths_to_joinrel` call, shared by the generators.
pub(crate) struct JoinSearch<'a> {
    pub(crate) planner: &'a JoinPlanner,
    pub(crate) ctx: &'a PlannerContext,
    pub(crate) joinrel: &'a mut Relation,
    pub(crate) outerrel: &'a Relation,
    pub(crate) innerrel: &'a Relation,
    /// Join type as requested, possibly a unique-ify variant.
    pub(crate) jointype: JoinType,
    pub(crate) extra: JoinPathExtraData<'a>,
    pub(crate) stats: JoinPathStats,
}

impl JoinSearch<'_> {
    fn run(&mut self) -> Result<(), PlanError> {
        let config = &self.planner.config;
        if config.enable_append_pushdown
            && matches!(self.jointype, JoinType::Inner | JoinType::Semi | JoinType::UniqueInner)
        {
            self.try_append_pushdown();
        }

        if self.extra.mergejoin_allowed {
            self.sort_inner_and_outer()?;
            self.match_unsorted_outer()?;
        }

        if self.planner.config.enable_hashjoin || self.jointype == JoinType::Full {
            self.hash_inner_and_outer()?;
        }

        self.run_hooks()
    }
}
