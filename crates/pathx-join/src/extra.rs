//! Per-call enumeration context.
//!
//! Everything here is computed once per `add_paths_to_joinrel` call and shared by
//! the generators. The two relation sets decide which parameterized join paths are
//! worth keeping:
//!
//! - `param_source_rels`: relations whose parameters a join path may usefully
//!   require. A parameterized path that needs none of them could only ever be
//!   used after joining in relations that this join must precede, so it is dead
//!   weight.
//! - `extra_lateral_rels`: relations a placeholder computed at this join reads
//!   laterally. Every path of the join needs them, so they are added to each
//!   candidate's required-outer set after the checks.

use pathx_core::context::{PlannerContext, SpecialJoinInfo};
use pathx_core::cost::SemiAntiJoinFactors;
use pathx_core::expr::JoinType;
use pathx_core::relids::RelIds;
use pathx_core::restrictinfo::{OrientedClause, RestrictInfo};
use std::sync::Arc;

pub struct JoinPathExtraData<'a> {
    pub restrictlist: &'a [Arc<RestrictInfo>],
    /// Merge-joinable clauses, oriented for this outer/inner pair.
    pub mergeclause_list: Vec<OrientedClause>,
    pub mergejoin_allowed: bool,
    pub sjinfo: &'a SpecialJoinInfo,
    pub semifactors: SemiAntiJoinFactors,
    /// Combined selectivity of `restrictlist`.
    pub selectivity: f64,
    pub param_source_rels: RelIds,
    pub extra_lateral_rels: RelIds,
}

/// Relations that may usefully parameterize paths of the join over `joinrel`.
///
/// A join that holds part of an outer join's minimal right-hand side but none of
/// its left-hand side must be completed below that outer join, so it may take
/// parameters from anything outside that right-hand side. FULL joins are
/// symmetric. Relations feeding a LATERAL reference satisfied inside the join
/// count too.
pub fn param_source_rels(ctx: &PlannerContext, joinrel: &RelIds) -> RelIds {
    let mut rels = RelIds::empty();
    for sjinfo in &ctx.join_info_list {
        if joinrel.overlaps(&sjinfo.min_righthand) && !joinrel.overlaps(&sjinfo.min_lefthand) {
            rels.add_members(&ctx.all_baserels.difference(&sjinfo.min_righthand));
        }
        if sjinfo.jointype == JoinType::Full
            && joinrel.overlaps(&sjinfo.min_lefthand)
            && !joinrel.overlaps(&sjinfo.min_righthand)
        {
            rels.add_members(&ctx.all_baserels.difference(&sjinfo.min_lefthand));
        }
    }
    for ljinfo in &ctx.lateral_info_list {
        if ljinfo.lateral_rhs.is_subset_of(joinrel) {
            rels.add_members(&ljinfo.lateral_lhs.difference(joinrel));
        }
    }
    rels
}

/// Lateral relations of placeholders first computable at this join: evaluated
/// within `joinrel` but on neither input alone.
pub fn extra_lateral_rels(ctx: &PlannerContext, joinrel: &RelIds, outer: &RelIds, inner: &RelIds) -> RelIds {
    let mut rels = RelIds::empty();
    for phinfo in &ctx.placeholder_list {
        let eval_at = &phinfo.eval_at;
        if !phinfo.lateral.is_empty()
            && eval_at.is_subset_of(joinrel)
            && !eval_at.is_subset_of(outer)
            && !eval_at.is_subset_of(inner)
        {
            rels.add_members(&phinfo.lateral);
        }
    }
    rels.del_members(joinrel);
    rels
}
