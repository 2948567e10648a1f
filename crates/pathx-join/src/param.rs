//! Parameterization checks for candidate join paths.
//!
//! Each resolver returns the required-outer set of the join path that would be
//! built from an outer and inner path, or `None` when such a path is not worth
//! building.

use crate::extra::JoinPathExtraData;
use pathx_core::context::PlannerContext;
use pathx_core::path::Path;
use pathx_core::pathnode::{calc_nestloop_required_outer, calc_non_nestloop_required_outer};
use pathx_core::relids::RelIds;

/// Star-schema exception: keep a parameterized nested loop whose outer side
/// supplies some, but not all, of the inner side's parameters.
///
/// With a fact table joined to several dimensions, an index on the fact table
/// that needs keys from two dimensions can only be reached by joining one
/// dimension into the other's parameterized scan first.
pub fn allow_star_schema_join(outer_relids: &RelIds, inner_paramrels: &RelIds) -> bool {
    inner_paramrels.overlaps(outer_relids) && inner_paramrels.nonempty_difference(outer_relids)
}

/// A placeholder evaluated inside the inner path that needs part of the outer
/// input plus more cannot be computed by this nested loop. Returns false for such
/// hazardous combinations.
pub fn check_hazardous_phv(ctx: &PlannerContext, outer: &Path, inner: &Path) -> bool {
    let inner_params = inner.required_outer();
    if inner_params.is_empty() {
        return true;
    }
    let outer_relids = &outer.parent;
    !ctx.placeholder_list.iter().any(|phinfo| {
        phinfo.eval_at.is_subset_of(inner_params)
            && phinfo.eval_at.overlaps(outer_relids)
            && !phinfo.eval_at.is_subset_of(outer_relids)
    })
}

pub fn nestloop_required_outer(
    ctx: &PlannerContext,
    extra: &JoinPathExtraData<'_>,
    outer: &Path,
    inner: &Path,
) -> Option<RelIds> {
    let mut required_outer = calc_nestloop_required_outer(outer, inner);
    if !required_outer.is_empty() {
        let purposeful = required_outer.overlaps(&extra.param_source_rels)
            || allow_star_schema_join(&outer.parent, inner.required_outer());
        if !purposeful || !check_hazardous_phv(ctx, outer, inner) {
            return None;
        }
    }
    required_outer.add_members(&extra.extra_lateral_rels);
    Some(required_outer)
}

/// Merge and hash joins: parameters of either side pass straight through, with no
/// star-schema exception.
pub fn non_nestloop_required_outer(extra: &JoinPathExtraData<'_>, outer: &Path, inner: &Path) -> Option<RelIds> {
    let mut required_outer = calc_non_nestloop_required_outer(outer, inner);
    if !required_outer.is_empty() && !required_outer.overlaps(&extra.param_source_rels) {
        return None;
    }
    required_outer.add_members(&extra.extra_lateral_rels);
    Some(required_outer)
}
