//! # Path Constructors
//!
//! Builders for every kind of path the join enumerator creates. Each constructor
//! asks the cost model for the path's costs and fills in its output properties
//! (rows, width, ordering, parameterization); none of them admits the path
//! anywhere. Join constructors expect the preliminary `JoinCostWorkspace` the
//! enumerator already computed for its precheck.

use crate::catalog::Catalog;
use crate::context::SpecialJoinInfo;
use crate::cost::{CostModel, JoinCostInput, JoinCostWorkspace, JoinMethod, SemiAntiJoinFactors};
use crate::error::PlanError;
use crate::expr::JoinType;
use crate::path::{HashPath, JoinPath, MergePath, ParamPathInfo, Path, PathKind, ScanKind, UniqueMethod};
use crate::pathkeys::PathKey;
use crate::relation::Relation;
use crate::relids::RelIds;
use crate::restrictinfo::{OrientedClause, RestrictInfo};
use crate::stats::{estimate_num_groups, Statistics};
use std::sync::Arc;

/// Parameterization of a nested loop: the inner side's parameters the outer side
/// does not supply itself, plus whatever the outer side needs.
pub fn calc_nestloop_required_outer(outer: &Path, inner: &Path) -> RelIds {
    let inner_req = inner.required_outer();
    if inner_req.is_empty() {
        return outer.required_outer().clone();
    }
    let mut required = outer.required_outer().union(inner_req);
    required.del_members(&outer.parent);
    required
}

/// Parameterization of a merge or hash join: both sides' needs. Neither side can
/// supply the other's parameters.
pub fn calc_non_nestloop_required_outer(outer: &Path, inner: &Path) -> RelIds {
    outer.required_outer().union(inner.required_outer())
}

pub fn create_scan_path(
    cost_model: &dyn CostModel,
    rel: &Relation,
    kind: ScanKind,
    stats: &Statistics,
    pathkeys: Vec<PathKey>,
    param_info: Option<ParamPathInfo>,
) -> Path {
    let qual_count = param_info.as_ref().map_or(0, |p| p.clauses.len());
    let (startup_cost, total_cost) = cost_model.cost_scan(&kind, stats, qual_count);
    let rows = param_info.as_ref().map_or(rel.rows, |p| p.rows);
    Path {
        kind: PathKind::Scan(kind),
        parent: rel.relids.clone(),
        param_info,
        rows,
        width: rel.width,
        startup_cost,
        total_cost,
        pathkeys,
    }
}

/// Wrap `subpath` in a node that buffers its output, so rescans are cheap.
pub fn create_material_path(cost_model: &dyn CostModel, subpath: &Arc<Path>) -> Path {
    let (startup_cost, total_cost) = cost_model.cost_material(subpath);
    Path {
        kind: PathKind::Material {
            subpath: subpath.clone(),
        },
        parent: subpath.parent.clone(),
        param_info: subpath.param_info.clone(),
        rows: subpath.rows,
        width: subpath.width,
        startup_cost,
        total_cost,
        pathkeys: subpath.pathkeys.clone(),
    }
}

/// Remove duplicate semi-join keys from `subpath`, so a semi join can be run as a
/// plain inner join with `rel` on either side.
///
/// Returns `None` when `sjinfo` is not a semi join or its right-hand expressions
/// can be neither sorted nor hashed.
pub fn create_unique_path(
    cost_model: &dyn CostModel,
    catalog: &dyn Catalog,
    rel: &Relation,
    subpath: &Arc<Path>,
    sjinfo: &SpecialJoinInfo,
) -> Option<Path> {
    if sjinfo.jointype != JoinType::Semi || !(sjinfo.semi_can_btree || sjinfo.semi_can_hash) {
        return None;
    }
    let exprs = &sjinfo.semi_rhs_exprs;
    let rows = estimate_num_groups(exprs, subpath.rows, catalog);

    let sorted = sjinfo
        .semi_can_btree
        .then(|| (UniqueMethod::Sort, cost_model.cost_unique(subpath, UniqueMethod::Sort, exprs.len(), rows)));
    let hashed = sjinfo
        .semi_can_hash
        .then(|| (UniqueMethod::Hash, cost_model.cost_unique(subpath, UniqueMethod::Hash, exprs.len(), rows)));
    let (method, (startup_cost, total_cost)) = match (sorted, hashed) {
        (Some(sort), Some(hash)) => {
            let (_, (_, sort_total)) = sort;
            let (_, (_, hash_total)) = hash;
            if hash_total < sort_total {
                hash
            } else {
                sort
            }
        }
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => return None,
    };

    Some(Path {
        kind: PathKind::Unique {
            subpath: subpath.clone(),
            method,
            exprs: exprs.clone(),
        },
        parent: rel.relids.clone(),
        param_info: subpath.param_info.clone(),
        rows,
        width: subpath.width,
        startup_cost,
        total_cost,
        pathkeys: Vec::new(),
    })
}

/// Call-level inputs shared by the three join constructors.
#[derive(Clone, Copy)]
pub struct JoinPathContext<'a> {
    pub cost_model: &'a dyn CostModel,
    pub joinrel: &'a Relation,
    /// Already reduced from the unique-ify variants.
    pub jointype: JoinType,
    pub sjinfo: &'a SpecialJoinInfo,
    pub semifactors: &'a SemiAntiJoinFactors,
    /// Combined selectivity of the join's restriction clauses.
    pub selectivity: f64,
    pub enable_material: bool,
}

impl<'a> JoinPathContext<'a> {
    fn cost_input<'p>(&self, outer: &'p Path, inner: &'p Path) -> JoinCostInput<'p>
    where
        'a: 'p,
    {
        JoinCostInput {
            jointype: self.jointype,
            outer,
            inner,
            sjinfo: self.sjinfo,
            semifactors: self.semifactors,
        }
    }

    /// Output rows and parameter info of a join path with `required_outer`.
    fn param_info(&self, outer: &Path, inner: &Path, required_outer: RelIds) -> (Option<ParamPathInfo>, f64) {
        if required_outer.is_empty() {
            return (None, self.joinrel.rows);
        }
        let rows = self.cost_model.parameterized_join_rows(
            outer,
            inner,
            self.jointype,
            self.selectivity,
            self.joinrel.rows,
        );
        let info = ParamPathInfo {
            required_outer,
            rows,
            clauses: Vec::new(),
        };
        (Some(info), rows)
    }

    fn join_path(&self, outer: Arc<Path>, inner: Arc<Path>, restrictlist: Vec<Arc<RestrictInfo>>) -> JoinPath {
        JoinPath {
            jointype: self.jointype,
            outer,
            inner,
            joinrestrictinfo: restrictlist,
        }
    }
}

pub fn create_nestloop_path(
    cx: &JoinPathContext<'_>,
    workspace: &JoinCostWorkspace,
    outer: Arc<Path>,
    inner: Arc<Path>,
    restrictlist: &[Arc<RestrictInfo>],
    pathkeys: Vec<PathKey>,
    required_outer: RelIds,
) -> Result<Path, PlanError> {
    // Clauses the parameterized inner path already enforces are not rechecked.
    let restrictlist: Vec<Arc<RestrictInfo>> = match &inner.param_info {
        Some(ppi) if inner.is_parameterized() => restrictlist
            .iter()
            .filter(|ri| !ppi.clauses.iter().any(|c| Arc::ptr_eq(c, ri)))
            .cloned()
            .collect(),
        _ => restrictlist.to_vec(),
    };

    let (param_info, rows) = cx.param_info(&outer, &inner, required_outer);
    let cost = cx.cost_model.final_join_cost(
        JoinMethod::NestLoop,
        &cx.cost_input(&outer, &inner),
        workspace,
        rows,
        restrictlist.len(),
        cx.enable_material,
    )?;

    Ok(Path {
        kind: PathKind::NestLoop(cx.join_path(outer, inner, restrictlist)),
        parent: cx.joinrel.relids.clone(),
        param_info,
        rows,
        width: cx.joinrel.width,
        startup_cost: cost.startup_cost,
        total_cost: cost.total_cost,
        pathkeys,
    })
}

#[allow(clippy::too_many_arguments)]
pub fn create_mergejoin_path(
    cx: &JoinPathContext<'_>,
    workspace: &JoinCostWorkspace,
    outer: Arc<Path>,
    inner: Arc<Path>,
    restrictlist: &[Arc<RestrictInfo>],
    pathkeys: Vec<PathKey>,
    required_outer: RelIds,
    mergeclauses: Vec<OrientedClause>,
    outersortkeys: Vec<PathKey>,
    innersortkeys: Vec<PathKey>,
) -> Result<Path, PlanError> {
    let (param_info, rows) = cx.param_info(&outer, &inner, required_outer);
    let method = JoinMethod::MergeJoin {
        mergeclauses: &mergeclauses,
        outersortkeys: &outersortkeys,
        innersortkeys: &innersortkeys,
    };
    let cost = cx.cost_model.final_join_cost(
        method,
        &cx.cost_input(&outer, &inner),
        workspace,
        rows,
        restrictlist.len(),
        cx.enable_material,
    )?;

    Ok(Path {
        kind: PathKind::MergeJoin(MergePath {
            join: cx.join_path(outer, inner, restrictlist.to_vec()),
            mergeclauses,
            outersortkeys,
            innersortkeys,
            outer_sort_cost: workspace.outer_sort_cost,
            inner_sort_cost: workspace.inner_sort_cost,
            materialize_inner: cost.materialize_inner,
        }),
        parent: cx.joinrel.relids.clone(),
        param_info,
        rows,
        width: cx.joinrel.width,
        startup_cost: cost.startup_cost,
        total_cost: cost.total_cost,
        pathkeys,
    })
}

pub fn create_hashjoin_path(
    cx: &JoinPathContext<'_>,
    workspace: &JoinCostWorkspace,
    outer: Arc<Path>,
    inner: Arc<Path>,
    restrictlist: &[Arc<RestrictInfo>],
    required_outer: RelIds,
    hashclauses: Vec<OrientedClause>,
) -> Result<Path, PlanError> {
    let (param_info, rows) = cx.param_info(&outer, &inner, required_outer);
    let cost = cx.cost_model.final_join_cost(
        JoinMethod::HashJoin {
            hashclauses: &hashclauses,
        },
        &cx.cost_input(&outer, &inner),
        workspace,
        rows,
        restrictlist.len(),
        cx.enable_material,
    )?;

    Ok(Path {
        kind: PathKind::HashJoin(HashPath {
            join: cx.join_path(outer, inner, restrictlist.to_vec()),
            hashclauses,
            num_batches: workspace.num_batches,
        }),
        parent: cx.joinrel.relids.clone(),
        param_info,
        rows,
        width: cx.joinrel.width,
        startup_cost: cost.startup_cost,
        total_cost: cost.total_cost,
        // Hash join output is unordered.
        pathkeys: Vec::new(),
    })
}

/// Concatenate unparameterized `subpaths` into one path for `rel`.
pub fn create_append_path(cost_model: &dyn CostModel, rel: &Relation, subpaths: Vec<Arc<Path>>) -> Path {
    let (startup_cost, total_cost) = cost_model.cost_append(&subpaths);
    let rows = subpaths.iter().map(|p| p.rows).sum();
    Path {
        kind: PathKind::Append { subpaths },
        parent: rel.relids.clone(),
        param_info: None,
        rows,
        width: rel.width,
        startup_cost,
        total_cost,
        pathkeys: Vec::new(),
    }
}
