//! # Path Admission
//!
//! `Relation::add_path` is the single gate through which candidate paths enter a
//! relation's path list. A new path survives only if no existing path dominates it,
//! and it evicts every existing path it dominates. Path A dominates path B when A
//! is no worse on all of:
//!
//! - startup cost and total cost (compared with a 1% fuzz factor),
//! - sort order (A's pathkeys equal or extend B's),
//! - parameterization (A's required-outer set is a subset of B's).
//!
//! When everything else ties, the path producing fewer rows wins. Failing that the
//! incumbent stays unless the newcomer is cheaper under a much tighter fuzz factor,
//! so near-identical paths do not churn the list.
//!
//! `add_path_precheck` answers the same question from cost estimates alone, so a
//! caller can skip building a path that would be rejected anyway.

use crate::path::Path;
use crate::pathkeys::{compare_pathkeys, PathKey, PathKeysComparison};
use crate::relation::Relation;
use crate::relids::{RelIds, SubsetComparison};
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::trace;

/// Costs within 1% of each other are considered equal when deciding dominance.
pub const STD_FUZZ_FACTOR: f64 = 1.01;

/// Fuzz used to break exact-tie cost comparisons.
const TIE_FUZZ_FACTOR: f64 = 1.000_000_000_1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostComparison {
    Equal,
    Better1,
    Better2,
    /// Each path wins on one of the two costs.
    Different,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostCriterion {
    Startup,
    Total,
}

/// Exact cost comparison by `criterion`, the other cost breaking ties.
pub fn compare_path_costs(path1: &Path, path2: &Path, criterion: CostCriterion) -> Ordering {
    let (s1, t1) = (OrderedFloat(path1.startup_cost), OrderedFloat(path1.total_cost));
    let (s2, t2) = (OrderedFloat(path2.startup_cost), OrderedFloat(path2.total_cost));
    match criterion {
        CostCriterion::Startup => s1.cmp(&s2).then(t1.cmp(&t2)),
        CostCriterion::Total => t1.cmp(&t2).then(s1.cmp(&s2)),
    }
}

/// Compare both costs of two paths, treating values within `fuzz_factor` of each
/// other as equal. Total cost is compared first: a path clearly cheaper in total is
/// better unless the other is clearly cheaper to start.
pub fn compare_path_costs_fuzzily(path1: &Path, path2: &Path, fuzz_factor: f64) -> CostComparison {
    if path1.total_cost > path2.total_cost * fuzz_factor {
        if path2.startup_cost > path1.startup_cost * fuzz_factor {
            return CostComparison::Different;
        }
        return CostComparison::Better2;
    }
    if path2.total_cost > path1.total_cost * fuzz_factor {
        if path1.startup_cost > path2.startup_cost * fuzz_factor {
            return CostComparison::Different;
        }
        return CostComparison::Better1;
    }
    // Fuzzily the same total cost; startup cost decides.
    if path1.startup_cost > path2.startup_cost * fuzz_factor {
        return CostComparison::Better2;
    }
    if path2.startup_cost > path1.startup_cost * fuzz_factor {
        return CostComparison::Better1;
    }
    CostComparison::Equal
}

/// Pathkeys as they matter for dominance. A parameterized path is only ever the
/// inner side of a nested loop, where its sort order is useless.
pub fn comparable_pathkeys(path: &Path) -> &[PathKey] {
    if path.is_parameterized() {
        &[]
    } else {
        &path.pathkeys
    }
}

/// Outcome of comparing a new path with one already in the list.
enum Verdict {
    KeepBoth,
    RejectNew,
    RemoveOld,
}

fn judge(new_path: &Path, old_path: &Path) -> Verdict {
    let costcmp = compare_path_costs_fuzzily(new_path, old_path, STD_FUZZ_FACTOR);
    if costcmp == CostComparison::Different {
        return Verdict::KeepBoth;
    }

    let keyscmp = match compare_pathkeys(comparable_pathkeys(new_path), comparable_pathkeys(old_path)) {
        PathKeysComparison::Different => return Verdict::KeepBoth,
        cmp => cmp,
    };
    let outercmp = new_path.required_outer().subset_compare(old_path.required_outer());

    match (costcmp, keyscmp) {
        (CostComparison::Equal, PathKeysComparison::Equal) => match outercmp {
            SubsetComparison::Equal => tie_break(new_path, old_path),
            SubsetComparison::Subset1 if new_path.rows <= old_path.rows => Verdict::RemoveOld,
            SubsetComparison::Subset2 if new_path.rows >= old_path.rows => Verdict::RejectNew,
            _ => Verdict::KeepBoth,
        },
        (CostComparison::Equal, PathKeysComparison::Better1)
        | (CostComparison::Better1, PathKeysComparison::Equal)
        | (CostComparison::Better1, PathKeysComparison::Better1) => {
            if matches!(outercmp, SubsetComparison::Equal | SubsetComparison::Subset1)
                && new_path.rows <= old_path.rows
            {
                Verdict::RemoveOld
            } else {
                Verdict::KeepBoth
            }
        }
        (CostComparison::Equal, PathKeysComparison::Better2)
        | (CostComparison::Better2, PathKeysComparison::Equal)
        | (CostComparison::Better2, PathKeysComparison::Better2) => {
            if matches!(outercmp, SubsetComparison::Equal | SubsetComparison::Subset2)
                && new_path.rows >= old_path.rows
            {
                Verdict::RejectNew
            } else {
                Verdict::KeepBoth
            }
        }
        // One is cheaper, the other better sorted.
        _ => Verdict::KeepBoth,
    }
}

/// Same cost, same keys, same parameterization.
fn tie_break(new_path: &Path, old_path: &Path) -> Verdict {
    if new_path.rows < old_path.rows {
        return Verdict::RemoveOld;
    }
    if new_path.rows > old_path.rows {
        return Verdict::RejectNew;
    }
    match compare_path_costs_fuzzily(new_path, old_path, TIE_FUZZ_FACTOR) {
        CostComparison::Better1 => Verdict::RemoveOld,
        _ => Verdict::RejectNew,
    }
}

impl Relation {
    /// Offer `new_path` to this relation. Returns whether it was kept.
    ///
    /// Survivors stay sorted by total cost; a new path goes after every existing
    /// path at least as cheap.
    pub fn add_path(&mut self, new_path: Arc<Path>) -> bool {
        let mut accept_new = true;
        let mut insert_at = 0;
        let mut i = 0;

        while i < self.pathlist.len() {
            let old_path = &self.pathlist[i];
            match judge(&new_path, old_path) {
                Verdict::RemoveOld => {
                    trace!("add_path {}: evicted {}", self.relids, old_path);
                    self.pathlist.remove(i);
                    continue;
                }
                Verdict::RejectNew => {
                    accept_new = false;
                    break;
                }
                Verdict::KeepBoth => {
                    if new_path.total_cost >= old_path.total_cost {
                        insert_at = i + 1;
                    }
                }
            }
            i += 1;
        }

        if accept_new {
            trace!("add_path {}: accepted {}", self.relids, new_path);
            self.pathlist.insert(insert_at, new_path);
        } else {
            trace!("add_path {}: rejected {}", self.relids, new_path);
        }
        accept_new
    }

    /// Would a path with these properties be rejected by `add_path`?
    ///
    /// Returns true if the path is worth building. The check is conservative: a
    /// false result guarantees rejection, a true result does not guarantee
    /// acceptance, since the final costs can be higher than the estimates.
    pub fn add_path_precheck(
        &self,
        startup_cost: f64,
        total_cost: f64,
        pathkeys: &[PathKey],
        required_outer: &RelIds,
    ) -> bool {
        let new_keys: &[PathKey] = if required_outer.is_empty() { pathkeys } else { &[] };

        for old_path in &self.pathlist {
            // The list is sorted by total cost, so nothing further on can dominate.
            if total_cost <= old_path.total_cost * STD_FUZZ_FACTOR {
                break;
            }
            if startup_cost > old_path.startup_cost * STD_FUZZ_FACTOR
                && matches!(
                    compare_pathkeys(new_keys, comparable_pathkeys(old_path)),
                    PathKeysComparison::Equal | PathKeysComparison::Better2
                )
                && required_outer == old_path.required_outer()
            {
                return false;
            }
        }
        true
    }
}

/// The cheapest path in `paths` that is sorted by (at least) `pathkeys` and needs no
/// parameters outside `required_outer`.
pub fn get_cheapest_path_for_pathkeys<'a>(
    paths: &'a [Arc<Path>],
    pathkeys: &[PathKey],
    required_outer: &RelIds,
    criterion: CostCriterion,
) -> Option<&'a Arc<Path>> {
    let mut matched: Option<&Arc<Path>> = None;
    for path in paths {
        if let Some(best) = matched {
            if compare_path_costs(best, path, criterion) != Ordering::Greater {
                continue;
            }
        }
        if crate::pathkeys::pathkeys_contained_in(pathkeys, &path.pathkeys)
            && path.required_outer().is_subset_of(required_outer)
        {
            matched = Some(path);
        }
    }
    matched
}
