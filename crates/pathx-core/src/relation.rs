//! # Relations
//!
//! A `Relation` is a join input or join result: a base table, or the join of a set
//! of base tables. It owns the surviving candidate paths for producing its rows and,
//! after `set_cheapest`, remembers the cheapest of them by startup cost, by total
//! cost, and per parameterization.
//!
//! Paths are added only through `add_path` (see `admission`), which keeps the path
//! list free of dominated entries and sorted by total cost.

use crate::admission::{compare_path_costs, CostCriterion};
use crate::error::PlanError;
use crate::path::Path;
use crate::pathkeys::{compare_pathkeys, PathKeysComparison};
use crate::relids::{RelId, RelIds, SubsetComparison};
use crate::restrictinfo::RestrictInfo;
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// A stored table (or an append parent over partitions).
    BaseTable(RelId),
    /// A base relation that is not a table: subquery, function, VALUES list.
    OtherBase(RelId),
    Join,
}

#[derive(Debug, Clone)]
pub struct Relation {
    pub relids: RelIds,
    pub kind: RelationKind,
    /// Estimated output rows once all of the relation's own restrictions apply.
    pub rows: f64,
    /// Average output row width in bytes.
    pub width: u32,
    /// Candidate paths, sorted by total cost.
    pub pathlist: Vec<Arc<Path>>,
    pub cheapest_startup_path: Option<Arc<Path>>,
    pub cheapest_total_path: Option<Arc<Path>>,
    /// Cheapest unparameterized path first (if any), then every parameterized path.
    pub cheapest_parameterized_paths: Vec<Arc<Path>>,
    /// Clauses joining this relation to relations it does not yet include.
    pub joininfo: Vec<Arc<RestrictInfo>>,
}

impl Relation {
    pub fn base(relid: RelId, rows: f64, width: u32) -> Self {
        Self::new(RelIds::singleton(relid), RelationKind::BaseTable(relid), rows, width)
    }

    pub fn join(relids: RelIds, rows: f64, width: u32) -> Self {
        Self::new(relids, RelationKind::Join, rows, width)
    }

    pub fn new(relids: RelIds, kind: RelationKind, rows: f64, width: u32) -> Self {
        Self {
            relids,
            kind,
            rows,
            width,
            pathlist: Vec::new(),
            cheapest_startup_path: None,
            cheapest_total_path: None,
            cheapest_parameterized_paths: Vec::new(),
            joininfo: Vec::new(),
        }
    }

    pub fn with_joininfo(mut self, joininfo: Vec<Arc<RestrictInfo>>) -> Self {
        self.joininfo = joininfo;
        self
    }

    pub fn is_base_table(&self) -> bool {
        matches!(self.kind, RelationKind::BaseTable(_))
    }

    /// Does any path of this relation carry parameter information?
    pub fn has_param_paths(&self) -> bool {
        self.pathlist.iter().any(|p| p.param_info.is_some())
    }

    pub fn cheapest_total(&self) -> Result<&Arc<Path>, PlanError> {
        self.cheapest_total_path
            .as_ref()
            .ok_or_else(|| PlanError::MissingCheapestPath(self.relids.clone()))
    }

    /// Recompute the cheapest-path fields from the current path list.
    ///
    /// When the relation has no unparameterized path, the least-parameterized
    /// cheapest path stands in as `cheapest_total_path` and there is no
    /// `cheapest_startup_path`.
    pub fn set_cheapest(&mut self) -> Result<(), PlanError> {
        if self.pathlist.is_empty() {
            return Err(PlanError::NoPlanFound(self.relids.clone()));
        }

        let mut cheapest_startup: Option<&Arc<Path>> = None;
        let mut cheapest_total: Option<&Arc<Path>> = None;
        let mut best_param: Option<&Arc<Path>> = None;
        let mut parameterized: Vec<Arc<Path>> = Vec::new();

        for path in &self.pathlist {
            if path.is_parameterized() {
                parameterized.push(path.clone());
                if cheapest_total.is_some() {
                    continue;
                }
                best_param = match best_param {
                    None => Some(path),
                    Some(best) => match path.required_outer().subset_compare(best.required_outer()) {
                        SubsetComparison::Equal => {
                            if compare_path_costs(path, best, CostCriterion::Total) == Ordering::Less {
                                Some(path)
                            } else {
                                Some(best)
                            }
                        }
                        SubsetComparison::Subset1 => Some(path),
                        SubsetComparison::Subset2 | SubsetComparison::Different => Some(best),
                    },
                };
            } else {
                let (Some(startup), Some(total)) = (cheapest_startup, cheapest_total) else {
                    cheapest_startup = Some(path);
                    cheapest_total = Some(path);
                    continue;
                };
                if prefer_path(startup, path, CostCriterion::Startup) {
                    cheapest_startup = Some(path);
                }
                if prefer_path(total, path, CostCriterion::Total) {
                    cheapest_total = Some(path);
                }
            }
        }

        if let Some(total) = cheapest_total {
            parameterized.insert(0, total.clone());
        }
        self.cheapest_startup_path = cheapest_startup.cloned();
        self.cheapest_total_path = cheapest_total.or(best_param).cloned();
        self.cheapest_parameterized_paths = parameterized;
        Ok(())
    }
}

/// Should `candidate` replace `current` as the cheapest by `criterion`? Ties on
/// both costs go to the better-sorted path.
fn prefer_path(current: &Path, candidate: &Path, criterion: CostCriterion) -> bool {
    match compare_path_costs(current, candidate, criterion) {
        Ordering::Greater => true,
        Ordering::Equal => {
            compare_pathkeys(&current.pathkeys, &candidate.pathkeys) == PathKeysComparison::Better2
        }
        Ordering::Less => false,
    }
}
