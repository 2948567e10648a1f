//! # Paths
//!
//! A `Path` is one candidate way of producing a relation's rows: a scan strategy for
//! a base relation, or a join strategy over two input paths. Paths are immutable
//! once built and are shared by `Arc`, since the same input path is referenced by
//! many candidate join paths at the next level up.
//!
//! ## Parameterization
//!
//! A path may depend on values from relations outside its own relation
//! (`param_info.required_outer`). Such a path can only be used as the inner side of
//! a nested loop whose outer side supplies those relations. `param_info` can also
//! carry extra filter clauses enforced by the path with an empty required-outer set;
//! such a path counts as unparameterized everywhere parameterization matters.

use crate::expr::{Expr, JoinType};
use crate::pathkeys::PathKey;
use crate::relids::RelIds;
use crate::restrictinfo::{OrientedClause, RestrictInfo};
use std::fmt;
use std::sync::Arc;

static NO_RELIDS: RelIds = RelIds::empty();

/// Parameterization and extra enforced clauses of a path.
#[derive(Debug, Clone)]
pub struct ParamPathInfo {
    pub required_outer: RelIds,
    /// Estimated rows once the parameter clauses are applied.
    pub rows: f64,
    /// Clauses the path enforces beyond its relation's own restrictions.
    pub clauses: Vec<Arc<RestrictInfo>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanKind {
    SeqScan,
    SampleScan,
    IndexScan { index: String },
    IndexOnlyScan { index: String },
    BitmapHeapScan,
    TidScan,
    FunctionScan,
    ValuesScan,
    CteScan,
    WorkTableScan,
    SubqueryScan,
}

impl ScanKind {
    /// Scans that read a stored table directly.
    pub fn is_table_scan(&self) -> bool {
        matches!(
            self,
            ScanKind::SeqScan
                | ScanKind::SampleScan
                | ScanKind::IndexScan { .. }
                | ScanKind::IndexOnlyScan { .. }
                | ScanKind::BitmapHeapScan
                | ScanKind::TidScan
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueMethod {
    Sort,
    Hash,
}

/// Fields shared by every join strategy.
#[derive(Debug, Clone)]
pub struct JoinPath {
    pub jointype: JoinType,
    pub outer: Arc<Path>,
    pub inner: Arc<Path>,
    /// Clauses checked at the join (all of them, including merge or hash keys).
    pub joinrestrictinfo: Vec<Arc<RestrictInfo>>,
}

#[derive(Debug, Clone)]
pub struct MergePath {
    pub join: JoinPath,
    pub mergeclauses: Vec<OrientedClause>,
    /// Sort applied to the outer input; empty when it is already ordered.
    pub outersortkeys: Vec<PathKey>,
    /// Sort applied to the inner input; empty when it is already ordered.
    pub innersortkeys: Vec<PathKey>,
    pub outer_sort_cost: f64,
    pub inner_sort_cost: f64,
    pub materialize_inner: bool,
}

#[derive(Debug, Clone)]
pub struct HashPath {
    pub join: JoinPath,
    pub hashclauses: Vec<OrientedClause>,
    pub num_batches: u32,
}

#[derive(Debug, Clone)]
pub enum PathKind {
    Scan(ScanKind),
    Material {
        subpath: Arc<Path>,
    },
    Unique {
        subpath: Arc<Path>,
        method: UniqueMethod,
        exprs: Vec<Expr>,
    },
    Append {
        subpaths: Vec<Arc<Path>>,
    },
    NestLoop(JoinPath),
    MergeJoin(MergePath),
    HashJoin(HashPath),
    /// A path contributed by an extension hook.
    Custom {
        name: String,
        children: Vec<Arc<Path>>,
    },
}

/// Data-free discriminant of `PathKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathTag {
    Scan,
    Material,
    Unique,
    Append,
    NestLoop,
    MergeJoin,
    HashJoin,
    Custom,
}

#[derive(Debug, Clone)]
pub struct Path {
    pub kind: PathKind,
    /// Relids of the relation this path produces.
    pub parent: RelIds,
    pub param_info: Option<ParamPathInfo>,
    pub rows: f64,
    /// Average output row width in bytes.
    pub width: u32,
    pub startup_cost: f64,
    pub total_cost: f64,
    pub pathkeys: Vec<PathKey>,
}

impl Path {
    pub fn tag(&self) -> PathTag {
        match &self.kind {
            PathKind::Scan(_) => PathTag::Scan,
            PathKind::Material { .. } => PathTag::Material,
            PathKind::Unique { .. } => PathTag::Unique,
            PathKind::Append { .. } => PathTag::Append,
            PathKind::NestLoop(_) => PathTag::NestLoop,
            PathKind::MergeJoin(_) => PathTag::MergeJoin,
            PathKind::HashJoin(_) => PathTag::HashJoin,
            PathKind::Custom { .. } => PathTag::Custom,
        }
    }

    pub fn required_outer(&self) -> &RelIds {
        self.param_info
            .as_ref()
            .map_or(&NO_RELIDS, |p| &p.required_outer)
    }

    pub fn is_parameterized(&self) -> bool {
        !self.required_outer().is_empty()
    }

    /// Does this path need parameters from any of `relids`?
    pub fn param_by_rel(&self, relids: &RelIds) -> bool {
        self.required_outer().overlaps(relids)
    }

    /// Join fields, for any of the three join strategies.
    pub fn join(&self) -> Option<&JoinPath> {
        match &self.kind {
            PathKind::NestLoop(j) => Some(j),
            PathKind::MergeJoin(m) => Some(&m.join),
            PathKind::HashJoin(h) => Some(&h.join),
            _ => None,
        }
    }

    /// Plans that buffer their entire output, so rescanning them is cheap.
    pub fn materializes_output(&self) -> bool {
        matches!(
            self.kind,
            PathKind::Material { .. }
                | PathKind::Scan(ScanKind::FunctionScan)
                | PathKind::Scan(ScanKind::CteScan)
                | PathKind::Scan(ScanKind::WorkTableScan)
        )
    }

    /// Plans that can back up to a marked row, as the inner side of a merge join
    /// must when the outer side has duplicate keys.
    pub fn supports_mark_restore(&self) -> bool {
        matches!(
            self.kind,
            PathKind::Material { .. }
                | PathKind::Scan(ScanKind::IndexScan { .. })
                | PathKind::Scan(ScanKind::IndexOnlyScan { .. })
                | PathKind::Scan(ScanKind::ValuesScan)
        )
    }

    /// Render the path tree, one node per line, indented by depth.
    pub fn display(&self, indent: usize) -> String {
        let mut out = String::new();
        self.write_tree(&mut out, indent);
        out
    }

    fn write_tree(&self, out: &mut String, depth: usize) {
        use std::fmt::Write;
        let _ = writeln!(out, "{}{}", "  ".repeat(depth), self);
        let children: Vec<&Arc<Path>> = match &self.kind {
            PathKind::Scan(_) => Vec::new(),
            PathKind::Material { subpath } | PathKind::Unique { subpath, .. } => vec![subpath],
            PathKind::Append { subpaths } => subpaths.iter().collect(),
            PathKind::Custom { children, .. } => children.iter().collect(),
            PathKind::NestLoop(j) => vec![&j.outer, &j.inner],
            PathKind::MergeJoin(m) => vec![&m.join.outer, &m.join.inner],
            PathKind::HashJoin(h) => vec![&h.join.outer, &h.join.inner],
        };
        for child in children {
            child.write_tree(out, depth + 1);
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PathKind::Scan(kind) => write!(f, "{:?} on {}", kind, self.parent)?,
            PathKind::Material { .. } => write!(f, "Material")?,
            PathKind::Unique { method, .. } => write!(f, "Unique({:?})", method)?,
            PathKind::Append { subpaths } => write!(f, "Append[{}]", subpaths.len())?,
            PathKind::NestLoop(j) => write!(f, "NestLoop {}", j.jointype)?,
            PathKind::MergeJoin(m) => write!(
                f,
                "MergeJoin {} clauses={} sort(outer={}, inner={})",
                m.join.jointype,
                m.mergeclauses.len(),
                m.outersortkeys.len(),
                m.innersortkeys.len()
            )?,
            PathKind::HashJoin(h) => write!(
                f,
                "HashJoin {} clauses={} batches={}",
                h.join.jointype,
                h.hashclauses.len(),
                h.num_batches
            )?,
            PathKind::Custom { name, .. } => write!(f, "Custom({})", name)?,
        }
        write!(
            f,
            " (cost={:.2}..{:.2} rows={:.0}",
            self.startup_cost, self.total_cost, self.rows
        )?;
        if self.is_parameterized() {
            write!(f, " required_outer={}", self.required_outer())?;
        }
        write!(f, ")")
    }
}
