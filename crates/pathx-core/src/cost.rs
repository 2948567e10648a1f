//! # Cost Model
//!
//! This module defines the cost abstraction consulted by the join enumerator and a
//! default cost model.
//!
//! ## Two Costs Per Path
//!
//! Every path carries a **startup cost** (spent before the first row comes out) and
//! a **total cost** (spent to produce all rows). Both are in arbitrary units where
//! one sequential page fetch costs `seq_page_cost`. Keeping startup cost separate
//! matters for plans under a LIMIT and for the inner side of a nested loop, which
//! is restarted once per outer row.
//!
//! ## Two-Phase Join Costing
//!
//! Join costing is split in two, matching how the enumerator uses it:
//!
//! - `initial_join_cost` computes a cheap lower bound from the input paths alone.
//!   The enumerator compares it against existing paths (`add_path_precheck`) and
//!   drops the candidate if it cannot win.
//! - `final_join_cost` finishes the estimate for a candidate that survived, using
//!   the output row count and the number of join clauses. The partial results of
//!   the first phase are carried in a `JoinCostWorkspace`.
//!
//! ## Pluggable Design
//!
//! The `CostModel` trait allows replacing the default model with a custom one. The
//! `DefaultCostModel` knobs can be loaded from JSON; missing fields keep their
//! defaults.

use crate::context::SpecialJoinInfo;
use crate::error::PlanError;
use crate::expr::JoinType;
use crate::path::{Path, PathKind, ScanKind, UniqueMethod};
use crate::pathkeys::PathKey;
use crate::restrictinfo::OrientedClause;
use crate::stats::{clamp_row_est, Statistics, DEFAULT_NUM_DISTINCT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-tuple overhead assumed for in-memory row storage.
const TUPLE_OVERHEAD_BYTES: f64 = 24.0;

/// Join strategy being costed, with the strategy-specific inputs.
#[derive(Debug, Clone, Copy)]
pub enum JoinMethod<'a> {
    NestLoop,
    MergeJoin {
        mergeclauses: &'a [OrientedClause],
        /// Sort applied to the outer input, empty if none is needed.
        outersortkeys: &'a [PathKey],
        /// Sort applied to the inner input, empty if none is needed.
        innersortkeys: &'a [PathKey],
    },
    HashJoin {
        hashclauses: &'a [OrientedClause],
    },
}

/// For semi and anti joins: how many outer rows find a match, and how many inner
/// rows match each of them on average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SemiAntiJoinFactors {
    pub outer_match_frac: f64,
    pub match_count: f64,
}

impl Default for SemiAntiJoinFactors {
    fn default() -> Self {
        Self {
            outer_match_frac: 1.0,
            match_count: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct JoinCostInput<'a> {
    pub jointype: JoinType,
    pub outer: &'a Path,
    pub inner: &'a Path,
    pub sjinfo: &'a SpecialJoinInfo,
    pub semifactors: &'a SemiAntiJoinFactors,
}

/// Partial results of `initial_join_cost`, reused by `final_join_cost`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JoinCostWorkspace {
    pub startup_cost: f64,
    /// Lower bound on the total cost.
    pub total_cost: f64,
    pub run_cost: f64,
    pub inner_run_cost: f64,
    pub inner_rescan_run_cost: f64,
    pub outer_sort_cost: f64,
    pub inner_sort_cost: f64,
    pub num_batches: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalJoinCost {
    pub startup_cost: f64,
    pub total_cost: f64,
    /// Merge join only: put a Material node over the inner input.
    pub materialize_inner: bool,
}

/// Trait for pluggable cost models.
pub trait CostModel: Send + Sync {
    /// Cost of scanning a base relation, with `qual_count` clauses to evaluate per row.
    fn cost_scan(&self, kind: &ScanKind, stats: &Statistics, qual_count: usize) -> (f64, f64);

    /// Cost of sorting `tuples` rows of `width` bytes produced at `input_total`.
    fn cost_sort(&self, input_total: f64, tuples: f64, width: u32) -> (f64, f64);

    fn cost_material(&self, subpath: &Path) -> (f64, f64);

    /// Cost of scanning `path` again after its first execution.
    fn cost_rescan(&self, path: &Path) -> (f64, f64);

    /// Cost of removing duplicates from `subpath` on `num_cols` columns, leaving
    /// `output_rows` rows.
    fn cost_unique(&self, subpath: &Path, method: UniqueMethod, num_cols: usize, output_rows: f64) -> (f64, f64);

    fn cost_append(&self, subpaths: &[Arc<Path>]) -> (f64, f64);

    /// Output rows of joining `outer_rows` with `inner_rows` rows under a combined
    /// clause selectivity.
    fn join_rel_size(&self, outer_rows: f64, inner_rows: f64, jointype: JoinType, selectivity: f64) -> f64;

    /// Output rows of a parameterized join path. Parameter clauses only remove rows,
    /// so never more than the join relation's own estimate.
    fn parameterized_join_rows(
        &self,
        outer: &Path,
        inner: &Path,
        jointype: JoinType,
        selectivity: f64,
        joinrel_rows: f64,
    ) -> f64 {
        self.join_rel_size(outer.rows, inner.rows, jointype, selectivity)
            .min(joinrel_rows)
    }

    fn semi_anti_join_factors(
        &self,
        jointype: JoinType,
        outer_rows: f64,
        inner_rows: f64,
        selectivity: f64,
    ) -> SemiAntiJoinFactors;

    /// Cheap lower bound on the cost of a join.
    fn initial_join_cost(
        &self,
        method: JoinMethod<'_>,
        input: &JoinCostInput<'_>,
    ) -> Result<JoinCostWorkspace, PlanError>;

    /// Full cost of a join whose preliminary estimate is `workspace`.
    fn final_join_cost(
        &self,
        method: JoinMethod<'_>,
        input: &JoinCostInput<'_>,
        workspace: &JoinCostWorkspace,
        rows: f64,
        restrict_count: usize,
        enable_material: bool,
    ) -> Result<FinalJoinCost, PlanError>;
}

/// Default cost model with page, tuple and operator cost knobs.
///
/// - **I/O**: `seq_page_cost` per page read in order, `random_page_cost` per page
///   read out of order (index and spill access).
/// - **CPU**: `cpu_tuple_cost` per row handled, `cpu_index_tuple_cost` per index
///   entry, `cpu_operator_cost` per operator or qual evaluation.
/// - **Memory**: `work_mem_bytes` bounds sorts, materializations and hash tables
///   before they spill.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultCostModel {
    pub seq_page_cost: f64,
    pub random_page_cost: f64,
    pub cpu_tuple_cost: f64,
    pub cpu_index_tuple_cost: f64,
    pub cpu_operator_cost: f64,
    pub page_size: f64,
    pub work_mem_bytes: f64,
}

impl Default for DefaultCostModel {
    fn default() -> Self {
        Self {
            seq_page_cost: 1.0,
            random_page_cost: 4.0,
            cpu_tuple_cost: 0.01,
            cpu_index_tuple_cost: 0.005,
            cpu_operator_cost: 0.0025,
            page_size: 8192.0,
            work_mem_bytes: 4.0 * 1024.0 * 1024.0,
        }
    }
}

impl DefaultCostModel {
    fn relation_byte_size(&self, tuples: f64, width: u32) -> f64 {
        tuples * (f64::from(width) + TUPLE_OVERHEAD_BYTES)
    }

    fn page_count(&self, tuples: f64, width: u32) -> f64 {
        (self.relation_byte_size(tuples, width) / self.page_size).ceil()
    }

    fn num_hash_batches(&self, inner_rows: f64, width: u32) -> u32 {
        let bytes = self.relation_byte_size(inner_rows, width);
        if bytes <= self.work_mem_bytes {
            return 1;
        }
        let needed = (bytes / self.work_mem_bytes).ceil();
        // Batch counts are powers of two; cap well below u32::MAX.
        let needed = needed.min(f64::from(1u32 << 30)) as u32;
        needed.next_power_of_two()
    }

    fn is_semi_or_anti(jointype: JoinType) -> bool {
        matches!(jointype, JoinType::Semi | JoinType::Anti)
    }

    /// Rows per hash bucket probed, assuming the default distinct count when
    /// the inner side is large.
    fn hash_bucket_rows(inner_rows: f64) -> f64 {
        let buckets = inner_rows.min(DEFAULT_NUM_DISTINCT).max(1.0);
        (inner_rows / buckets).max(1.0)
    }

    fn check_jointype(jointype: JoinType, context: &'static str) -> Result<(), PlanError> {
        if jointype.is_unique_variant() {
            return Err(PlanError::UnsupportedJoinType { jointype, context });
        }
        Ok(())
    }
}

impl CostModel for DefaultCostModel {
    fn cost_scan(&self, kind: &ScanKind, stats: &Statistics, qual_count: usize) -> (f64, f64) {
        let tuples = stats.row_count.max(0.0);
        let pages = stats.pages(self.page_size);
        let qual_cost = self.cpu_operator_cost * qual_count as f64;
        let cpu_per_tuple = self.cpu_tuple_cost + qual_cost;

        match kind {
            // SeqScan: every page is read in order and every row checked.
            ScanKind::SeqScan => (0.0, self.seq_page_cost * pages + cpu_per_tuple * tuples),
            // SampleScan: a block sample reads about a tenth of the pages at random.
            ScanKind::SampleScan => {
                let sampled = (pages * 0.1).ceil();
                (0.0, self.random_page_cost * sampled + cpu_per_tuple * tuples * 0.1)
            }
            // IndexScan: every index entry is visited and each heap fetch may land on
            // a different page, bounded by the number of pages.
            ScanKind::IndexScan { .. } => {
                let heap_fetches = tuples.min(pages);
                let startup = self.cpu_operator_cost * (tuples.max(1.0).log2() + 1.0);
                let run = self.random_page_cost * heap_fetches
                    + (self.cpu_index_tuple_cost + cpu_per_tuple) * tuples;
                (startup, startup + run)
            }
            // IndexOnlyScan: no heap fetches; the index is a quarter of the heap.
            ScanKind::IndexOnlyScan { .. } => {
                let startup = self.cpu_operator_cost * (tuples.max(1.0).log2() + 1.0);
                let run = self.random_page_cost * (pages * 0.25).ceil()
                    + (self.cpu_index_tuple_cost + cpu_per_tuple) * tuples;
                (startup, startup + run)
            }
            // BitmapHeapScan: the bitmap is built up front, then heap pages are read
            // in physical order.
            ScanKind::BitmapHeapScan => {
                let startup = self.cpu_index_tuple_cost * tuples;
                (startup, startup + self.seq_page_cost * pages * 1.5 + cpu_per_tuple * tuples)
            }
            // TidScan: one random page per row.
            ScanKind::TidScan => {
                let run = self.random_page_cost * tuples.min(pages) + cpu_per_tuple * tuples;
                (0.0, run)
            }
            // Non-table scans produce rows from an expression or an already
            // computed result: CPU only.
            ScanKind::FunctionScan
            | ScanKind::ValuesScan
            | ScanKind::CteScan
            | ScanKind::WorkTableScan
            | ScanKind::SubqueryScan => {
                let startup = if matches!(kind, ScanKind::FunctionScan) {
                    self.cpu_operator_cost * tuples
                } else {
                    0.0
                };
                (startup, startup + cpu_per_tuple * tuples)
            }
        }
    }

    fn cost_sort(&self, input_total: f64, tuples: f64, width: u32) -> (f64, f64) {
        let tuples = tuples.max(2.0);
        let comparison_cost = 2.0 * self.cpu_operator_cost;
        let mut startup = input_total + comparison_cost * tuples * tuples.log2();

        // External sort: write and read every page once per merge pass.
        let bytes = self.relation_byte_size(tuples, width);
        if bytes > self.work_mem_bytes {
            let npages = self.page_count(tuples, width);
            let passes = (bytes / self.work_mem_bytes).log2().ceil().max(1.0);
            startup += 2.0 * npages * passes * (0.75 * self.seq_page_cost + 0.25 * self.random_page_cost);
        }
        let run = self.cpu_operator_cost * tuples;
        (startup, startup + run)
    }

    fn cost_material(&self, subpath: &Path) -> (f64, f64) {
        let mut run = (subpath.total_cost - subpath.startup_cost) + 2.0 * self.cpu_operator_cost * subpath.rows;
        if self.relation_byte_size(subpath.rows, subpath.width) > self.work_mem_bytes {
            run += self.seq_page_cost * self.page_count(subpath.rows, subpath.width);
        }
        (subpath.startup_cost, subpath.startup_cost + run)
    }

    fn cost_rescan(&self, path: &Path) -> (f64, f64) {
        match &path.kind {
            // A single-batch hash join keeps its hash table; only the probe reruns.
            PathKind::HashJoin(h) if h.num_batches <= 1 => (0.0, path.total_cost - path.startup_cost),
            // Buffered results are reread from memory, or from the spill file.
            PathKind::Material { .. } | PathKind::Scan(ScanKind::CteScan) | PathKind::Scan(ScanKind::WorkTableScan) => {
                let mut run = self.cpu_operator_cost * path.rows;
                if self.relation_byte_size(path.rows, path.width) > self.work_mem_bytes {
                    run += self.seq_page_cost * self.page_count(path.rows, path.width);
                }
                (0.0, run)
            }
            _ => (path.startup_cost, path.total_cost),
        }
    }

    fn cost_unique(&self, subpath: &Path, method: UniqueMethod, num_cols: usize, output_rows: f64) -> (f64, f64) {
        let compare_cost = self.cpu_operator_cost * num_cols.max(1) as f64 * subpath.rows;
        match method {
            // Hash: the whole input is consumed before the first group comes out.
            UniqueMethod::Hash => {
                let startup = subpath.total_cost + compare_cost;
                (startup, startup + self.cpu_tuple_cost * output_rows)
            }
            // Sort: sort, then drop adjacent duplicates while streaming.
            UniqueMethod::Sort => {
                let (startup, total) = self.cost_sort(subpath.total_cost, subpath.rows, subpath.width);
                (startup, total + compare_cost)
            }
        }
    }

    fn cost_append(&self, subpaths: &[Arc<Path>]) -> (f64, f64) {
        let startup = subpaths.first().map_or(0.0, |p| p.startup_cost);
        let total = subpaths.iter().map(|p| p.total_cost).sum();
        (startup, total)
    }

    fn join_rel_size(&self, outer_rows: f64, inner_rows: f64, jointype: JoinType, selectivity: f64) -> f64 {
        let cross = outer_rows * inner_rows * selectivity;
        let rows = match jointype {
            JoinType::Inner | JoinType::UniqueOuter | JoinType::UniqueInner => cross,
            JoinType::Left => cross.max(outer_rows),
            JoinType::Right => cross.max(inner_rows),
            JoinType::Full => cross.max(outer_rows).max(inner_rows),
            JoinType::Semi => outer_rows * (selectivity * inner_rows).min(1.0),
            JoinType::Anti => outer_rows * (1.0 - (selectivity * inner_rows).min(1.0)),
        };
        clamp_row_est(rows)
    }

    fn semi_anti_join_factors(
        &self,
        _jointype: JoinType,
        _outer_rows: f64,
        inner_rows: f64,
        selectivity: f64,
    ) -> SemiAntiJoinFactors {
        let expected_matches = selectivity * inner_rows;
        let outer_match_frac = expected_matches.min(1.0);
        let match_count = if outer_match_frac > 0.0 {
            (expected_matches / outer_match_frac).max(1.0)
        } else {
            1.0
        };
        SemiAntiJoinFactors {
            outer_match_frac,
            match_count,
        }
    }

    fn initial_join_cost(
        &self,
        method: JoinMethod<'_>,
        input: &JoinCostInput<'_>,
    ) -> Result<JoinCostWorkspace, PlanError> {
        Self::check_jointype(input.jointype, "initial_join_cost")?;
        let outer = input.outer;
        let inner = input.inner;
        let mut ws = JoinCostWorkspace {
            num_batches: 1,
            ..JoinCostWorkspace::default()
        };

        match method {
            // NestLoop: the inner side runs once in full and is rescanned for every
            // further outer row. For semi/anti joins the inner run cost depends on
            // how soon a match is found, so it is left to the final phase.
            JoinMethod::NestLoop => {
                let outer_rows = outer.rows;
                let (rescan_startup, rescan_total) = self.cost_rescan(inner);
                ws.startup_cost = outer.startup_cost + inner.startup_cost;
                ws.run_cost = outer.total_cost - outer.startup_cost;
                if outer_rows > 1.0 {
                    ws.run_cost += (outer_rows - 1.0) * rescan_startup;
                }
                ws.inner_run_cost = inner.total_cost - inner.startup_cost;
                ws.inner_rescan_run_cost = rescan_total - rescan_startup;
                if !Self::is_semi_or_anti(input.jointype) {
                    ws.run_cost += ws.inner_run_cost;
                    if outer_rows > 1.0 {
                        ws.run_cost += (outer_rows - 1.0) * ws.inner_rescan_run_cost;
                    }
                }
            }
            // MergeJoin: both inputs are read once, each behind a sort when it is
            // not already ordered. An input that needs no sort costs nothing extra.
            JoinMethod::MergeJoin {
                outersortkeys,
                innersortkeys,
                ..
            } => {
                if outersortkeys.is_empty() {
                    ws.startup_cost += outer.startup_cost;
                    ws.run_cost += outer.total_cost - outer.startup_cost;
                } else {
                    let (s, t) = self.cost_sort(outer.total_cost, outer.rows, outer.width);
                    ws.outer_sort_cost = t - outer.total_cost;
                    ws.startup_cost += s;
                    ws.run_cost += t - s;
                }
                if innersortkeys.is_empty() {
                    ws.startup_cost += inner.startup_cost;
                    ws.inner_run_cost = inner.total_cost - inner.startup_cost;
                } else {
                    let (s, t) = self.cost_sort(inner.total_cost, inner.rows, inner.width);
                    ws.inner_sort_cost = t - inner.total_cost;
                    ws.startup_cost += s;
                    ws.inner_run_cost = t - s;
                }
                ws.run_cost += ws.inner_run_cost;
            }
            // HashJoin: the inner side is consumed and hashed before the first
            // output row; the outer side is streamed through the probe. When the
            // table does not fit in memory both sides are written out in batches.
            JoinMethod::HashJoin { hashclauses } => {
                let nclauses = hashclauses.len() as f64;
                ws.startup_cost = outer.startup_cost
                    + inner.total_cost
                    + (self.cpu_operator_cost * nclauses + self.cpu_tuple_cost) * inner.rows;
                ws.run_cost = outer.total_cost - outer.startup_cost
                    + self.cpu_operator_cost * nclauses * outer.rows;
                ws.num_batches = self.num_hash_batches(inner.rows, inner.width);
                if ws.num_batches > 1 {
                    let innerpages = self.page_count(inner.rows, inner.width);
                    let outerpages = self.page_count(outer.rows, outer.width);
                    ws.startup_cost += self.seq_page_cost * innerpages;
                    ws.run_cost += self.seq_page_cost * (innerpages + 2.0 * outerpages);
                }
            }
        }

        ws.total_cost = ws.startup_cost + ws.run_cost;
        Ok(ws)
    }

    fn final_join_cost(
        &self,
        method: JoinMethod<'_>,
        input: &JoinCostInput<'_>,
        workspace: &JoinCostWorkspace,
        rows: f64,
        restrict_count: usize,
        enable_material: bool,
    ) -> Result<FinalJoinCost, PlanError> {
        Self::check_jointype(input.jointype, "final_join_cost")?;
        let outer_rows = input.outer.rows;
        let inner_rows = input.inner.rows.max(1.0);
        let semi = Self::is_semi_or_anti(input.jointype);
        let factors = input.semifactors;
        let startup_cost = workspace.startup_cost;
        let mut run_cost = workspace.run_cost;
        let mut materialize_inner = false;

        match method {
            JoinMethod::NestLoop => {
                let ntuples = if semi {
                    // A matched outer row stops scanning the inner side early; an
                    // unmatched one scans all of it.
                    let outer_matched_rows = (outer_rows * factors.outer_match_frac).round();
                    let inner_scan_frac = 2.0 / (factors.match_count + 1.0);
                    run_cost += workspace.inner_run_cost * inner_scan_frac;
                    if outer_matched_rows > 1.0 {
                        run_cost += (outer_matched_rows - 1.0) * workspace.inner_rescan_run_cost * inner_scan_frac;
                    }
                    run_cost += (outer_rows - outer_matched_rows) * workspace.inner_rescan_run_cost;
                    outer_matched_rows * inner_rows * inner_scan_frac
                        + (outer_rows - outer_matched_rows) * inner_rows
                } else {
                    outer_rows * inner_rows
                };
                let cpu_per_tuple = self.cpu_tuple_cost + self.cpu_operator_cost * restrict_count as f64;
                run_cost += cpu_per_tuple * ntuples;
            }
            JoinMethod::MergeJoin {
                mergeclauses,
                innersortkeys,
                ..
            } => {
                // Inner rows with duplicate keys are re-read once per matching
                // outer row.
                let rescanned = (rows - inner_rows).max(0.0);
                let rescan_ratio = 1.0 + rescanned / inner_rows;
                let bare_inner_cost = workspace.inner_run_cost * rescan_ratio;
                let mat_inner_cost = workspace.inner_run_cost
                    + self.cpu_operator_cost * inner_rows * rescan_ratio;

                materialize_inner = if enable_material && mat_inner_cost < bare_inner_cost {
                    true
                } else if innersortkeys.is_empty() && !input.inner.supports_mark_restore() {
                    // The merge must be able to back up over the inner input.
                    true
                } else {
                    enable_material
                        && !innersortkeys.is_empty()
                        && self.relation_byte_size(inner_rows, input.inner.width) > self.work_mem_bytes
                };

                // The workspace already holds one full inner run.
                run_cost -= workspace.inner_run_cost;
                run_cost += if materialize_inner { mat_inner_cost } else { bare_inner_cost };

                let nclauses = mergeclauses.len();
                let merge_qual_cost = self.cpu_operator_cost * nclauses as f64;
                run_cost += merge_qual_cost * (outer_rows + inner_rows * rescan_ratio);
                let cpu_per_tuple = self.cpu_tuple_cost
                    + self.cpu_operator_cost * restrict_count.saturating_sub(nclauses) as f64;
                run_cost += cpu_per_tuple * rows;
            }
            JoinMethod::HashJoin { hashclauses } => {
                let nclauses = hashclauses.len();
                let hash_qual_cost = self.cpu_operator_cost * nclauses as f64;
                let bucket_rows = Self::hash_bucket_rows(inner_rows);
                let hashjointuples = if semi {
                    let outer_matched_rows = (outer_rows * factors.outer_match_frac).round();
                    let inner_scan_frac = 2.0 / (factors.match_count + 1.0);
                    run_cost += hash_qual_cost * outer_matched_rows * (bucket_rows * inner_scan_frac).max(1.0) * 0.5;
                    // Unmatched rows mostly land in empty or non-matching buckets.
                    run_cost += hash_qual_cost * (outer_rows - outer_matched_rows) * bucket_rows * 0.05;
                    outer_matched_rows
                } else {
                    run_cost += hash_qual_cost * outer_rows * bucket_rows * 0.5;
                    rows
                };
                let cpu_per_tuple = self.cpu_tuple_cost
                    + self.cpu_operator_cost * restrict_count.saturating_sub(nclauses) as f64;
                run_cost += cpu_per_tuple * hashjointuples;
            }
        }

        Ok(FinalJoinCost {
            startup_cost,
            total_cost: startup_cost + run_cost,
            materialize_inner,
        })
    }
}
