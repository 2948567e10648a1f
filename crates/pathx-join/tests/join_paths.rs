//! Join path enumeration over a two-table query.
//!
//! R has 1000 rows with 100 distinct values of `k`, S has 10 rows with 10
//! distinct values. Each starts with a single sequential scan; some tests add an
//! index scan ordered on `k`. The join clause is `R.k = S.k` unless a test says
//! otherwise.
//!
//! ## What These Tests Verify
//! - Which strategies are tried for one input order, and how often
//! - The cheapest candidate survives and no survivor dominates another
//! - Sorted merge paths are kept when the query wants that order
//! - FULL joins: clauseless merges, and no plan without a mergeable clause
//! - Strategy switches, semi join unique-ification and extension hooks

use pathx_core::admission::{comparable_pathkeys, STD_FUZZ_FACTOR};
use pathx_core::catalog::{Catalog, InMemoryCatalog};
use pathx_core::context::{PlannerContext, SpecialJoinInfo};
use pathx_core::cost::DefaultCostModel;
use pathx_core::equivalence::EcId;
use pathx_core::error::PlanError;
use pathx_core::expr::{BinaryOp, Expr, JoinType, ScalarValue};
use pathx_core::path::{Path, PathKind, PathTag, ScanKind};
use pathx_core::pathkeys::{compare_pathkeys, PathKey, PathKeysComparison};
use pathx_core::pathnode::create_scan_path;
use pathx_core::relation::Relation;
use pathx_core::relids::RelId;
use pathx_core::restrictinfo::RestrictInfo;
use pathx_core::stats::{ColumnStatistics, Statistics};
use pathx_join::{HookCall, JoinPathHook, JoinPathStats, JoinPlanner, JoinSearchConfig, PushdownOutcome};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const R: RelId = RelId(1);
const S: RelId = RelId(2);
const WIDTH: u32 = 16;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn r_k() -> Expr {
    Expr::column(R, "k", 0)
}

fn s_k() -> Expr {
    Expr::column(S, "k", 0)
}

/// Table statistics with `rows` rows of 40 bytes and `ndv` distinct keys.
fn table_stats(rows: f64, ndv: f64) -> Statistics {
    Statistics::new(rows, rows * 40.0).with_column("k", ColumnStatistics::new(ndv, 0.0))
}

struct Query {
    ctx: PlannerContext,
    catalog: InMemoryCatalog,
    k: EcId,
}

impl Query {
    fn new() -> Self {
        let mut catalog = InMemoryCatalog::new();
        catalog.add_table(R, table_stats(1000.0, 100.0));
        catalog.add_table(S, table_stats(10.0, 10.0));
        let mut ctx = PlannerContext::new();
        let k = ctx.eclasses.add_class(vec![r_k(), s_k()], false);
        Self { ctx, catalog, k }
    }

    fn clause(&self, expr: Expr) -> Arc<RestrictInfo> {
        Arc::new(RestrictInfo::new(expr, false, &self.ctx.eclasses))
    }

    fn join_on_k(&self) -> Vec<Arc<RestrictInfo>> {
        vec![self.clause(Expr::eq(r_k(), s_k()))]
    }

    /// A base relation with a sequential scan, plus an index scan ordered on
    /// `k` when `indexed`.
    fn base_rel(&self, id: RelId, indexed: bool) -> Relation {
        let model = DefaultCostModel::default();
        let stats = self.catalog.relation_stats(id).expect("table registered");
        let mut rel = Relation::base(id, stats.row_count, WIDTH);
        let seq = create_scan_path(&model, &rel, ScanKind::SeqScan, &stats, Vec::new(), None);
        rel.add_path(Arc::new(seq));
        if indexed {
            let index = ScanKind::IndexScan {
                index: format!("idx_{}_k", id.0),
            };
            let ordered = create_scan_path(&model, &rel, index, &stats, vec![PathKey::asc(self.k)], None);
            rel.add_path(Arc::new(ordered));
        }
        rel.set_cheapest().expect("base relation has paths");
        rel
    }

    fn planner(&self, config: JoinSearchConfig) -> JoinPlanner {
        JoinPlanner::new(
            Arc::new(DefaultCostModel::default()),
            Arc::new(self.catalog.clone()),
            config,
        )
    }
}

/// Run one `add_paths_to_joinrel` call with `outer` as the outer input.
fn plan_one_order(
    q: &Query,
    planner: &JoinPlanner,
    outer: &Relation,
    inner: &Relation,
    jointype: JoinType,
    sjinfo: &SpecialJoinInfo,
    restrictlist: &[Arc<RestrictInfo>],
) -> (Relation, JoinPathStats) {
    let mut joinrel = planner.build_join_rel(outer, inner, sjinfo, restrictlist);
    let stats = planner
        .add_paths_to_joinrel(&q.ctx, &mut joinrel, outer, inner, jointype, sjinfo, restrictlist)
        .expect("enumeration succeeds");
    (joinrel, stats)
}

fn dominates(a: &Path, b: &Path) -> bool {
    a.total_cost <= b.total_cost
        && a.startup_cost <= b.startup_cost
        && matches!(
            compare_pathkeys(comparable_pathkeys(a), comparable_pathkeys(b)),
            PathKeysComparison::Equal | PathKeysComparison::Better1
        )
        && a.required_outer().is_subset_of(b.required_outer())
        && a.rows <= b.rows
}

fn assert_undominated(rel: &Relation) {
    for (i, a) in rel.pathlist.iter().enumerate() {
        for (j, b) in rel.pathlist.iter().enumerate() {
            if i != j {
                assert!(!dominates(a, b), "{} dominates {}", a, b);
            }
        }
    }
}

fn has_tag(rel: &Relation, tag: PathTag) -> bool {
    rel.pathlist.iter().any(|p| p.tag() == tag)
}

// ---------------------------------------------------------------------------
// Inner joins
// ---------------------------------------------------------------------------

#[test]
fn test_inner_join_strategy_counts() {
    init_tracing();
    let q = Query::new();
    let planner = q.planner(JoinSearchConfig::default());
    let (r, s) = (q.base_rel(R, false), q.base_rel(S, false));
    let sjinfo = SpecialJoinInfo::inner(r.relids.clone(), s.relids.clone());

    let (joinrel, stats) = plan_one_order(&q, &planner, &r, &s, JoinType::Inner, &sjinfo, &q.join_on_k());

    // S as is, and S materialized.
    assert_eq!(stats.nestloop_considered, 2);
    // Both sides sorted on k; R's scan has no order to merge on by itself.
    assert_eq!(stats.mergejoin_considered, 1);
    assert_eq!(stats.hashjoin_considered, 1);
    assert!(stats.mergejoin_allowed);
    assert_eq!(stats.rejected_by_parameterization, 0);
    // R has no append path to push the join under.
    assert_eq!(stats.pushdown, PushdownOutcome::Skipped);
    assert!(stats.admitted >= 1);
    assert!(stats.submitted >= stats.admitted);
    assert!(!joinrel.pathlist.is_empty());

    // Swapped: R as is and R materialized on the inner side.
    let (_, swapped) = plan_one_order(&q, &planner, &s, &r, JoinType::Inner, &sjinfo, &q.join_on_k());
    assert_eq!(swapped.nestloop_considered, 2);
    assert_eq!(swapped.mergejoin_considered, 1);
    assert_eq!(swapped.hashjoin_considered, 1);
}

#[test]
fn test_cheapest_candidate_survives() {
    init_tracing();
    let q = Query::new();
    let planner = q.planner(JoinSearchConfig::default());
    let (r, s) = (q.base_rel(R, false), q.base_rel(S, false));
    let sjinfo = SpecialJoinInfo::inner(r.relids.clone(), s.relids.clone());

    let (mut joinrel, stats) = plan_one_order(&q, &planner, &r, &s, JoinType::Inner, &sjinfo, &q.join_on_k());
    joinrel.set_cheapest().unwrap();

    let best_submitted = stats.cheapest_submitted_total.expect("unparameterized paths submitted");
    let cheapest = joinrel.cheapest_total().unwrap();
    assert!(cheapest.total_cost <= best_submitted * STD_FUZZ_FACTOR);
    assert_undominated(&joinrel);
    for w in joinrel.pathlist.windows(2) {
        assert!(w[0].total_cost <= w[1].total_cost);
    }
    // The small relation is the one worth hashing.
    assert!(has_tag(&joinrel, PathTag::HashJoin));
}

#[test]
fn test_both_orders_share_one_join_relation() {
    init_tracing();
    let q = Query::new();
    let planner = q.planner(JoinSearchConfig::default());
    let (r, s) = (q.base_rel(R, false), q.base_rel(S, false));
    let sjinfo = SpecialJoinInfo::inner(r.relids.clone(), s.relids.clone());

    let joinrel = planner.make_join_rel(&q.ctx, &r, &s, &sjinfo, &q.join_on_k()).unwrap();

    assert_eq!(joinrel.relids, r.relids.union(&s.relids));
    // 1000 * 10 / max(100, 10)
    assert_eq!(joinrel.rows, 100.0);
    assert!(joinrel.cheapest_total_path.is_some());
    assert!(joinrel.cheapest_startup_path.is_some());
    assert_undominated(&joinrel);
}

#[test]
fn test_sorted_merge_kept_for_query_order() {
    init_tracing();
    let mut q = Query::new();
    q.ctx.query_pathkeys = vec![PathKey::asc(q.k)];
    let planner = q.planner(JoinSearchConfig::default());
    let (r, s) = (q.base_rel(R, false), q.base_rel(S, false));
    let sjinfo = SpecialJoinInfo::inner(r.relids.clone(), s.relids.clone());

    let joinrel = planner.make_join_rel(&q.ctx, &r, &s, &sjinfo, &q.join_on_k()).unwrap();

    let sorted_merge = joinrel.pathlist.iter().find_map(|p| match &p.kind {
        PathKind::MergeJoin(m) => Some((p, m)),
        _ => None,
    });
    let (path, merge) = sorted_merge.expect("a merge join survives");
    assert!(!merge.outersortkeys.is_empty());
    assert!(!merge.innersortkeys.is_empty());
    assert!(merge.outer_sort_cost > 0.0);
    assert_eq!(merge.mergeclauses.len(), 1);
    assert_eq!(path.pathkeys, vec![PathKey::asc(q.k)]);
}

#[test]
fn test_presorted_inputs_skip_explicit_sorts() {
    init_tracing();
    let mut q = Query::new();
    q.ctx.query_pathkeys = vec![PathKey::asc(q.k)];
    let planner = q.planner(JoinSearchConfig::default());
    let (r, s) = (q.base_rel(R, true), q.base_rel(S, true));
    let sjinfo = SpecialJoinInfo::inner(r.relids.clone(), s.relids.clone());

    let (joinrel, stats) = plan_one_order(&q, &planner, &r, &s, JoinType::Inner, &sjinfo, &q.join_on_k());

    // The explicit sort, plus the merges over R's index order.
    assert!(stats.mergejoin_considered >= 2);
    let unsorted_outer = joinrel.pathlist.iter().any(|p| {
        matches!(&p.kind, PathKind::MergeJoin(m) if m.outersortkeys.is_empty() && m.outer_sort_cost == 0.0)
    });
    assert!(unsorted_outer, "no merge join reuses R's index order");
    assert_undominated(&joinrel);
}

#[test]
fn test_stats_serialize() {
    let q = Query::new();
    let planner = q.planner(JoinSearchConfig::default());
    let (r, s) = (q.base_rel(R, false), q.base_rel(S, false));
    let sjinfo = SpecialJoinInfo::inner(r.relids.clone(), s.relids.clone());

    let (_, stats) = plan_one_order(&q, &planner, &r, &s, JoinType::Inner, &sjinfo, &q.join_on_k());
    let json = serde_json::to_value(&stats).unwrap();

    assert_eq!(json["nestloop_considered"], 2);
    assert_eq!(json["hashjoin_considered"], 1);
    assert_eq!(json["mergejoin_allowed"], true);
    assert_eq!(json["pushdown"], "Skipped");
}

// ---------------------------------------------------------------------------
// Outer joins
// ---------------------------------------------------------------------------

#[test]
fn test_left_join_never_nests_a_right_join() {
    init_tracing();
    let q = Query::new();
    let planner = q.planner(JoinSearchConfig::default());
    let (r, s) = (q.base_rel(R, false), q.base_rel(S, false));
    let sjinfo = SpecialJoinInfo::outer(JoinType::Left, r.relids.clone(), s.relids.clone());
    let restrictlist = q.join_on_k();

    let (_, right) = plan_one_order(&q, &planner, &s, &r, JoinType::Right, &sjinfo, &restrictlist);
    assert_eq!(right.nestloop_considered, 0);
    assert_eq!(right.pushdown, PushdownOutcome::NotAttempted);

    let joinrel = planner.make_join_rel(&q.ctx, &r, &s, &sjinfo, &restrictlist).unwrap();
    let nested_right = joinrel
        .pathlist
        .iter()
        .any(|p| matches!(&p.kind, PathKind::NestLoop(j) if j.jointype == JoinType::Right));
    assert!(!nested_right);
}

#[test]
fn test_full_join_on_true_merges_without_keys() {
    init_tracing();
    let q = Query::new();
    let planner = q.planner(JoinSearchConfig::default());
    let (r, s) = (q.base_rel(R, false), q.base_rel(S, false));
    let sjinfo = SpecialJoinInfo::outer(JoinType::Full, r.relids.clone(), s.relids.clone());
    let restrictlist = vec![q.clause(Expr::Literal(ScalarValue::Bool(true)))];

    let (joinrel, stats) = plan_one_order(&q, &planner, &r, &s, JoinType::Full, &sjinfo, &restrictlist);

    assert!(stats.mergejoin_allowed);
    assert_eq!(stats.nestloop_considered, 0);
    assert_eq!(stats.hashjoin_considered, 0);
    let clauseless = joinrel
        .pathlist
        .iter()
        .any(|p| matches!(&p.kind, PathKind::MergeJoin(m) if m.mergeclauses.is_empty()));
    assert!(clauseless);
    assert!(!has_tag(&joinrel, PathTag::NestLoop));
    assert!(!has_tag(&joinrel, PathTag::HashJoin));
}

#[test]
fn test_full_join_without_mergeable_clause_has_no_plan() {
    init_tracing();
    let q = Query::new();
    let planner = q.planner(JoinSearchConfig::default());
    let (r, s) = (q.base_rel(R, false), q.base_rel(S, false));
    let sjinfo = SpecialJoinInfo::outer(JoinType::Full, r.relids.clone(), s.relids.clone());
    let restrictlist = vec![q.clause(Expr::binary(BinaryOp::Lt, r_k(), s_k()))];

    let (joinrel, stats) = plan_one_order(&q, &planner, &r, &s, JoinType::Full, &sjinfo, &restrictlist);
    assert!(!stats.mergejoin_allowed);
    assert!(joinrel.pathlist.is_empty());

    let result = planner.make_join_rel(&q.ctx, &r, &s, &sjinfo, &restrictlist);
    assert!(matches!(result, Err(PlanError::NoPlanFound(_))));
}

#[test]
fn test_full_join_ignores_strategy_switches() {
    init_tracing();
    let q = Query::new();
    let config = JoinSearchConfig {
        enable_mergejoin: false,
        enable_hashjoin: false,
        ..JoinSearchConfig::default()
    };
    let planner = q.planner(config);
    let (r, s) = (q.base_rel(R, false), q.base_rel(S, false));
    let sjinfo = SpecialJoinInfo::outer(JoinType::Full, r.relids.clone(), s.relids.clone());

    let (joinrel, stats) = plan_one_order(&q, &planner, &r, &s, JoinType::Full, &sjinfo, &q.join_on_k());

    assert!(stats.mergejoin_considered > 0);
    assert!(stats.hashjoin_considered > 0);
    assert!(!joinrel.pathlist.is_empty());
}

// ---------------------------------------------------------------------------
// Strategy switches
// ---------------------------------------------------------------------------

#[test]
fn test_disabled_hash_join() {
    let q = Query::new();
    let config = JoinSearchConfig {
        enable_hashjoin: false,
        ..JoinSearchConfig::default()
    };
    let planner = q.planner(config);
    let (r, s) = (q.base_rel(R, false), q.base_rel(S, false));
    let sjinfo = SpecialJoinInfo::inner(r.relids.clone(), s.relids.clone());

    let (joinrel, stats) = plan_one_order(&q, &planner, &r, &s, JoinType::Inner, &sjinfo, &q.join_on_k());

    assert_eq!(stats.hashjoin_considered, 0);
    assert!(!has_tag(&joinrel, PathTag::HashJoin));
    assert!(!joinrel.pathlist.is_empty());
}

#[test]
fn test_disabled_merge_join() {
    let q = Query::new();
    let config = JoinSearchConfig {
        enable_mergejoin: false,
        ..JoinSearchConfig::default()
    };
    let planner = q.planner(config);
    let (r, s) = (q.base_rel(R, false), q.base_rel(S, false));
    let sjinfo = SpecialJoinInfo::inner(r.relids.clone(), s.relids.clone());

    let (joinrel, stats) = plan_one_order(&q, &planner, &r, &s, JoinType::Inner, &sjinfo, &q.join_on_k());

    assert_eq!(stats.mergejoin_considered, 0);
    // Nested loops still run without merge clauses.
    assert_eq!(stats.nestloop_considered, 2);
    assert!(!has_tag(&joinrel, PathTag::MergeJoin));
}

#[test]
fn test_disabled_material() {
    let q = Query::new();
    let config = JoinSearchConfig {
        enable_material: false,
        ..JoinSearchConfig::default()
    };
    let planner = q.planner(config);
    let (r, s) = (q.base_rel(R, false), q.base_rel(S, false));
    let sjinfo = SpecialJoinInfo::inner(r.relids.clone(), s.relids.clone());

    let (joinrel, stats) = plan_one_order(&q, &planner, &r, &s, JoinType::Inner, &sjinfo, &q.join_on_k());

    assert_eq!(stats.nestloop_considered, 1);
    let materialized_inner = joinrel.pathlist.iter().any(|p| {
        matches!(&p.kind, PathKind::NestLoop(j) if j.inner.tag() == PathTag::Material)
    });
    assert!(!materialized_inner);
}

// ---------------------------------------------------------------------------
// Semi joins
// ---------------------------------------------------------------------------

#[test]
fn test_unique_inner_joins_see_only_unique_inputs() {
    init_tracing();
    let q = Query::new();
    let planner = q.planner(JoinSearchConfig::default());
    let (r, s) = (q.base_rel(R, false), q.base_rel(S, false));
    let sjinfo = SpecialJoinInfo::semi(r.relids.clone(), s.relids.clone(), vec![s_k()]);

    let (joinrel, stats) = plan_one_order(&q, &planner, &r, &s, JoinType::UniqueInner, &sjinfo, &q.join_on_k());

    // No materialized copy: the unique-ified inner path is the only inner.
    assert_eq!(stats.nestloop_considered, 1);
    assert!(!joinrel.pathlist.is_empty());
    for path in &joinrel.pathlist {
        let join = path.join().expect("join path");
        assert_eq!(join.jointype, JoinType::Inner);
        assert_eq!(join.inner.tag(), PathTag::Unique, "inner of {}", path);
    }
}

#[test]
fn test_semi_join_plans_all_orders() {
    init_tracing();
    let q = Query::new();
    let planner = q.planner(JoinSearchConfig::default());
    let (r, s) = (q.base_rel(R, false), q.base_rel(S, false));
    let sjinfo = SpecialJoinInfo::semi(r.relids.clone(), s.relids.clone(), vec![s_k()]);

    let (_, semi) = plan_one_order(&q, &planner, &r, &s, JoinType::Semi, &sjinfo, &q.join_on_k());
    assert!(semi.submitted > 0);
    let (_, unique_outer) = plan_one_order(&q, &planner, &s, &r, JoinType::UniqueOuter, &sjinfo, &q.join_on_k());
    assert!(unique_outer.submitted > 0);
    assert_eq!(unique_outer.pushdown, PushdownOutcome::NotAttempted);

    let joinrel = planner.make_join_rel(&q.ctx, &r, &s, &sjinfo, &q.join_on_k()).unwrap();
    assert!(joinrel.cheapest_total_path.is_some());
    assert_undominated(&joinrel);
}

#[test]
fn test_unique_variant_rejected_as_join_type() {
    let q = Query::new();
    let planner = q.planner(JoinSearchConfig::default());
    let (r, s) = (q.base_rel(R, false), q.base_rel(S, false));
    let mut sjinfo = SpecialJoinInfo::inner(r.relids.clone(), s.relids.clone());
    sjinfo.jointype = JoinType::UniqueInner;

    let result = planner.make_join_rel(&q.ctx, &r, &s, &sjinfo, &q.join_on_k());
    assert!(matches!(result, Err(PlanError::UnsupportedJoinType { .. })));
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Offers a join that costs nearly nothing, built from the cheapest inputs.
struct FreeJoin;

impl JoinPathHook for FreeJoin {
    fn name(&self) -> &str {
        "free_join"
    }

    fn add_paths(&self, call: &mut HookCall<'_>) -> Result<(), PlanError> {
        assert!(call.extra().mergejoin_allowed);
        let joinrel = call.joinrel();
        let path = Path {
            kind: PathKind::Custom {
                name: self.name().to_string(),
                children: vec![
                    call.outerrel().cheapest_total()?.clone(),
                    call.innerrel().cheapest_total()?.clone(),
                ],
            },
            parent: joinrel.relids.clone(),
            param_info: None,
            rows: joinrel.rows,
            width: joinrel.width,
            startup_cost: 0.0,
            total_cost: 0.01,
            pathkeys: Vec::new(),
        };
        call.add_path(path);
        Ok(())
    }
}

#[test]
fn test_hook_path_goes_through_admission() {
    init_tracing();
    let q = Query::new();
    let planner = q.planner(JoinSearchConfig::default()).with_hook(Box::new(FreeJoin));
    let (r, s) = (q.base_rel(R, false), q.base_rel(S, false));
    let sjinfo = SpecialJoinInfo::inner(r.relids.clone(), s.relids.clone());

    let (joinrel, stats) = plan_one_order(&q, &planner, &r, &s, JoinType::Inner, &sjinfo, &q.join_on_k());

    assert_eq!(stats.hook_paths_admitted, 1);
    assert_eq!(joinrel.pathlist[0].tag(), PathTag::Custom);
    // Hook paths are not counted as enumerated candidates.
    assert!(stats.cheapest_submitted_total.is_some_and(|best| best > 0.01));
    assert_undominated(&joinrel);
}
