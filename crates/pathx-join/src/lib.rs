//! # pathx-join
//!
//! Join path enumeration. Given a join relation and an ordered pair of input
//! relations whose own candidate paths are already known, propose every nested
//! loop, merge join and hash join path worth keeping and offer each to the join
//! relation through `add_path`.
//!
//! ## Module layout
//!
//! - `planner`: `JoinPlanner` with the entry points `add_paths_to_joinrel` and
//!   `make_join_rel`.
//! - `extra`: per-call context (merge clauses, parameterization sources).
//! - `clauses`: which restriction clauses can drive a merge or hash join.
//! - `param`: parameterization checks for candidate paths.
//! - `admit`: the shared resolve / precheck / build / add_path sequence.
//! - `sort_merge`, `unsorted_outer`, `hash`: the strategy generators.
//! - `pushdown`: planning the join once per child of an append outer input.
//! - `hook`: extension hooks run after the built-in generators.
//! - `config`: strategy switches.

mod admit;
pub mod clauses;
pub mod config;
pub mod extra;
mod hash;
pub mod hook;
pub mod param;
pub mod planner;
mod pushdown;
mod sort_merge;
mod unsorted_outer;

pub use config::{ConfigError, JoinSearchConfig};
pub use hook::{HookCall, JoinPathHook};
pub use planner::{JoinPathStats, JoinPlanner, PushdownOutcome};
