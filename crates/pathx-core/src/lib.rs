//! # pathx-core: Join Path Primitives
//!
//! This crate implements the data structures the join path enumerator works on:
//! relations and their candidate paths, sort orders, restriction clauses, and the
//! collaborators that cost and size them.
//!
//! ## Module Overview
//!
//! - **`relids`**: Sets of base-relation identifiers, the currency of every
//!   "which side does this belong to" decision.
//! - **`expr`**: Scalar expressions and join types.
//! - **`equivalence`**: Equivalence classes of expressions known to be equal.
//! - **`pathkeys`**: Sort orders and the merge-key derivation helpers.
//! - **`restrictinfo`**: Restriction clauses annotated for merge/hash use, and
//!   their per-call orientation.
//! - **`path`**: Candidate physical paths and their parameterization.
//! - **`relation`**: Relations owning path lists and their cheapest paths.
//! - **`admission`**: `add_path`, its precheck, and cost comparison.
//! - **`pathnode`**: Path constructors (scan, material, unique, joins, append).
//! - **`cost`**: Cost model trait and a default page/tuple/operator model.
//! - **`stats`**: Statistics structures and selectivity formulas.
//! - **`catalog`**: Catalog trait for statistics and CHECK constraints.
//! - **`context`**: Planning-session state read by the enumerator.
//! - **`error`**: Planning errors.

pub mod admission;
pub mod catalog;
pub mod context;
pub mod cost;
pub mod equivalence;
pub mod error;
pub mod expr;
pub mod path;
pub mod pathkeys;
pub mod pathnode;
pub mod relation;
pub mod relids;
pub mod restrictinfo;
pub mod stats;
