//! Planning errors.
//!
//! Rejecting a candidate path is routine and never produces an error. The variants
//! here are either a relation ending up with no paths at all (`NoPlanFound`) or a
//! broken contract between planner components, which aborts planning of the
//! current statement.

use crate::expr::JoinType;
use crate::relids::{RelId, RelIds};

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("no plan found for relation {0}")]
    NoPlanFound(RelIds),
    #[error("relation {0} has no cheapest path")]
    MissingCheapestPath(RelIds),
    #[error("unrecognized join type {jointype} in {context}")]
    UnsupportedJoinType {
        jointype: JoinType,
        context: &'static str,
    },
    #[error("mergeclause ordering used {used} of {available} mergeclauses")]
    MergeClausesNotConsumed { used: usize, available: usize },
    #[error("too few pathkeys for mergeclauses")]
    TooFewPathKeys,
    #[error("outer pathkeys do not match mergeclauses")]
    PathKeyMismatch,
    #[error("could not unique-ify relation {0}")]
    UniquifyFailed(RelIds),
    #[error("unknown base relation {0}")]
    UnknownRelation(RelId),
}
