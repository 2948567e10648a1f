//! # Equivalence Classes
//!
//! An equivalence class groups expressions known to be equal after the query's
//! equality clauses are applied (`R.k = S.k` puts `R.k` and `S.k` in one class).
//! Sort orders are described in terms of classes rather than expressions, so that an
//! ordering on `R.k` also satisfies a requirement for `S.k`.
//!
//! ## Redundancy
//!
//! A class containing a constant (`k = 42`) and not sitting below an outer join is
//! *redundant*: every row has the same value, so the class can never appear in a
//! canonical sort order. Merge clauses whose classes are redundant are rejected.
//!
//! ## Child Members
//!
//! When a parent relation is expanded into append children, each parent member is
//! translated into a *child member* of the same class. Child members are found by
//! `class_for_expr` but do not contribute to the class's relids.

use crate::context::AppendRelInfo;
use crate::expr::Expr;
use crate::relids::RelIds;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an equivalence class within one planning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EcId(pub u32);

impl fmt::Display for EcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ec{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcMember {
    pub expr: Expr,
    pub relids: RelIds,
    pub is_child: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquivalenceClass {
    pub id: EcId,
    pub members: Vec<EcMember>,
    /// Union of the relids of all non-child members.
    pub relids: RelIds,
    pub has_const: bool,
    pub below_outer_join: bool,
}

impl EquivalenceClass {
    pub fn must_be_redundant(&self) -> bool {
        self.has_const && !self.below_outer_join
    }
}

/// All equivalence classes of a planning session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EquivalenceClasses {
    classes: Vec<EquivalenceClass>,
}

impl EquivalenceClasses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class made of `members`. A literal member marks the class as
    /// having a constant.
    pub fn add_class(&mut self, members: Vec<Expr>, below_outer_join: bool) -> EcId {
        let id = EcId(self.classes.len() as u32);
        let has_const = members.iter().any(Expr::is_literal);
        let members: Vec<EcMember> = members
            .into_iter()
            .map(|expr| EcMember {
                relids: expr.relids(),
                expr,
                is_child: false,
            })
            .collect();
        let mut relids = RelIds::empty();
        for m in &members {
            relids.add_members(&m.relids);
        }
        self.classes.push(EquivalenceClass {
            id,
            members,
            relids,
            has_const,
            below_outer_join,
        });
        id
    }

    pub fn get(&self, id: EcId) -> Option<&EquivalenceClass> {
        self.classes.get(id.0 as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EquivalenceClass> {
        self.classes.iter()
    }

    /// The class containing `expr` as a member (parent or child), if any.
    pub fn class_for_expr(&self, expr: &Expr) -> Option<EcId> {
        self.classes
            .iter()
            .find(|ec| ec.members.iter().any(|m| &m.expr == expr))
            .map(|ec| ec.id)
    }

    /// Unknown classes are treated as not redundant; callers that need a class
    /// to exist check `get` themselves.
    pub fn must_be_redundant(&self, id: EcId) -> bool {
        self.get(id).is_some_and(EquivalenceClass::must_be_redundant)
    }

    /// Could a sort on this class help a later merge join of `relids` with some
    /// relation not yet joined? True when the class has a non-child member that
    /// lives entirely outside `relids`.
    pub fn useful_for_merging(&self, id: EcId, relids: &RelIds) -> bool {
        let Some(ec) = self.get(id) else {
            return false;
        };
        if ec.members.len() <= 1 || ec.relids.is_subset_of(relids) {
            return false;
        }
        ec.members
            .iter()
            .any(|m| !m.is_child && !m.relids.overlaps(relids))
    }

    /// Add translated copies of the parent's members for an append child.
    pub fn add_child_members(&mut self, appinfo: &AppendRelInfo) {
        for ec in &mut self.classes {
            let translated: Vec<Expr> = ec
                .members
                .iter()
                .filter(|m| !m.is_child && m.expr.references_rel(appinfo.parent))
                .filter_map(|m| appinfo.translate(&m.expr))
                .collect();
            for expr in translated {
                if ec.members.iter().any(|m| m.expr == expr) {
                    continue;
                }
                ec.members.push(EcMember {
                    relids: expr.relids(),
                    expr,
                    is_child: true,
                });
            }
        }
    }
}
