//! # Relation Identifier Sets
//!
//! Every relation the planner reasons about, base table or join result, is named by
//! the set of base-relation identifiers it covers. Parameterized paths carry a second
//! such set ("required outer") naming the relations that must supply correlated values
//! at execution time. Both are represented by `RelIds`, a small growable bitset.
//!
//! ## Canonical Form
//!
//! Trailing zero words are always trimmed, so two sets with the same members compare
//! equal (and hash equally) regardless of how they were built. The empty set has no
//! words at all, which makes `RelIds::empty()` usable in `const` and `static` contexts.

use serde::{Deserialize, Serialize};
use std::fmt;

const WORD_BITS: usize = 64;

/// Identifier of a single base relation (a range-table index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelId(pub u32);

impl fmt::Display for RelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of comparing two sets by inclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsetComparison {
    /// Both sets have exactly the same members.
    Equal,
    /// The first set is a proper subset of the second.
    Subset1,
    /// The second set is a proper subset of the first.
    Subset2,
    /// Neither set contains the other.
    Different,
}

/// A set of base-relation identifiers.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelIds {
    words: Vec<u64>,
}

impl RelIds {
    pub const fn empty() -> Self {
        Self { words: Vec::new() }
    }

    pub fn singleton(id: RelId) -> Self {
        let mut set = Self::empty();
        set.insert(id);
        set
    }

    pub fn from_ids(ids: &[u32]) -> Self {
        ids.iter().copied().map(RelId).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn contains(&self, id: RelId) -> bool {
        let (word, bit) = Self::position(id);
        self.words.get(word).is_some_and(|w| w & (1u64 << bit) != 0)
    }

    pub fn insert(&mut self, id: RelId) {
        let (word, bit) = Self::position(id);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << bit;
    }

    pub fn remove(&mut self, id: RelId) {
        let (word, bit) = Self::position(id);
        if let Some(w) = self.words.get_mut(word) {
            *w &= !(1u64 << bit);
        }
        self.trim();
    }

    /// The only member, if the set has exactly one.
    pub fn singleton_member(&self) -> Option<RelId> {
        let mut iter = self.iter();
        match (iter.next(), iter.next()) {
            (Some(id), None) => Some(id),
            _ => None,
        }
    }

    pub fn overlaps(&self, other: &RelIds) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    pub fn is_subset_of(&self, other: &RelIds) -> bool {
        self.words.iter().enumerate().all(|(i, w)| {
            let o = other.words.get(i).copied().unwrap_or(0);
            w & !o == 0
        })
    }

    /// True when `self` has at least one member not in `other`.
    pub fn nonempty_difference(&self, other: &RelIds) -> bool {
        !self.is_subset_of(other)
    }

    pub fn union(&self, other: &RelIds) -> RelIds {
        let mut out = self.clone();
        out.add_members(other);
        out
    }

    pub fn intersection(&self, other: &RelIds) -> RelIds {
        let mut out = RelIds {
            words: self
                .words
                .iter()
                .zip(other.words.iter())
                .map(|(a, b)| a & b)
                .collect(),
        };
        out.trim();
        out
    }

    pub fn difference(&self, other: &RelIds) -> RelIds {
        let mut out = self.clone();
        out.del_members(other);
        out
    }

    pub fn add_members(&mut self, other: &RelIds) {
        if self.words.len() < other.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
    }

    pub fn del_members(&mut self, other: &RelIds) {
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a &= !b;
        }
        self.trim();
    }

    pub fn subset_compare(&self, other: &RelIds) -> SubsetComparison {
        match (self.is_subset_of(other), other.is_subset_of(self)) {
            (true, true) => SubsetComparison::Equal,
            (true, false) => SubsetComparison::Subset1,
            (false, true) => SubsetComparison::Subset2,
            (false, false) => SubsetComparison::Different,
        }
    }

    /// Members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = RelId> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..WORD_BITS)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| RelId((i * WORD_BITS + bit) as u32))
        })
    }

    fn position(id: RelId) -> (usize, usize) {
        let idx = id.0 as usize;
        (idx / WORD_BITS, idx % WORD_BITS)
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl FromIterator<RelId> for RelIds {
    fn from_iter<I: IntoIterator<Item = RelId>>(iter: I) -> Self {
        let mut set = RelIds::empty();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl From<RelId> for RelIds {
    fn from(id: RelId) -> Self {
        RelIds::singleton(id)
    }
}

impl fmt::Debug for RelIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|id| id.0)).finish()
    }
}

impl fmt::Display for RelIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
