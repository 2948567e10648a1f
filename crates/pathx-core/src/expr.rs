//! # Scalar Expressions and Join Types
//!
//! This module defines the expression trees the join enumerator inspects: join and
//! filter predicates, CHECK constraints, semi-join key expressions, and equivalence
//! class members. The enumerator never evaluates expressions; it only needs to know
//! which relations an expression references, whether it is a plain constant, and how
//! to rewrite its column references.
//!
//! ## Column References
//! A `ColumnRef` names a column by owning relation (`RelId`), name and ordinal.
//! `Expr::relids()` collects the owning relations of every column in a tree, which is
//! the basis of all "which side of the join does this clause belong to" reasoning.
//!
//! ## Operators
//! Only `=` is both merge- and hash-joinable. Ordering comparisons are join clauses
//! but cannot drive a merge or hash join; for RIGHT and FULL joins they disable the
//! merge strategy entirely (see the clause classifier in `pathx-join`).
//!
//! ## Join Types
//! `JoinType` includes the two unique-ification variants (`UniqueOuter`,
//! `UniqueInner`). They are only meaningful inside one enumeration call and are
//! reduced to `Inner` before any cost or pathkey code sees them.

use crate::relids::{RelId, RelIds};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Reference to a column of a base relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub rel: RelId,
    pub name: String,
    pub index: u32,
}

impl ColumnRef {
    pub fn new(rel: RelId, name: impl Into<String>, index: u32) -> Self {
        Self {
            rel,
            name: name.into(),
            index,
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}.{}", self.rel, self.name)
    }
}

/// Scalar value for expressions.
///
/// Uses `OrderedFloat` for `f64` so that literals can take part in `Eq`/`Hash`
/// comparisons (equivalence-class member lookup compares whole expressions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValue {
    /// SQL NULL value.
    Null,
    /// Boolean true/false.
    Bool(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point, wrapped in OrderedFloat for Eq/Hash support.
    Float64(OrderedFloat<f64>),
    /// UTF-8 string.
    Utf8(String),
    /// Date as days since Unix epoch (1970-01-01).
    Date(i32),
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a == b,
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::Float64(v) => v.hash(state),
            Self::Utf8(v) => v.hash(state),
            Self::Date(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::Float64(v) => write!(f, "{}", v),
            Self::Utf8(v) => write!(f, "'{}'", v),
            Self::Date(v) => write!(f, "date({})", v),
        }
    }
}

/// Scalar expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    /// Reference to a column of some base relation.
    Column(ColumnRef),
    /// Constant literal value.
    Literal(ScalarValue),
    /// Binary operation (e.g., `a + b`, `x = y`, `price > 100`).
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation (e.g., `NOT flag`, `-value`, `IS NULL`).
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Named function call (e.g., `hash(k)`).
    Function {
        name: String,
        args: Vec<Expr>,
    },
    /// Conjunction (AND) of multiple predicates, stored flat.
    And(Vec<Expr>),
    /// Disjunction (OR) of multiple predicates.
    Or(Vec<Expr>),
}

impl Expr {
    pub fn column(rel: RelId, name: impl Into<String>, index: u32) -> Self {
        Expr::Column(ColumnRef::new(rel, name, index))
    }

    pub fn int(v: i64) -> Self {
        Expr::Literal(ScalarValue::Int64(v))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Eq, left, right)
    }

    /// Return all column references in this expression.
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut cols = Vec::new();
        self.collect_columns(&mut cols);
        cols
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Expr::Column(c) => out.push(c),
            Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::UnaryOp { operand, .. } => operand.collect_columns(out),
            Expr::Function { args, .. } => {
                for a in args {
                    a.collect_columns(out);
                }
            }
            Expr::And(exprs) | Expr::Or(exprs) => {
                for e in exprs {
                    e.collect_columns(out);
                }
            }
        }
    }

    /// The set of relations whose columns appear anywhere in this expression.
    pub fn relids(&self) -> RelIds {
        self.columns().iter().map(|c| c.rel).collect()
    }

    pub fn references_rel(&self, rel: RelId) -> bool {
        self.columns().iter().any(|c| c.rel == rel)
    }

    /// True for a bare constant, such as the `false` of `FULL JOIN ... ON false`.
    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal(_))
    }

    /// Split a binary operator clause into its parts.
    pub fn as_binary(&self) -> Option<(BinaryOp, &Expr, &Expr)> {
        match self {
            Expr::BinaryOp { op, left, right } => Some((*op, left, right)),
            _ => None,
        }
    }

    /// Flatten AND-chains: (A AND (B AND C)) → [A, B, C].
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(exprs) => exprs.iter().flat_map(|e| e.conjuncts()).collect(),
            other => vec![other],
        }
    }

    /// Rebuild the expression, replacing every column reference with the result of
    /// `f`. Returns `None` as soon as `f` declines a column, so callers get either a
    /// fully rewritten tree or nothing.
    pub fn try_map_columns<F>(&self, f: &mut F) -> Option<Expr>
    where
        F: FnMut(&ColumnRef) -> Option<Expr>,
    {
        Some(match self {
            Expr::Column(c) => f(c)?,
            Expr::Literal(v) => Expr::Literal(v.clone()),
            Expr::BinaryOp { op, left, right } => Expr::BinaryOp {
                op: *op,
                left: Box::new(left.try_map_columns(f)?),
                right: Box::new(right.try_map_columns(f)?),
            },
            Expr::UnaryOp { op, operand } => Expr::UnaryOp {
                op: *op,
                operand: Box::new(operand.try_map_columns(f)?),
            },
            Expr::Function { name, args } => Expr::Function {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| a.try_map_columns(f))
                    .collect::<Option<Vec<_>>>()?,
            },
            Expr::And(exprs) => Expr::And(
                exprs
                    .iter()
                    .map(|e| e.try_map_columns(f))
                    .collect::<Option<Vec<_>>>()?,
            ),
            Expr::Or(exprs) => Expr::Or(
                exprs
                    .iter()
                    .map(|e| e.try_map_columns(f))
                    .collect::<Option<Vec<_>>>()?,
            ),
        })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{}", c),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::BinaryOp { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::UnaryOp { op, operand } => write!(f, "{}({})", op, operand),
            Expr::Function { name, args } => {
                write!(f, "{}(", name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            Expr::And(exprs) | Expr::Or(exprs) => {
                let sep = if matches!(self, Expr::And(_)) { " AND " } else { " OR " };
                write!(f, "(")?;
                for (i, e) in exprs.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", sep)?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Binary operators for comparison and arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// Equality comparison (`=`). The only merge- and hash-joinable operator.
    Eq,
    /// Inequality comparison (`<>` or `!=`).
    NotEq,
    /// Less than (`<`).
    Lt,
    /// Less than or equal (`<=`).
    LtEq,
    /// Greater than (`>`).
    Gt,
    /// Greater than or equal (`>=`).
    GtEq,
    /// Addition (`+`).
    Add,
    /// Subtraction (`-`).
    Sub,
    /// Multiplication (`*`).
    Mul,
    /// Division (`/`).
    Div,
    /// Remainder (`%`).
    Mod,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    /// Can a sort-merge join use this operator as a merge key?
    pub fn is_mergejoinable(&self) -> bool {
        matches!(self, BinaryOp::Eq)
    }

    /// Can a hash join use this operator as a hash key?
    pub fn is_hashjoinable(&self) -> bool {
        matches!(self, BinaryOp::Eq)
    }

    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unary operators for boolean logic and null checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Boolean negation (`NOT`).
    Not,
    /// Arithmetic negation (unary minus).
    Neg,
    /// Null check (`IS NULL`).
    IsNull,
    /// Non-null check (`IS NOT NULL`).
    IsNotNull,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Not => "NOT",
            UnaryOp::Neg => "-",
            UnaryOp::IsNull => "IS NULL",
            UnaryOp::IsNotNull => "IS NOT NULL",
        };
        f.write_str(s)
    }
}

/// SQL join types, plus the two unique-ification variants used while enumerating.
///
/// `Right` is the mirror of `Left` produced when the planner tries the input
/// relations in the opposite order from the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    /// Inner join: only matching rows from both sides.
    Inner,
    /// Left outer join: all rows from the outer side, NULL-extended where unmatched.
    Left,
    /// Full outer join: all rows from both sides.
    Full,
    /// Right outer join: all rows from the inner side.
    Right,
    /// Semi join: outer rows having at least one match on the inner side.
    Semi,
    /// Anti join: outer rows having no match on the inner side.
    Anti,
    /// Unique-ify the outer input, then inner join.
    UniqueOuter,
    /// Unique-ify the inner input, then inner join.
    UniqueInner,
}

impl JoinType {
    /// Joins that can NULL-extend or filter one side based on the other. Clauses
    /// pushed down from above such a join are never usable as its join keys.
    pub fn is_outer_join(&self) -> bool {
        matches!(
            self,
            JoinType::Left | JoinType::Full | JoinType::Right | JoinType::Anti
        )
    }

    pub fn is_unique_variant(&self) -> bool {
        matches!(self, JoinType::UniqueOuter | JoinType::UniqueInner)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
            JoinType::Full => "FULL",
            JoinType::Right => "RIGHT",
            JoinType::Semi => "SEMI",
            JoinType::Anti => "ANTI",
            JoinType::UniqueOuter => "UNIQUE_OUTER",
            JoinType::UniqueInner => "UNIQUE_INNER",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relids_of_clause() {
        let clause = Expr::eq(
            Expr::column(RelId(1), "k", 0),
            Expr::binary(BinaryOp::Add, Expr::column(RelId(2), "k", 0), Expr::int(2)),
        );
        assert_eq!(clause.relids(), RelIds::from_ids(&[1, 2]));
        assert!(clause.references_rel(RelId(2)));
        assert!(!clause.references_rel(RelId(3)));
        assert_eq!(clause.to_string(), "(r1.k = (r2.k + 2))");
    }

    #[test]
    fn test_try_map_columns_is_all_or_nothing() {
        let expr = Expr::And(vec![
            Expr::binary(BinaryOp::GtEq, Expr::column(RelId(1), "a", 0), Expr::int(0)),
            Expr::binary(BinaryOp::Lt, Expr::column(RelId(1), "b", 1), Expr::int(9)),
        ]);

        let renamed = expr.try_map_columns(&mut |c| {
            Some(Expr::column(RelId(4), c.name.clone(), c.index))
        });
        assert_eq!(renamed.map(|e| e.relids()), Some(RelIds::from_ids(&[4])));

        let partial = expr.try_map_columns(&mut |c| {
            (c.name == "a").then(|| Expr::column(RelId(4), "a", 0))
        });
        assert!(partial.is_none());
    }

    #[test]
    fn test_outer_join_classification() {
        assert!(JoinType::Anti.is_outer_join());
        assert!(JoinType::Right.is_outer_join());
        assert!(!JoinType::Semi.is_outer_join());
        assert!(!JoinType::UniqueInner.is_outer_join());
        assert!(JoinType::UniqueOuter.is_unique_variant());
    }
}
