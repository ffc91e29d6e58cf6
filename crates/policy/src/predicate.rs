//! Compiled predicate tree.
//!
//! A `Predicate` is the storage-neutral output of the compiler: adapters turn
//! it into their native query form, and [`Predicate::matches`] evaluates it
//! against an in-memory [`Row`].

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};

use datascope_core::{FieldRef, Row, SemiJoin, Value};

/// Literal comparison operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn accepts(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

/// Boolean predicate over one row of the target entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Const(bool),
    /// `field <op> value`. A `Null` value means "is null" (`Eq`) or
    /// "is not null" (`Ne`); ordering against null never matches.
    Compare {
        field: FieldRef,
        op: CompareOp,
        value: Value,
    },
    /// Substring test on a string field.
    Contains { field: FieldRef, needle: String },
    /// The field's string projection is one of `values`. Null never matches.
    InSet { field: FieldRef, values: Vec<String> },
    /// The field's string projection is none of `values`. Null never matches.
    NotInSet { field: FieldRef, values: Vec<String> },
    SemiJoin(SemiJoin),
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    /// No restriction: every row is visible.
    pub fn always() -> Self {
        Predicate::Const(true)
    }

    pub fn never() -> Self {
        Predicate::Const(false)
    }

    pub fn compare(field: FieldRef, op: CompareOp, value: Value) -> Self {
        Predicate::Compare { field, op, value }
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Predicate::Const(true))
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Predicate::Const(false))
    }

    /// Evaluate against a row. Fields missing from the row behave as null.
    pub fn matches(&self, row: &dyn Row) -> bool {
        match self {
            Predicate::Const(b) => *b,
            Predicate::Compare { field, op, value } => {
                let actual = row.field_value(&field.name).unwrap_or(Value::Null);
                compare(&actual, *op, value, field)
            }
            Predicate::Contains { field, needle } => match row.field_value(&field.name) {
                Some(Value::Text(s)) => s.contains(needle.as_str()),
                _ => false,
            },
            Predicate::InSet { field, values } => row
                .field_value(&field.name)
                .and_then(|v| v.string_projection())
                .is_some_and(|s| values.iter().any(|v| *v == s)),
            Predicate::NotInSet { field, values } => row
                .field_value(&field.name)
                .and_then(|v| v.string_projection())
                .is_some_and(|s| values.iter().all(|v| *v != s)),
            Predicate::SemiJoin(join) => row.semi_join_matches(join),
            Predicate::Not(inner) => !inner.matches(row),
            Predicate::And(a, b) => a.matches(row) && b.matches(row),
            Predicate::Or(a, b) => a.matches(row) || b.matches(row),
        }
    }

    /// Fold constant subtrees (`x AND false` → `false`, `x OR false` → `x`, ...).
    pub fn simplify(self) -> Predicate {
        match self {
            Predicate::And(a, b) => match (a.simplify(), b.simplify()) {
                (Predicate::Const(false), _) | (_, Predicate::Const(false)) => Predicate::never(),
                (Predicate::Const(true), p) | (p, Predicate::Const(true)) => p,
                (a, b) => a.and(b),
            },
            Predicate::Or(a, b) => match (a.simplify(), b.simplify()) {
                (Predicate::Const(true), _) | (_, Predicate::Const(true)) => Predicate::always(),
                (Predicate::Const(false), p) | (p, Predicate::Const(false)) => p,
                (a, b) => a.or(b),
            },
            Predicate::Not(inner) => match inner.simplify() {
                Predicate::Const(b) => Predicate::Const(!b),
                p => p.not(),
            },
            other => other,
        }
    }
}

fn compare(actual: &Value, op: CompareOp, expected: &Value, field: &FieldRef) -> bool {
    match (actual.is_null(), expected.is_null()) {
        (true, true) => op == CompareOp::Eq,
        (false, true) => op == CompareOp::Ne,
        (true, false) => false,
        (false, false) => actual
            .partial_compare(expected, &field.ty.kind)
            .is_some_and(|ord| op.accepts(ord)),
    }
}

impl core::fmt::Display for Predicate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Predicate::Const(b) => write!(f, "{b}"),
            Predicate::Compare { field, op, value } => match value.string_projection() {
                Some(v) => write!(f, "{} {} '{}'", field.name, op.symbol(), v),
                None if *op == CompareOp::Eq => write!(f, "{} IS NULL", field.name),
                None => write!(f, "{} IS NOT NULL", field.name),
            },
            Predicate::Contains { field, needle } => {
                write!(f, "{} CONTAINS '{}'", field.name, needle)
            }
            Predicate::InSet { field, values } => {
                write!(f, "{} IN ({})", field.name, values.join(", "))
            }
            Predicate::NotInSet { field, values } => {
                write!(f, "{} NOT IN ({})", field.name, values.join(", "))
            }
            Predicate::SemiJoin(join) => write!(
                f,
                "EXISTS {}[{} = {}.{}, {} IN ({})]",
                join.join.table,
                join.join.business_id_column,
                join.row_field.entity,
                join.row_field.name,
                join.join.member_column,
                join.members.join(", ")
            ),
            Predicate::Not(inner) => write!(f, "NOT ({inner})"),
            Predicate::And(a, b) => write!(f, "({a} AND {b})"),
            Predicate::Or(a, b) => write!(f, "({a} OR {b})"),
        }
    }
}
