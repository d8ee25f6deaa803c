use std::cmp::Ordering;
use std::ops::{BitAnd, BitOr, Not};

use crate::row::Row;
use crate::value::Value;

/// Comparison operators of a [Where::Cmp] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
}

impl CmpOp {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::Ne => ord != Ordering::Equal,
            Self::Gt => ord == Ordering::Greater,
            Self::Lt => ord == Ordering::Less,
        }
    }
}

/// Boolean connective of a [Where::Exp] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    And,
    Or,
}

/// A predicate evaluated against one row at a time.
///
/// The tree owns its children, so cloning a predicate yields an independent
/// copy. Columns are addressed by number.
#[derive(Debug, Clone, PartialEq)]
pub enum Where {
    True,
    False,
    /// The field equals the value; NULL equals NULL.
    Equal { column: usize, value: Value },
    NotEqual { column: usize, value: Value },
    /// Three-way comparison of the field against the value.
    Cmp {
        column: usize,
        op: CmpOp,
        value: Value,
    },
    /// Both sides are always evaluated.
    Exp {
        lhs: Box<Where>,
        op: Logic,
        rhs: Box<Where>,
    },
    Not(Box<Where>),
    /// The field equals one of the values.
    In { column: usize, values: Vec<Value> },
}

impl Where {
    pub fn equal(column: usize, value: impl Into<Value>) -> Self {
        Self::Equal {
            column,
            value: value.into(),
        }
    }

    pub fn not_equal(column: usize, value: impl Into<Value>) -> Self {
        Self::NotEqual {
            column,
            value: value.into(),
        }
    }

    pub fn cmp(column: usize, op: CmpOp, value: impl Into<Value>) -> Self {
        Self::Cmp {
            column,
            op,
            value: value.into(),
        }
    }

    pub fn in_set<I, V>(column: usize, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In {
            column,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn and(self, rhs: Self) -> Self {
        Self::Exp {
            lhs: Box::new(self),
            op: Logic::And,
            rhs: Box::new(rhs),
        }
    }

    pub fn or(self, rhs: Self) -> Self {
        Self::Exp {
            lhs: Box::new(self),
            op: Logic::Or,
            rhs: Box::new(rhs),
        }
    }

    /// Evaluates the predicate against `row`.
    ///
    /// # Panics
    /// Panics if a compared value has another type than its column, or if a
    /// column number is out of range.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::Equal { column, value } => row.field(*column).eq_value(value),
            Self::NotEqual { column, value } => !row.field(*column).eq_value(value),
            Self::Cmp { column, op, value } => op.holds(row.field(*column).compare(value)),
            Self::Exp { lhs, op, rhs } => {
                let left = lhs.matches(row);
                let right = rhs.matches(row);
                match op {
                    Logic::And => left && right,
                    Logic::Or => left || right,
                }
            }
            Self::Not(inner) => !inner.matches(row),
            Self::In { column, values } => {
                let field = row.field(*column);
                values.iter().any(|value| field.eq_value(value))
            }
        }
    }
}

impl Not for Where {
    type Output = Self;

    fn not(self) -> Self {
        Self::Not(Box::new(self))
    }
}

impl BitAnd for Where {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.and(rhs)
    }
}

impl BitOr for Where {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.or(rhs)
    }
}
