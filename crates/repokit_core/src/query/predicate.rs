//! Composable filter expressions (specifications).
//!
//! # Invariants
//! - Predicates are immutable values; composition builds new trees.
//! - `Always` is the neutral element: composing with it yields the other
//!   operand, so optional criteria can be chained without branching.
//! - Field names are not checked here; the SQL compiler validates them
//!   against the metadata registry when the predicate is executed.

use super::value::Value;
use serde::{Deserialize, Serialize};
use std::ops::Not;

/// Binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

/// Filter expression over entity field paths.
///
/// A field path is a field name (`username`) or a dotted path through
/// relations (`team.name`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Predicate {
    /// "No criterion". Standalone it matches every row, but it is not
    /// logical TRUE: `and`, `or` and `negate` drop it, so `p.or(Always)` is
    /// `p` and `!Always` is still `Always`.
    Always,
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    Between {
        field: String,
        low: Value,
        high: Value,
    },
    In {
        field: String,
        values: Vec<Value>,
        negated: bool,
    },
    Null {
        field: String,
        negated: bool,
    },
    Like {
        field: String,
        pattern: String,
        negated: bool,
    },
    /// Rows whose `relation` points at a `related` row matching `filter`.
    Join {
        relation: String,
        related: String,
        filter: Box<Predicate>,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Default for Predicate {
    fn default() -> Self {
        Self::Always
    }
}

impl Predicate {
    pub fn always() -> Self {
        Self::Always
    }

    /// `field = value`; absent or empty values yield [`Predicate::Always`].
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        if value.is_empty() {
            return Self::Always;
        }
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn not_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn greater_than(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn greater_than_or_equal(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ge, value)
    }

    pub fn less_than(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn less_than_or_equal(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Le, value)
    }

    /// Inclusive range.
    pub fn between(
        field: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Self::Between {
            field: field.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    /// SQL `LIKE` with `%`/`_` wildcards.
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Like {
            field: field.into(),
            pattern: pattern.into(),
            negated: false,
        }
    }

    pub fn not_like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Like {
            field: field.into(),
            pattern: pattern.into(),
            negated: true,
        }
    }

    /// Membership test. An empty list matches nothing.
    pub fn is_in<I, T>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    /// Negated membership test. An empty list matches everything.
    pub fn not_in<I, T>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::Null {
            field: field.into(),
            negated: false,
        }
    }

    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::Null {
            field: field.into(),
            negated: true,
        }
    }

    /// Inner join: rows whose `relation` points at an existing `related` row.
    pub fn join(relation: impl Into<String>, related: impl Into<String>) -> Self {
        Self::join_on(relation, related, Self::Always)
    }

    /// Inner join filtered on fields of the related entity.
    pub fn join_on(
        relation: impl Into<String>,
        related: impl Into<String>,
        filter: Predicate,
    ) -> Self {
        Self::Join {
            relation: relation.into(),
            related: related.into(),
            filter: Box::new(filter),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Self::Always, other) => other,
            (this, Self::Always) => this,
            (this, other) => Self::And(Box::new(this), Box::new(other)),
        }
    }

    /// Disjunction that treats `Always` as an absent operand, not as TRUE.
    pub fn or(self, other: Predicate) -> Self {
        match (self, other) {
            (Self::Always, other) => other,
            (this, Self::Always) => this,
            (this, other) => Self::Or(Box::new(this), Box::new(other)),
        }
    }

    /// Negation. `Always` means "no criterion", so negating it stays
    /// `Always` rather than matching nothing.
    pub fn negate(self) -> Self {
        match self {
            Self::Always => Self::Always,
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Folds `predicates` with AND; an empty input yields `Always`.
    pub fn all<I>(predicates: I) -> Self
    where
        I: IntoIterator<Item = Predicate>,
    {
        predicates.into_iter().fold(Self::Always, Self::and)
    }

    /// Folds `predicates` with OR; an empty input yields `Always`.
    pub fn any<I>(predicates: I) -> Self
    where
        I: IntoIterator<Item = Predicate>,
    {
        predicates.into_iter().fold(Self::Always, Self::or)
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Self::Always)
    }

    /// Field path of a single-field predicate.
    pub(crate) fn leaf_field(&self) -> Option<&str> {
        match self {
            Self::Compare { field, .. }
            | Self::Between { field, .. }
            | Self::In { field, .. }
            | Self::Null { field, .. }
            | Self::Like { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Copy of a single-field predicate retargeted at `path`.
    pub(crate) fn with_field(&self, path: &str) -> Self {
        let mut copy = self.clone();
        match &mut copy {
            Self::Compare { field, .. }
            | Self::Between { field, .. }
            | Self::In { field, .. }
            | Self::Null { field, .. }
            | Self::Like { field, .. } => *field = path.to_string(),
            _ => {}
        }
        copy
    }
}

impl Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        self.negate()
    }
}

#[cfg(test)]
mod tests {
    use super::{CompareOp, Predicate};
    use crate::query::Value;

    #[test]
    fn equals_with_absent_value_is_neutral() {
        assert!(Predicate::equals("username", None::<&str>).is_always());
        assert!(Predicate::equals("username", "").is_always());
        assert!(!Predicate::equals("username", "m1").is_always());
    }

    #[test]
    fn composing_with_always_returns_other_operand() {
        let username = Predicate::equals("username", "m1");
        assert_eq!(Predicate::Always.and(username.clone()), username);
        assert_eq!(username.clone().or(Predicate::Always), username);
    }

    #[test]
    fn always_is_absent_inside_or_and_negate() {
        let username = Predicate::equals("username", "m1");
        assert_eq!(Predicate::Always.or(username.clone()), username);
        assert!(Predicate::Always.negate().is_always());
        assert!((!Predicate::Always).is_always());
    }

    #[test]
    fn composition_leaves_operands_untouched() {
        let left = Predicate::equals("username", "m1");
        let right = Predicate::greater_than("age", 10);
        let combined = left.clone().and(right.clone());
        assert_eq!(
            combined,
            Predicate::And(Box::new(left.clone()), Box::new(right.clone()))
        );
        assert_eq!(left, Predicate::compare("username", CompareOp::Eq, "m1"));
        assert_eq!(right, Predicate::compare("age", CompareOp::Gt, Value::Integer(10)));
    }

    #[test]
    fn double_negation_cancels() {
        let base = Predicate::is_null("team");
        assert_eq!(!!base.clone(), base);
        assert!(Predicate::Always.negate().is_always());
    }

    #[test]
    fn all_skips_neutral_parts() {
        let folded = Predicate::all([
            Predicate::equals("username", None::<String>),
            Predicate::equals("age", 10),
        ]);
        assert_eq!(folded, Predicate::equals("age", 10));
    }
}
