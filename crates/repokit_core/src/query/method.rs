//! Derived queries from structured method names.
//!
//! # Responsibility
//! - Parse descriptors such as `findByUsernameAndAgeGreaterThan` into a
//!   predicate template, result shape, limit and ordering.
//! - Bind positional arguments into a concrete [`Predicate`].
//! - Cache resolutions per `(entity, descriptor, shape)`.
//!
//! # Invariants
//! - Resolution is deterministic: the same descriptor always yields the
//!   same template.
//! - `And` binds tighter than `Or`.
//! - Operator keywords are matched longest-first; a keyword whose remaining
//!   property does not resolve is skipped in favor of a shorter one.

use super::predicate::{CompareOp, Predicate};
use super::sql::escape_like;
use super::value::{QueryArg, Value};
use crate::meta::{EntityMeta, MetaError, MetadataRegistry};
use crate::page::{Direction, Order, Sort};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

static METHOD_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(find|read|get|query|search|stream|count|exists)(\p{Lu}\w*?)??(?:By(\p{Lu}\w*)?)?$")
        .expect("method name pattern is valid")
});

static LIMITING_SUBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:First|Top)(\d*)(?:\p{Lu}|$)").expect("subject pattern is valid")
});

/// Operator keywords as camel-case word sequences, longest first.
const OPERATOR_KEYWORDS: &[(&[&str], Operator)] = &[
    (&["Is", "Greater", "Than", "Equal"], Operator::GreaterThanEqual),
    (&["Is", "Less", "Than", "Equal"], Operator::LessThanEqual),
    (&["Greater", "Than", "Equal"], Operator::GreaterThanEqual),
    (&["Less", "Than", "Equal"], Operator::LessThanEqual),
    (&["Is", "Greater", "Than"], Operator::GreaterThan),
    (&["Is", "Less", "Than"], Operator::LessThan),
    (&["Is", "Not", "Null"], Operator::IsNotNull),
    (&["Is", "Not", "In"], Operator::NotIn),
    (&["Is", "Not", "Like"], Operator::NotLike),
    (&["Is", "Starting", "With"], Operator::StartingWith),
    (&["Is", "Ending", "With"], Operator::EndingWith),
    (&["Greater", "Than"], Operator::GreaterThan),
    (&["Less", "Than"], Operator::LessThan),
    (&["Is", "Null"], Operator::IsNull),
    (&["Not", "Null"], Operator::IsNotNull),
    (&["Is", "Not"], Operator::Not),
    (&["Not", "In"], Operator::NotIn),
    (&["Is", "In"], Operator::In),
    (&["Not", "Like"], Operator::NotLike),
    (&["Is", "Like"], Operator::Like),
    (&["Starting", "With"], Operator::StartingWith),
    (&["Starts", "With"], Operator::StartingWith),
    (&["Ending", "With"], Operator::EndingWith),
    (&["Ends", "With"], Operator::EndingWith),
    (&["Is", "Containing"], Operator::Containing),
    (&["Is", "Between"], Operator::Between),
    (&["Is", "After"], Operator::GreaterThan),
    (&["Is", "Before"], Operator::LessThan),
    (&["Is", "True"], Operator::True),
    (&["Is", "False"], Operator::False),
    (&["Is", "Equal"], Operator::Equals),
    (&["Containing"], Operator::Containing),
    (&["Contains"], Operator::Containing),
    (&["Between"], Operator::Between),
    (&["After"], Operator::GreaterThan),
    (&["Before"], Operator::LessThan),
    (&["Like"], Operator::Like),
    (&["In"], Operator::In),
    (&["Null"], Operator::IsNull),
    (&["True"], Operator::True),
    (&["False"], Operator::False),
    (&["Not"], Operator::Not),
    (&["Equals"], Operator::Equals),
    (&["Is"], Operator::Equals),
];

/// Derived-query resolution and binding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    InvalidMethodName {
        descriptor: String,
        reason: String,
    },
    /// The typed repository does not declare this method.
    UndeclaredMethod {
        entity: &'static str,
        descriptor: String,
    },
    ArgumentMismatch {
        descriptor: String,
        expected: usize,
        found: usize,
    },
    /// A parameter of the wrong kind (list vs single, non-text pattern).
    ArgumentKind {
        descriptor: String,
        position: usize,
        expected: &'static str,
    },
    UnsupportedOperation {
        descriptor: String,
        reason: String,
    },
    Meta(MetaError),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMethodName { descriptor, reason } => {
                write!(f, "invalid query method `{descriptor}`: {reason}")
            }
            Self::UndeclaredMethod { entity, descriptor } => {
                write!(f, "query method `{descriptor}` is not declared for {entity}")
            }
            Self::ArgumentMismatch {
                descriptor,
                expected,
                found,
            } => write!(
                f,
                "query method `{descriptor}` expects {expected} argument(s), got {found}"
            ),
            Self::ArgumentKind {
                descriptor,
                position,
                expected,
            } => write!(
                f,
                "query method `{descriptor}` expects {expected} at argument {position}"
            ),
            Self::UnsupportedOperation { descriptor, reason } => {
                write!(f, "unsupported query method `{descriptor}`: {reason}")
            }
            Self::Meta(err) => write!(f, "{err}"),
        }
    }
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Meta(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MetaError> for QueryError {
    fn from(value: MetaError) -> Self {
        Self::Meta(value)
    }
}

/// Result form requested from a derived query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultShape {
    List,
    One,
    Optional,
    Page,
    Slice,
    Count,
    Exists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prefix {
    Find,
    Count,
    Exists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equals,
    Not,
    GreaterThan,
    GreaterThanEqual,
    LessThan,
    LessThanEqual,
    Between,
    Like,
    NotLike,
    StartingWith,
    EndingWith,
    Containing,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    True,
    False,
}

impl Operator {
    fn arity(self) -> usize {
        match self {
            Self::IsNull | Self::IsNotNull | Self::True | Self::False => 0,
            Self::Between => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Criterion {
    path: String,
    operator: Operator,
}

/// A resolved query method: predicate template plus result options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedQuery {
    entity: &'static str,
    descriptor: String,
    shape: ResultShape,
    distinct: bool,
    limit: Option<u64>,
    groups: Vec<Vec<Criterion>>,
    sort: Sort,
}

impl DerivedQuery {
    /// Resolves `descriptor` against `entity`'s metadata.
    ///
    /// `shape` defaults to `Count`/`Exists` for those prefixes and `List`
    /// otherwise.
    pub fn resolve(
        registry: &MetadataRegistry,
        entity: &str,
        descriptor: &str,
        shape: Option<ResultShape>,
    ) -> Result<Self, QueryError> {
        let meta = registry.lookup(entity)?;
        let invalid = |reason: &str| QueryError::InvalidMethodName {
            descriptor: descriptor.to_string(),
            reason: reason.to_string(),
        };

        let captures = METHOD_NAME
            .captures(descriptor)
            .ok_or_else(|| invalid("expected find|read|get|query|search|stream|count|exists prefix followed by By<Criteria>"))?;
        let prefix = match &captures[1] {
            "count" => Prefix::Count,
            "exists" => Prefix::Exists,
            _ => Prefix::Find,
        };
        let subject = captures.get(2).map_or("", |m| m.as_str());
        let tail = captures.get(3).map_or("", |m| m.as_str());

        let shape = resolve_shape(descriptor, prefix, shape)?;
        let distinct = subject.contains("Distinct");
        let limit = match LIMITING_SUBJECT.captures(subject) {
            Some(limit) => {
                let digits = limit.get(1).map_or("", |m| m.as_str());
                let value = if digits.is_empty() {
                    1
                } else {
                    digits
                        .parse::<u64>()
                        .map_err(|_| invalid("result limit is out of range"))?
                };
                if value == 0 {
                    return Err(invalid("result limit must be positive"));
                }
                Some(value)
            }
            None => None,
        };
        if limit.is_some() && matches!(shape, ResultShape::Page | ResultShape::Slice) {
            return Err(QueryError::UnsupportedOperation {
                descriptor: descriptor.to_string(),
                reason: "First/Top cannot be combined with paging".to_string(),
            });
        }

        let (criteria, ordering) = split_order_clause(tail);
        let words = camel_words(criteria);
        let mut groups = Vec::new();
        if !words.is_empty() {
            for group in split_words(&words, "Or") {
                let mut parts = Vec::new();
                for part in split_words(group, "And") {
                    if part.is_empty() {
                        return Err(invalid("empty criterion around And/Or"));
                    }
                    parts.push(resolve_criterion(registry, meta, part)?);
                }
                groups.push(parts);
            }
        }

        let sort = match ordering {
            Some(ordering) => resolve_ordering(registry, meta, ordering, &invalid)?,
            None => Sort::unsorted(),
        };

        Ok(Self {
            entity: meta.name,
            descriptor: descriptor.to_string(),
            shape,
            distinct,
            limit,
            groups,
            sort,
        })
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn shape(&self) -> ResultShape {
        self.shape
    }

    /// `Distinct` is accepted; root rows are unique already because joins
    /// never multiply them.
    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    /// Number of positional arguments `bind` expects.
    pub fn argument_count(&self) -> usize {
        self.criteria().map(|c| c.operator.arity()).sum()
    }

    /// Field paths referenced by the criteria, in declaration order.
    pub fn field_paths(&self) -> Vec<&str> {
        self.criteria().map(|c| c.path.as_str()).collect()
    }

    /// Builds the predicate for one invocation.
    pub fn bind(&self, args: &[QueryArg]) -> Result<Predicate, QueryError> {
        let expected = self.argument_count();
        if args.len() != expected {
            return Err(QueryError::ArgumentMismatch {
                descriptor: self.descriptor.clone(),
                expected,
                found: args.len(),
            });
        }

        let mut remaining = args.iter().enumerate();
        let mut next = || remaining.next();
        let mut disjuncts = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            let mut conjuncts = Vec::with_capacity(group.len());
            for criterion in group {
                conjuncts.push(self.bind_criterion(criterion, &mut next)?);
            }
            disjuncts.push(Predicate::all(conjuncts));
        }
        Ok(Predicate::any(disjuncts))
    }

    fn criteria(&self) -> impl Iterator<Item = &Criterion> {
        self.groups.iter().flatten()
    }

    fn bind_criterion<'a, F>(&self, criterion: &Criterion, next: &mut F) -> Result<Predicate, QueryError>
    where
        F: FnMut() -> Option<(usize, &'a QueryArg)>,
    {
        let path = criterion.path.clone();
        let predicate = match criterion.operator {
            Operator::IsNull => Predicate::is_null(path),
            Operator::IsNotNull => Predicate::is_not_null(path),
            Operator::True => Predicate::compare(path, CompareOp::Eq, true),
            Operator::False => Predicate::compare(path, CompareOp::Eq, false),
            Operator::Equals => Predicate::compare(path, CompareOp::Eq, self.single(next)?),
            Operator::Not => Predicate::compare(path, CompareOp::Ne, self.single(next)?),
            Operator::GreaterThan => Predicate::compare(path, CompareOp::Gt, self.single(next)?),
            Operator::GreaterThanEqual => {
                Predicate::compare(path, CompareOp::Ge, self.single(next)?)
            }
            Operator::LessThan => Predicate::compare(path, CompareOp::Lt, self.single(next)?),
            Operator::LessThanEqual => Predicate::compare(path, CompareOp::Le, self.single(next)?),
            Operator::Between => {
                let low = self.single(next)?;
                let high = self.single(next)?;
                Predicate::between(path, low, high)
            }
            Operator::Like => Predicate::like(path, self.text(next)?),
            Operator::NotLike => Predicate::not_like(path, self.text(next)?),
            Operator::StartingWith => {
                Predicate::like(path, format!("{}%", escape_like(&self.text(next)?)))
            }
            Operator::EndingWith => {
                Predicate::like(path, format!("%{}", escape_like(&self.text(next)?)))
            }
            Operator::Containing => {
                Predicate::like(path, format!("%{}%", escape_like(&self.text(next)?)))
            }
            Operator::In => Predicate::is_in(path, self.list(next)?),
            Operator::NotIn => Predicate::not_in(path, self.list(next)?),
        };
        Ok(predicate)
    }

    fn single<'a, F>(&self, next: &mut F) -> Result<Value, QueryError>
    where
        F: FnMut() -> Option<(usize, &'a QueryArg)>,
    {
        match next() {
            Some((_, QueryArg::Single(value))) => Ok(value.clone()),
            Some((position, QueryArg::List(_))) => Err(self.kind_error(position, "a single value")),
            None => Err(self.count_error()),
        }
    }

    fn text<'a, F>(&self, next: &mut F) -> Result<String, QueryError>
    where
        F: FnMut() -> Option<(usize, &'a QueryArg)>,
    {
        match next() {
            Some((_, QueryArg::Single(Value::Text(text)))) => Ok(text.clone()),
            Some((_, QueryArg::Single(Value::Integer(number)))) => Ok(number.to_string()),
            Some((position, _)) => Err(self.kind_error(position, "a text value")),
            None => Err(self.count_error()),
        }
    }

    fn list<'a, F>(&self, next: &mut F) -> Result<Vec<Value>, QueryError>
    where
        F: FnMut() -> Option<(usize, &'a QueryArg)>,
    {
        match next() {
            Some((_, QueryArg::List(values))) => Ok(values.clone()),
            Some((position, QueryArg::Single(_))) => Err(self.kind_error(position, "a list")),
            None => Err(self.count_error()),
        }
    }

    fn kind_error(&self, position: usize, expected: &'static str) -> QueryError {
        QueryError::ArgumentKind {
            descriptor: self.descriptor.clone(),
            position,
            expected,
        }
    }

    fn count_error(&self) -> QueryError {
        let expected = self.argument_count();
        QueryError::ArgumentMismatch {
            descriptor: self.descriptor.clone(),
            expected,
            found: expected.saturating_sub(1),
        }
    }
}

/// Resolved derived queries shared by every unit of work of a store.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: Mutex<HashMap<CacheKey, Arc<DerivedQuery>>>,
}

type CacheKey = (&'static str, String, Option<ResultShape>);

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached resolution or resolves and caches it.
    pub fn resolve(
        &self,
        registry: &MetadataRegistry,
        entity: &'static str,
        descriptor: &str,
        shape: Option<ResultShape>,
    ) -> Result<Arc<DerivedQuery>, QueryError> {
        let key = (entity, descriptor.to_string(), shape);
        if let Some(found) = self.lock().get(&key) {
            return Ok(Arc::clone(found));
        }

        let resolved = match DerivedQuery::resolve(registry, entity, descriptor, shape) {
            Ok(resolved) => Arc::new(resolved),
            Err(err) => {
                debug!(
                    "event=query_resolve module=query status=error entity={entity} method={descriptor} error={err}"
                );
                return Err(err);
            }
        };
        debug!(
            "event=query_resolve module=query status=ok entity={entity} method={descriptor} args={}",
            resolved.argument_count()
        );
        let mut entries = self.lock();
        let cached = entries.entry(key).or_insert(resolved);
        Ok(Arc::clone(cached))
    }

    /// Resolves a whole declaration table, failing on the first bad entry.
    pub fn preload(
        &self,
        registry: &MetadataRegistry,
        entity: &'static str,
        table: &[(&str, ResultShape)],
    ) -> Result<(), QueryError> {
        for (descriptor, shape) in table {
            self.resolve(registry, entity, descriptor, Some(*shape))?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Arc<DerivedQuery>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn resolve_shape(
    descriptor: &str,
    prefix: Prefix,
    requested: Option<ResultShape>,
) -> Result<ResultShape, QueryError> {
    let shape = match (prefix, requested) {
        (Prefix::Count, None | Some(ResultShape::Count)) => ResultShape::Count,
        (Prefix::Exists, None | Some(ResultShape::Exists)) => ResultShape::Exists,
        (Prefix::Find, None) => ResultShape::List,
        (Prefix::Find, Some(shape)) => shape,
        (_, Some(shape)) => {
            return Err(QueryError::UnsupportedOperation {
                descriptor: descriptor.to_string(),
                reason: format!("{shape:?} result for a count/exists method"),
            })
        }
    };
    Ok(shape)
}

/// Splits `criteria` at the first `OrderBy<Upper>` boundary.
fn split_order_clause(tail: &str) -> (&str, Option<&str>) {
    let mut search_from = 0;
    while let Some(found) = tail[search_from..].find("OrderBy") {
        let start = search_from + found;
        let rest = &tail[start + "OrderBy".len()..];
        if rest.chars().next().is_some_and(char::is_uppercase) {
            return (&tail[..start], Some(rest));
        }
        search_from = start + 1;
    }
    (tail, None)
}

/// Splits a camel-case identifier into words; digits stay with the
/// preceding word.
fn camel_words(text: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut start = 0;
    for (index, c) in text.char_indices() {
        if index > start && c.is_uppercase() {
            words.push(&text[start..index]);
            start = index;
        }
    }
    if start < text.len() {
        words.push(&text[start..]);
    }
    words
}

fn split_words<'w, 's>(words: &'w [&'s str], separator: &str) -> Vec<&'w [&'s str]> {
    words.split(|word| *word == separator).collect()
}

fn lower_camel(words: &[&str]) -> String {
    let mut out = String::new();
    for (index, word) in words.iter().enumerate() {
        if index == 0 {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_lowercase());
                out.push_str(chars.as_str());
            }
        } else {
            out.push_str(word);
        }
    }
    out
}

fn resolve_criterion(
    registry: &MetadataRegistry,
    meta: &EntityMeta,
    words: &[&str],
) -> Result<Criterion, QueryError> {
    for (keyword, operator) in OPERATOR_KEYWORDS {
        if words.len() <= keyword.len() || !words.ends_with(keyword) {
            continue;
        }
        let property = &words[..words.len() - keyword.len()];
        if let Some(path) = resolve_property(registry, meta, property) {
            return Ok(Criterion {
                path,
                operator: *operator,
            });
        }
    }

    resolve_property(registry, meta, words)
        .map(|path| Criterion {
            path,
            operator: Operator::Equals,
        })
        .ok_or_else(|| {
            QueryError::Meta(MetaError::UnknownField {
                entity: meta.name,
                field: lower_camel(words),
            })
        })
}

/// Resolves camel words to a field path, descending through relations
/// when the joined name is not a field of `meta`.
fn resolve_property(
    registry: &MetadataRegistry,
    meta: &EntityMeta,
    words: &[&str],
) -> Option<String> {
    if words.is_empty() {
        return None;
    }
    let whole = lower_camel(words);
    if meta.column_for(&whole).is_some() {
        return Some(whole);
    }
    for split in (1..words.len()).rev() {
        let head = lower_camel(&words[..split]);
        let Some(relation) = meta.relation(&head) else {
            continue;
        };
        let Ok(target) = registry.lookup(relation.target) else {
            continue;
        };
        if let Some(rest) = resolve_property(registry, target, &words[split..]) {
            return Some(format!("{head}.{rest}"));
        }
    }
    None
}

fn resolve_ordering(
    registry: &MetadataRegistry,
    meta: &EntityMeta,
    ordering: &str,
    invalid: &dyn Fn(&str) -> QueryError,
) -> Result<Sort, QueryError> {
    let words = camel_words(ordering);
    let mut orders = Vec::new();
    let mut pending: Vec<&str> = Vec::new();
    for word in words {
        let direction = match word {
            "Asc" => Some(Direction::Asc),
            "Desc" => Some(Direction::Desc),
            _ => None,
        };
        match direction {
            Some(direction) if !pending.is_empty() => {
                orders.push(ordering_term(registry, meta, &pending, direction)?);
                pending.clear();
            }
            Some(_) => return Err(invalid("OrderBy direction without a property")),
            None => pending.push(word),
        }
    }
    if !pending.is_empty() {
        orders.push(ordering_term(registry, meta, &pending, Direction::Asc)?);
    }
    Ok(orders.into_iter().collect())
}

fn ordering_term(
    registry: &MetadataRegistry,
    meta: &EntityMeta,
    words: &[&str],
    direction: Direction,
) -> Result<Order, QueryError> {
    let field = resolve_property(registry, meta, words)
        .filter(|path| !path.contains('.'))
        .ok_or_else(|| {
            QueryError::Meta(MetaError::UnknownField {
                entity: meta.name,
                field: lower_camel(words),
            })
        })?;
    Ok(Order { field, direction })
}
