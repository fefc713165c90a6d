//! Predicate-to-SQL compilation for the SQLite storage boundary.
//!
//! # Responsibility
//! - Validate every referenced field against the metadata registry.
//! - Emit SQL text with positional `?` placeholders plus bind values.
//!
//! # Invariants
//! - Values are always bound, never spliced into SQL text.
//! - Joins compile to correlated `EXISTS` subqueries, so filtering through
//!   a relation never duplicates or reorders root rows.
//! - Ordering always ends with the identifier, making row order total.

use super::predicate::{CompareOp, Predicate};
use super::value::Value;
use crate::meta::{ColumnRef, EntityMeta, MetaError, MetadataRegistry, RelationKind};
use crate::page::{Direction, Sort};

/// Epoch-milliseconds expression evaluated by storage.
pub(crate) const NOW_MS_SQL: &str = "CAST((julianday('now') - 2440587.5) * 86400000.0 AS INTEGER)";

/// Alias of the root table in every compiled statement.
pub(crate) const ROOT_ALIAS: &str = "t0";

/// SQL text plus the values bound to its placeholders, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SqlFragment {
    pub sql: String,
    pub binds: Vec<Value>,
}

impl SqlFragment {
    fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn bind(&mut self, value: Value) {
        self.sql.push('?');
        self.binds.push(value);
    }
}

/// What a compiled select returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Projection {
    Entity,
    Count,
    Exists,
    Column(&'static str),
}

/// Compiles predicates, orderings and statements for one registry.
pub(crate) struct SqlCompiler<'r> {
    registry: &'r MetadataRegistry,
    next_alias: usize,
}

impl<'r> SqlCompiler<'r> {
    pub(crate) fn new(registry: &'r MetadataRegistry) -> Self {
        Self {
            registry,
            next_alias: 1,
        }
    }

    /// Compiles `predicate` into a boolean SQL expression over `alias`.
    pub(crate) fn condition(
        &mut self,
        meta: &EntityMeta,
        alias: &str,
        predicate: &Predicate,
    ) -> Result<SqlFragment, MetaError> {
        let mut out = SqlFragment::default();
        self.compile(meta, alias, predicate, &mut out)?;
        Ok(out)
    }

    /// Builds a full `SELECT` for `meta` filtered by `predicate`.
    pub(crate) fn select(
        &mut self,
        meta: &EntityMeta,
        projection: Projection,
        predicate: &Predicate,
        sort: Option<&Sort>,
        window: Option<(u64, u64)>,
    ) -> Result<SqlFragment, MetaError> {
        let condition = self.condition(meta, ROOT_ALIAS, predicate)?;
        let mut out = SqlFragment::default();

        let from_where = format!(
            "FROM {table} {ROOT_ALIAS} WHERE {condition}",
            table = meta.table,
            condition = condition.sql
        );
        match projection {
            Projection::Entity => {
                let columns = meta
                    .select_columns()
                    .into_iter()
                    .map(|column| format!("{ROOT_ALIAS}.{column} AS {column}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push(&format!("SELECT {columns} {from_where}"));
            }
            Projection::Column(column) => {
                out.push(&format!("SELECT {ROOT_ALIAS}.{column} {from_where}"));
            }
            Projection::Count => out.push(&format!("SELECT COUNT(*) {from_where}")),
            Projection::Exists => out.push(&format!("SELECT EXISTS(SELECT 1 {from_where})")),
        }
        out.binds = condition.binds;

        if matches!(projection, Projection::Entity | Projection::Column(_)) {
            out.push(&format!(" ORDER BY {}", self.order_by(meta, ROOT_ALIAS, sort)?));
            if let Some((limit, offset)) = window {
                out.push(" LIMIT ");
                out.bind(Value::Integer(clamp_i64(limit)));
                out.push(" OFFSET ");
                out.bind(Value::Integer(clamp_i64(offset)));
            }
        }
        Ok(out)
    }

    /// `ORDER BY` list for `sort`, always terminated by the identifier.
    pub(crate) fn order_by(
        &self,
        meta: &EntityMeta,
        alias: &str,
        sort: Option<&Sort>,
    ) -> Result<String, MetaError> {
        let mut parts = Vec::new();
        let mut has_id = false;
        for order in sort.map(Sort::orders).unwrap_or_default() {
            let column = meta
                .column_for(&order.field)
                .ok_or_else(|| MetaError::UnknownField {
                    entity: meta.name,
                    field: order.field.clone(),
                })?;
            has_id |= matches!(column, ColumnRef::Id(_));
            let direction = match order.direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            parts.push(format!("{alias}.{} {direction}", column.column()));
        }
        if !has_id {
            parts.push(format!("{alias}.{} ASC", meta.id_column));
        }
        Ok(parts.join(", "))
    }

    fn compile(
        &mut self,
        meta: &EntityMeta,
        alias: &str,
        predicate: &Predicate,
        out: &mut SqlFragment,
    ) -> Result<(), MetaError> {
        if let Some(field) = predicate.leaf_field() {
            if let Some((relation, rest)) = field.split_once('.') {
                let inner = predicate.with_field(rest);
                return self.compile_join(meta, alias, relation, None, &inner, out);
            }
        }

        match predicate {
            Predicate::Always => out.push("1 = 1"),
            Predicate::Compare { field, op, value } => {
                let column = self.column(meta, alias, field)?;
                match (op, value) {
                    (CompareOp::Eq, Value::Null) => out.push(&format!("{column} IS NULL")),
                    (CompareOp::Ne, Value::Null) => out.push(&format!("{column} IS NOT NULL")),
                    _ => {
                        out.push(&format!("{column} {} ", op.sql()));
                        out.bind(value.clone());
                    }
                }
            }
            Predicate::Between { field, low, high } => {
                let column = self.column(meta, alias, field)?;
                out.push(&format!("{column} BETWEEN "));
                out.bind(low.clone());
                out.push(" AND ");
                out.bind(high.clone());
            }
            Predicate::In {
                field,
                values,
                negated,
            } => {
                let column = self.column(meta, alias, field)?;
                if values.is_empty() {
                    out.push(if *negated { "1 = 1" } else { "1 = 0" });
                } else {
                    let keyword = if *negated { "NOT IN" } else { "IN" };
                    out.push(&format!("{column} {keyword} ("));
                    for (index, value) in values.iter().enumerate() {
                        if index > 0 {
                            out.push(", ");
                        }
                        out.bind(value.clone());
                    }
                    out.push(")");
                }
            }
            Predicate::Null { field, negated } => {
                let column = self.column(meta, alias, field)?;
                let keyword = if *negated { "IS NOT NULL" } else { "IS NULL" };
                out.push(&format!("{column} {keyword}"));
            }
            Predicate::Like {
                field,
                pattern,
                negated,
            } => {
                let column = self.column(meta, alias, field)?;
                let keyword = if *negated { "NOT LIKE" } else { "LIKE" };
                out.push(&format!("{column} {keyword} "));
                out.bind(Value::Text(pattern.clone()));
                out.push(" ESCAPE '\\'");
            }
            Predicate::Join {
                relation,
                related,
                filter,
            } => {
                self.compile_join(meta, alias, relation, Some(related), filter, out)?;
            }
            Predicate::And(left, right) => self.compile_binary(meta, alias, left, "AND", right, out)?,
            Predicate::Or(left, right) => self.compile_binary(meta, alias, left, "OR", right, out)?,
            Predicate::Not(inner) => {
                out.push("NOT (");
                self.compile(meta, alias, inner, out)?;
                out.push(")");
            }
        }
        Ok(())
    }

    fn compile_binary(
        &mut self,
        meta: &EntityMeta,
        alias: &str,
        left: &Predicate,
        keyword: &str,
        right: &Predicate,
        out: &mut SqlFragment,
    ) -> Result<(), MetaError> {
        out.push("(");
        self.compile(meta, alias, left, out)?;
        out.push(&format!(" {keyword} "));
        self.compile(meta, alias, right, out)?;
        out.push(")");
        Ok(())
    }

    fn compile_join(
        &mut self,
        meta: &EntityMeta,
        alias: &str,
        relation_name: &str,
        related: Option<&str>,
        filter: &Predicate,
        out: &mut SqlFragment,
    ) -> Result<(), MetaError> {
        let relation = meta
            .relation(relation_name)
            .ok_or_else(|| MetaError::UnknownField {
                entity: meta.name,
                field: relation_name.to_string(),
            })?;
        let registry = self.registry;
        if let Some(related) = related {
            let expected = registry.lookup(related)?;
            if expected.name != relation.target {
                return Err(MetaError::UnknownField {
                    entity: meta.name,
                    field: format!("{relation_name} -> {related}"),
                });
            }
        }
        let target = registry.lookup(relation.target)?;
        let join_alias = format!("j{}", self.next_alias);
        self.next_alias += 1;

        let link = match relation.kind {
            RelationKind::ManyToOne { column } => {
                format!("{join_alias}.{} = {alias}.{column}", target.id_column)
            }
            RelationKind::OneToMany { mapped_by } => {
                let owning = target
                    .relation(mapped_by)
                    .and_then(|owning| owning.owning_column())
                    .ok_or_else(|| MetaError::UnknownField {
                        entity: target.name,
                        field: mapped_by.to_string(),
                    })?;
                format!("{join_alias}.{owning} = {alias}.{}", meta.id_column)
            }
        };

        out.push(&format!(
            "EXISTS (SELECT 1 FROM {} {join_alias} WHERE {link}",
            target.table
        ));
        if !filter.is_always() {
            out.push(" AND (");
            self.compile(target, &join_alias, filter, out)?;
            out.push(")");
        }
        out.push(")");
        Ok(())
    }

    fn column(&self, meta: &EntityMeta, alias: &str, field: &str) -> Result<String, MetaError> {
        let column = meta
            .column_for(field)
            .ok_or_else(|| MetaError::UnknownField {
                entity: meta.name,
                field: field.to_string(),
            })?;
        Ok(format!("{alias}.{}", column.column()))
    }
}

/// Resolves a writable field to its bare column name.
pub(crate) fn writable_column(meta: &EntityMeta, field: &str) -> Result<&'static str, MetaError> {
    match meta.column_for(field) {
        Some(ColumnRef::Field(found)) => Ok(found.column),
        Some(ColumnRef::Reference(_, column)) => Ok(column),
        _ => Err(MetaError::UnknownField {
            entity: meta.name,
            field: field.to_string(),
        }),
    }
}

/// Escapes `%`, `_` and `\` for use inside a `LIKE ... ESCAPE '\'` pattern.
pub(crate) fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
