//! Generic repository over any registered entity.
//!
//! # Responsibility
//! - Provide CRUD, paging, projections, bulk updates and derived-query
//!   dispatch for one entity type inside one unit of work.
//!
//! # Invariants
//! - `save` inserts when the identifier is absent and updates otherwise.
//! - Identifier, audit timestamps and version come back from storage via
//!   `RETURNING`; callers never assign them.
//! - Versioned updates only apply when the stored version still matches.
//! - Bulk updates evict the entity type from the identity map.

use super::session::{LockMode, QueryHints, UnitOfWork};
use super::{RepoError, RepoResult};
use crate::meta::{Entity, EntityEnvelope, EntityMeta, CREATED_AT_COLUMN, ID_FIELD, UPDATED_AT_COLUMN};
use crate::page::{Page, PageRequest, Slice, Sort};
use crate::query::sql::{writable_column, Projection, SqlCompiler, SqlFragment, NOW_MS_SQL, ROOT_ALIAS};
use crate::query::{CompareOp, DerivedQuery, Example, Predicate, QueryArg, QueryError, ResultShape, Value};
use log::{debug, info};
use rusqlite::types::FromSql;
use rusqlite::{params_from_iter, OptionalExtension, Row};
use std::marker::PhantomData;

/// Minimal CRUD contract shared by the generic repository and the typed
/// facades.
pub trait CrudRepository<E: Entity> {
    /// Inserts a new entity or updates a persisted one; returns the stored
    /// state.
    fn save(&self, entity: &E) -> RepoResult<E>;
    fn find_by_id(&self, id: i64) -> RepoResult<Option<E>>;
    fn find_all(&self) -> RepoResult<Vec<E>>;
    /// Deleting an already missing row is a no-op.
    fn delete(&self, entity: &E) -> RepoResult<()>;
    fn count(&self) -> RepoResult<u64>;
}

/// One column change of a bulk update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    field: String,
    change: Change,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Change {
    Set(Value),
    Increment(i64),
}

impl Assignment {
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            change: Change::Set(value.into()),
        }
    }

    pub fn increment(field: impl Into<String>, by: i64) -> Self {
        Self {
            field: field.into(),
            change: Change::Increment(by),
        }
    }
}

/// Result of a derived query, shaped per its [`ResultShape`].
#[derive(Debug, Clone)]
pub enum QueryOutcome<E> {
    List(Vec<E>),
    One(E),
    Optional(Option<E>),
    Page(Page<E>),
    Slice(Slice<E>),
    Count(u64),
    Exists(bool),
}

impl<E> QueryOutcome<E> {
    pub fn shape(&self) -> ResultShape {
        match self {
            Self::List(_) => ResultShape::List,
            Self::One(_) => ResultShape::One,
            Self::Optional(_) => ResultShape::Optional,
            Self::Page(_) => ResultShape::Page,
            Self::Slice(_) => ResultShape::Slice,
            Self::Count(_) => ResultShape::Count,
            Self::Exists(_) => ResultShape::Exists,
        }
    }
}

/// Repository for `E` bound to a unit of work.
pub struct Repository<'u, E: Entity> {
    uow: &'u UnitOfWork<'u>,
    meta: &'u EntityMeta,
    hints: QueryHints,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<'_, E> {
    fn clone(&self) -> Self {
        Self {
            uow: self.uow,
            meta: self.meta,
            hints: self.hints,
            _entity: PhantomData,
        }
    }
}

impl<'u, E: Entity> Repository<'u, E> {
    /// Fails with `UnmappedType` when `E` is not registered.
    pub fn new(uow: &'u UnitOfWork<'u>) -> RepoResult<Self> {
        let meta = uow.registry().lookup_entity::<E>()?;
        Ok(Self {
            uow,
            meta,
            hints: QueryHints::default(),
            _entity: PhantomData,
        })
    }

    /// Copy of this repository whose queries use `hints`.
    pub fn with_hints(&self, hints: QueryHints) -> Self {
        Self {
            hints,
            ..self.clone()
        }
    }

    pub fn hints(&self) -> QueryHints {
        self.hints
    }

    pub fn meta(&self) -> &'u EntityMeta {
        self.meta
    }

    pub(crate) fn uow(&self) -> &'u UnitOfWork<'u> {
        self.uow
    }

    pub fn save_all<'e, I>(&self, entities: I) -> RepoResult<Vec<E>>
    where
        I: IntoIterator<Item = &'e E>,
    {
        entities
            .into_iter()
            .map(|entity| self.save_entity(entity))
            .collect()
    }

    /// Like `find_by_id`, but a missing row is `NotFound`.
    pub fn get_by_id(&self, id: i64) -> RepoResult<E> {
        self.find_entity(id)?.ok_or_else(|| RepoError::NotFound {
            entity: E::NAME,
            key: format!("id={id}"),
        })
    }

    pub fn exists_by_id(&self, id: i64) -> RepoResult<bool> {
        if self.uow.is_tracked::<E>(id) {
            return Ok(true);
        }
        self.exists_matching(&id_equals(id))
    }

    pub fn find_all_by_ids(&self, ids: &[i64]) -> RepoResult<Vec<E>> {
        self.fetch(&Predicate::is_in(ID_FIELD, ids.iter().copied()), None, None)
    }

    pub fn find_all_sorted(&self, sort: &Sort) -> RepoResult<Vec<E>> {
        self.fetch(&Predicate::Always, Some(sort), None)
    }

    pub fn find_all_matching(&self, predicate: &Predicate) -> RepoResult<Vec<E>> {
        self.fetch(predicate, None, None)
    }

    pub fn find_all_matching_sorted(&self, predicate: &Predicate, sort: &Sort) -> RepoResult<Vec<E>> {
        self.fetch(predicate, Some(sort), None)
    }

    pub fn find_all_by_example(&self, example: &Example<E>) -> RepoResult<Vec<E>> {
        self.fetch(&example.to_predicate(), None, None)
    }

    /// At most one match; more than one is `NonUniqueResult`.
    pub fn find_one(&self, predicate: &Predicate) -> RepoResult<Option<E>> {
        let rows = self.fetch(predicate, None, Some((2, 0)))?;
        single_row(rows, "find_one")
    }

    pub fn find_all_page(&self, request: &PageRequest) -> RepoResult<Page<E>> {
        self.find_page(&Predicate::Always, request)
    }

    /// Bounded query plus a separate count query.
    pub fn find_page(&self, predicate: &Predicate, request: &PageRequest) -> RepoResult<Page<E>> {
        self.page_with(predicate, request, None)
    }

    /// Fetches one row past the window to learn `has_next`; never counts.
    pub fn find_slice(&self, predicate: &Predicate, request: &PageRequest) -> RepoResult<Slice<E>> {
        self.slice_with(predicate, request, None)
    }

    pub fn count_matching(&self, predicate: &Predicate) -> RepoResult<u64> {
        let fragment = self.compiler().select(self.meta, Projection::Count, predicate, None, None)?;
        let count: i64 = self.query_scalar(&fragment)?;
        u64::try_from(count).map_err(|_| RepoError::InvalidData(format!("negative count {count}")))
    }

    pub fn exists_matching(&self, predicate: &Predicate) -> RepoResult<bool> {
        let fragment = self.compiler().select(self.meta, Projection::Exists, predicate, None, None)?;
        self.query_scalar(&fragment)
    }

    /// Returns whether a row was deleted.
    pub fn delete_by_id(&self, id: i64) -> RepoResult<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            self.meta.table, self.meta.id_column
        );
        self.uow.record_statement();
        let changed = self.uow.conn().execute(&sql, [id])?;
        self.uow.forget::<E>(id);
        debug!(
            "event=entity_delete module=repo status=ok uow={} entity={} id={id} deleted={}",
            self.uow.tag(),
            E::NAME,
            changed > 0
        );
        Ok(changed > 0)
    }

    /// One set-based `UPDATE` over every row matching `predicate`.
    ///
    /// Refreshes `updated_at`, bumps the version column and evicts tracked
    /// entities of this type. Returns the number of affected rows.
    pub fn bulk_update(&self, predicate: &Predicate, assignments: &[Assignment]) -> RepoResult<u64> {
        if assignments.is_empty() {
            return Err(QueryError::UnsupportedOperation {
                descriptor: "bulk_update".to_string(),
                reason: "at least one assignment is required".to_string(),
            }
            .into());
        }

        let condition = self.compiler().condition(self.meta, ROOT_ALIAS, predicate)?;
        let mut sets = Vec::with_capacity(assignments.len() + 2);
        let mut binds = Vec::with_capacity(assignments.len() + condition.binds.len());
        for assignment in assignments {
            let column = writable_column(self.meta, &assignment.field)?;
            match &assignment.change {
                Change::Set(value) => {
                    sets.push(format!("{column} = ?"));
                    binds.push(value.clone());
                }
                Change::Increment(by) => {
                    sets.push(format!("{column} = {column} + ?"));
                    binds.push(Value::Integer(*by));
                }
            }
        }
        sets.push(format!("{UPDATED_AT_COLUMN} = {NOW_MS_SQL}"));
        if let Some(version) = self.meta.version_column {
            sets.push(format!("{version} = {version} + 1"));
        }
        binds.extend(condition.binds);

        let sql = format!(
            "UPDATE {} AS {ROOT_ALIAS} SET {} WHERE {}",
            self.meta.table,
            sets.join(", "),
            condition.sql
        );
        self.uow.record_statement();
        let affected = self.uow.conn().execute(&sql, params_from_iter(binds.iter()))?;
        let evicted = self.uow.evict_type(E::NAME);
        info!(
            "event=bulk_update module=repo status=ok uow={} entity={} affected={affected} evicted={evicted}",
            self.uow.tag(),
            E::NAME
        );
        Ok(affected as u64)
    }

    /// Values of one field for every matching row, in identifier order.
    pub fn select_field<T: FromSql>(&self, field: &str, predicate: &Predicate) -> RepoResult<Vec<T>> {
        let column = self
            .meta
            .column_for(field)
            .ok_or_else(|| RepoError::UnknownField {
                entity: E::NAME,
                field: field.to_string(),
            })?
            .column();
        let fragment = self
            .compiler()
            .select(self.meta, Projection::Column(column), predicate, None, None)?;
        self.uow.record_statement();
        let mut stmt = self.uow.conn().prepare(&fragment.sql)?;
        let values = stmt
            .query_map(params_from_iter(fragment.binds.iter()), |row| row.get::<_, T>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    }

    /// Resolves `descriptor` (cached per store) and runs it.
    ///
    /// `paging` is required for `Page`/`Slice` shapes and ignored otherwise.
    pub fn derived(
        &self,
        descriptor: &str,
        shape: Option<ResultShape>,
        args: &[QueryArg],
        paging: Option<&PageRequest>,
    ) -> RepoResult<QueryOutcome<E>> {
        let query = self
            .uow
            .query_cache()
            .resolve(self.uow.registry(), E::NAME, descriptor, shape)?;
        self.run_derived(&query, args, paging)
    }

    pub fn find_by(&self, descriptor: &str, args: &[QueryArg]) -> RepoResult<Vec<E>> {
        match self.derived(descriptor, Some(ResultShape::List), args, None)? {
            QueryOutcome::List(rows) => Ok(rows),
            other => Err(unexpected_shape(descriptor, &other)),
        }
    }

    pub fn find_one_by(&self, descriptor: &str, args: &[QueryArg]) -> RepoResult<E> {
        match self.derived(descriptor, Some(ResultShape::One), args, None)? {
            QueryOutcome::One(entity) => Ok(entity),
            other => Err(unexpected_shape(descriptor, &other)),
        }
    }

    pub fn find_optional_by(&self, descriptor: &str, args: &[QueryArg]) -> RepoResult<Option<E>> {
        match self.derived(descriptor, Some(ResultShape::Optional), args, None)? {
            QueryOutcome::Optional(entity) => Ok(entity),
            other => Err(unexpected_shape(descriptor, &other)),
        }
    }

    pub fn find_page_by(
        &self,
        descriptor: &str,
        args: &[QueryArg],
        request: &PageRequest,
    ) -> RepoResult<Page<E>> {
        match self.derived(descriptor, Some(ResultShape::Page), args, Some(request))? {
            QueryOutcome::Page(page) => Ok(page),
            other => Err(unexpected_shape(descriptor, &other)),
        }
    }

    pub fn find_slice_by(
        &self,
        descriptor: &str,
        args: &[QueryArg],
        request: &PageRequest,
    ) -> RepoResult<Slice<E>> {
        match self.derived(descriptor, Some(ResultShape::Slice), args, Some(request))? {
            QueryOutcome::Slice(slice) => Ok(slice),
            other => Err(unexpected_shape(descriptor, &other)),
        }
    }

    pub fn count_by(&self, descriptor: &str, args: &[QueryArg]) -> RepoResult<u64> {
        match self.derived(descriptor, Some(ResultShape::Count), args, None)? {
            QueryOutcome::Count(count) => Ok(count),
            other => Err(unexpected_shape(descriptor, &other)),
        }
    }

    pub fn exists_by(&self, descriptor: &str, args: &[QueryArg]) -> RepoResult<bool> {
        match self.derived(descriptor, Some(ResultShape::Exists), args, None)? {
            QueryOutcome::Exists(found) => Ok(found),
            other => Err(unexpected_shape(descriptor, &other)),
        }
    }

    pub(crate) fn run_derived(
        &self,
        query: &DerivedQuery,
        args: &[QueryArg],
        paging: Option<&PageRequest>,
    ) -> RepoResult<QueryOutcome<E>> {
        let predicate = query.bind(args)?;
        let sort = (!query.sort().is_unsorted()).then_some(query.sort());
        let descriptor = query.descriptor();
        let require_paging = || {
            paging.ok_or_else(|| {
                RepoError::from(QueryError::UnsupportedOperation {
                    descriptor: descriptor.to_string(),
                    reason: "a page request is required".to_string(),
                })
            })
        };

        let outcome = match query.shape() {
            ResultShape::List => {
                let window = query.limit().map(|limit| (limit, 0));
                QueryOutcome::List(self.fetch(&predicate, sort, window)?)
            }
            ResultShape::One => {
                let rows = self.fetch(&predicate, sort, Some((probe_limit(query), 0)))?;
                match single_row(rows, descriptor)? {
                    Some(entity) => QueryOutcome::One(entity),
                    None => {
                        return Err(RepoError::NotFound {
                            entity: E::NAME,
                            key: descriptor.to_string(),
                        })
                    }
                }
            }
            ResultShape::Optional => {
                let rows = self.fetch(&predicate, sort, Some((probe_limit(query), 0)))?;
                QueryOutcome::Optional(single_row(rows, descriptor)?)
            }
            ResultShape::Page => QueryOutcome::Page(self.page_with(&predicate, require_paging()?, sort)?),
            ResultShape::Slice => {
                QueryOutcome::Slice(self.slice_with(&predicate, require_paging()?, sort)?)
            }
            ResultShape::Count => QueryOutcome::Count(self.count_matching(&predicate)?),
            ResultShape::Exists => QueryOutcome::Exists(self.exists_matching(&predicate)?),
        };
        Ok(outcome)
    }

    fn save_entity(&self, entity: &E) -> RepoResult<E> {
        entity.validate()?;
        let saved = match entity.id() {
            None => self.insert(entity)?,
            Some(id) => self.update(entity, id)?,
        };
        self.uow.remember(&saved);
        Ok(saved)
    }

    fn insert(&self, entity: &E) -> RepoResult<E> {
        let (mut columns, mut binds) = self.column_values(entity);
        let mut placeholders = vec!["?".to_string(); columns.len()];
        columns.extend([CREATED_AT_COLUMN, UPDATED_AT_COLUMN]);
        placeholders.extend([NOW_MS_SQL.to_string(), NOW_MS_SQL.to_string()]);
        if let Some(version) = self.meta.version_column {
            columns.push(version);
            placeholders.push("?".to_string());
            binds.push(Value::Integer(0));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            self.meta.table,
            columns.join(", "),
            placeholders.join(", "),
            self.returning_columns()
        );
        self.uow.record_statement();
        let envelope = self
            .uow
            .conn()
            .query_row(&sql, params_from_iter(binds.iter()), |row| {
                read_envelope(self.meta, row)
            })?;

        debug!(
            "event=entity_save module=repo status=ok uow={} entity={} op=insert id={}",
            self.uow.tag(),
            E::NAME,
            envelope.id().unwrap_or_default()
        );
        Ok(with_envelope(entity, envelope))
    }

    fn update(&self, entity: &E, id: i64) -> RepoResult<E> {
        let (columns, mut binds) = self.column_values(entity);
        let mut sets: Vec<String> = columns.iter().map(|column| format!("{column} = ?")).collect();
        sets.push(format!("{UPDATED_AT_COLUMN} = {NOW_MS_SQL}"));
        let mut condition = format!("{} = ?", self.meta.id_column);
        binds.push(Value::Integer(id));
        let expected_version = entity.envelope().version();
        if let Some(version) = self.meta.version_column {
            sets.push(format!("{version} = {version} + 1"));
            condition.push_str(&format!(" AND {version} = ?"));
            binds.push(Value::Integer(expected_version));
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE {condition} RETURNING {}",
            self.meta.table,
            sets.join(", "),
            self.returning_columns()
        );
        self.uow.record_statement();
        let envelope = self
            .uow
            .conn()
            .query_row(&sql, params_from_iter(binds.iter()), |row| {
                read_envelope(self.meta, row)
            })
            .optional()?;

        match envelope {
            Some(envelope) => {
                debug!(
                    "event=entity_save module=repo status=ok uow={} entity={} op=update id={id} version={}",
                    self.uow.tag(),
                    E::NAME,
                    envelope.version()
                );
                Ok(with_envelope(entity, envelope))
            }
            None if self.meta.version_column.is_some() && self.exists_matching(&id_equals(id))? => {
                Err(RepoError::ConcurrentModification {
                    entity: E::NAME,
                    id,
                    expected_version,
                })
            }
            None => Err(RepoError::NotFound {
                entity: E::NAME,
                key: format!("id={id}"),
            }),
        }
    }

    fn find_entity(&self, id: i64) -> RepoResult<Option<E>> {
        if let Some(cached) = self.uow.cached::<E>(id) {
            return Ok(Some(cached));
        }
        Ok(self.fetch(&id_equals(id), None, Some((1, 0)))?.into_iter().next())
    }

    fn page_with(
        &self,
        predicate: &Predicate,
        request: &PageRequest,
        fallback: Option<&Sort>,
    ) -> RepoResult<Page<E>> {
        let sort = request_sort(request, fallback);
        let content = self.fetch(predicate, sort, Some((request.size(), request.offset())))?;
        let total = self.count_matching(predicate)?;
        Ok(Page::new(content, request, total))
    }

    fn slice_with(
        &self,
        predicate: &Predicate,
        request: &PageRequest,
        fallback: Option<&Sort>,
    ) -> RepoResult<Slice<E>> {
        let sort = request_sort(request, fallback);
        let probe = request.size().saturating_add(1);
        let rows = self.fetch(predicate, sort, Some((probe, request.offset())))?;
        Ok(Slice::from_probe(rows, request))
    }

    fn fetch(
        &self,
        predicate: &Predicate,
        sort: Option<&Sort>,
        window: Option<(u64, u64)>,
    ) -> RepoResult<Vec<E>> {
        let fragment = self
            .compiler()
            .select(self.meta, Projection::Entity, predicate, sort, window)?;
        if self.hints.lock == LockMode::PessimisticWrite {
            self.uow.acquire_write_lock(self.meta.table)?;
        }

        self.uow.record_statement();
        let mut stmt = self.uow.conn().prepare(&fragment.sql)?;
        let mut rows = stmt.query(params_from_iter(fragment.binds.iter()))?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            let entity = self.materialize(row)?;
            if !self.hints.read_only {
                self.uow.remember(&entity);
            }
            entities.push(entity);
        }
        Ok(entities)
    }

    fn query_scalar<T: FromSql>(&self, fragment: &SqlFragment) -> RepoResult<T> {
        self.uow.record_statement();
        let value = self
            .uow
            .conn()
            .query_row(&fragment.sql, params_from_iter(fragment.binds.iter()), |row| {
                row.get::<_, T>(0)
            })?;
        Ok(value)
    }

    fn materialize(&self, row: &Row<'_>) -> RepoResult<E> {
        let envelope = read_envelope(self.meta, row)?;
        E::from_row(row, envelope)
    }

    fn column_values(&self, entity: &E) -> (Vec<&'static str>, Vec<Value>) {
        let values = entity.values();
        self.meta
            .writable_columns()
            .into_iter()
            .map(|(name, column)| {
                let value = values
                    .iter()
                    .find(|(field, _)| *field == name)
                    .map_or(Value::Null, |(_, value)| value.clone());
                (column, value)
            })
            .unzip()
    }

    fn returning_columns(&self) -> String {
        let mut columns = vec![self.meta.id_column, CREATED_AT_COLUMN, UPDATED_AT_COLUMN];
        columns.extend(self.meta.version_column);
        columns.join(", ")
    }

    fn compiler(&self) -> SqlCompiler<'u> {
        SqlCompiler::new(self.uow.registry())
    }
}

impl<E: Entity> CrudRepository<E> for Repository<'_, E> {
    fn save(&self, entity: &E) -> RepoResult<E> {
        self.save_entity(entity)
    }

    /// Served from the identity map when the entity is already tracked.
    fn find_by_id(&self, id: i64) -> RepoResult<Option<E>> {
        self.find_entity(id)
    }

    fn find_all(&self) -> RepoResult<Vec<E>> {
        self.fetch(&Predicate::Always, None, None)
    }

    fn delete(&self, entity: &E) -> RepoResult<()> {
        let id = entity.id().ok_or(RepoError::TransientEntity(E::NAME))?;
        self.delete_by_id(id)?;
        Ok(())
    }

    fn count(&self) -> RepoResult<u64> {
        self.count_matching(&Predicate::Always)
    }
}

fn id_equals(id: i64) -> Predicate {
    Predicate::compare(ID_FIELD, CompareOp::Eq, id)
}

fn read_envelope(meta: &EntityMeta, row: &Row<'_>) -> rusqlite::Result<EntityEnvelope> {
    let id: i64 = row.get(meta.id_column)?;
    let created_at: i64 = row.get(CREATED_AT_COLUMN)?;
    let updated_at: i64 = row.get(UPDATED_AT_COLUMN)?;
    let version: i64 = match meta.version_column {
        Some(column) => row.get(column)?,
        None => 0,
    };
    Ok(EntityEnvelope::persisted(id, created_at, updated_at, version))
}

fn with_envelope<E: Entity>(entity: &E, envelope: EntityEnvelope) -> E {
    let mut saved = entity.clone();
    *saved.envelope_mut() = envelope;
    saved
}

fn single_row<E: Entity>(mut rows: Vec<E>, key: &str) -> RepoResult<Option<E>> {
    if rows.len() > 1 {
        return Err(RepoError::NonUniqueResult {
            entity: E::NAME,
            key: key.to_string(),
        });
    }
    Ok(rows.pop())
}

/// One row is enough for `First`; otherwise fetch two to detect duplicates.
fn probe_limit(query: &DerivedQuery) -> u64 {
    match query.limit() {
        Some(1) => 1,
        _ => 2,
    }
}

fn request_sort<'s>(request: &'s PageRequest, fallback: Option<&'s Sort>) -> Option<&'s Sort> {
    if request.sort().is_unsorted() {
        fallback
    } else {
        Some(request.sort())
    }
}

fn unexpected_shape<E>(descriptor: &str, outcome: &QueryOutcome<E>) -> RepoError {
    RepoError::Query(QueryError::UnsupportedOperation {
        descriptor: descriptor.to_string(),
        reason: format!("resolved to a {:?} result", outcome.shape()),
    })
}
