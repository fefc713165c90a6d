//! Store handle and units of work.
//!
//! # Responsibility
//! - Own the SQLite connection together with the metadata registry and the
//!   derived-query cache.
//! - Scope repository work to a transaction with a per-transaction identity
//!   map.
//!
//! # Invariants
//! - A unit of work that is dropped without `commit()` rolls back.
//! - Identity-map entries never outlive their unit of work.
//! - Every statement issued through a unit of work is counted.

use super::entity_repo::Repository;
use super::member_repo::MemberRepository;
use super::team_repo::TeamRepository;
use super::RepoResult;
use crate::config::StoreConfig;
use crate::db::{open_db_with, DbTarget, OpenOptions};
use crate::meta::{default_registry, Entity, MetadataRegistry};
use crate::query::QueryCache;
use log::{debug, info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Lock requested for the rows a query reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockMode {
    #[default]
    None,
    /// Take the database write lock before reading; held until the unit of
    /// work ends.
    PessimisticWrite,
}

/// Per-repository query hints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryHints {
    /// Results are returned without being tracked in the identity map.
    pub read_only: bool,
    pub lock: LockMode,
}

impl QueryHints {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    pub fn lock(mode: LockMode) -> Self {
        Self {
            lock: mode,
            ..Self::default()
        }
    }
}

/// An open, migrated database plus shared query metadata.
pub struct Store {
    conn: Connection,
    registry: Arc<MetadataRegistry>,
    queries: Arc<QueryCache>,
}

impl Store {
    pub fn open(config: &StoreConfig) -> RepoResult<Self> {
        Self::open_target(&config.target(), &config.open_options())
    }

    pub fn open_in_memory() -> RepoResult<Self> {
        Self::open_target(&DbTarget::Memory, &OpenOptions::default())
    }

    pub fn open_target(target: &DbTarget, options: &OpenOptions) -> RepoResult<Self> {
        let conn = open_db_with(target, options)?;
        Self::with_registry(conn, default_registry()?)
    }

    /// Wraps an already migrated connection.
    pub fn with_registry(conn: Connection, registry: Arc<MetadataRegistry>) -> RepoResult<Self> {
        Ok(Self {
            conn,
            registry,
            queries: Arc::new(QueryCache::new()),
        })
    }

    /// Starts a deferred transaction.
    pub fn begin(&mut self) -> RepoResult<UnitOfWork<'_>> {
        self.begin_with(TransactionBehavior::Deferred)
    }

    /// Starts a transaction that holds the write lock from the outset.
    pub fn begin_immediate(&mut self) -> RepoResult<UnitOfWork<'_>> {
        self.begin_with(TransactionBehavior::Immediate)
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn query_cache(&self) -> &QueryCache {
        &self.queries
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn begin_with(&mut self, behavior: TransactionBehavior) -> RepoResult<UnitOfWork<'_>> {
        let tx = self.conn.transaction_with_behavior(behavior)?;
        let tag = Uuid::new_v4();
        debug!(
            "event=uow_begin module=repo status=ok uow={tag} immediate={}",
            matches!(behavior, TransactionBehavior::Immediate)
        );
        Ok(UnitOfWork {
            tx,
            registry: Arc::clone(&self.registry),
            queries: Arc::clone(&self.queries),
            identity: RefCell::new(HashMap::new()),
            statements: Cell::new(0),
            write_locked: Cell::new(matches!(behavior, TransactionBehavior::Immediate)),
            tag,
            started_at: Instant::now(),
        })
    }
}

type IdentityKey = (&'static str, i64);

/// One transaction plus its identity map.
pub struct UnitOfWork<'s> {
    tx: Transaction<'s>,
    registry: Arc<MetadataRegistry>,
    queries: Arc<QueryCache>,
    identity: RefCell<HashMap<IdentityKey, Box<dyn Any>>>,
    statements: Cell<u64>,
    write_locked: Cell<bool>,
    tag: Uuid,
    started_at: Instant,
}

impl<'s> UnitOfWork<'s> {
    pub fn repository<E: Entity>(&self) -> RepoResult<Repository<'_, E>> {
        Repository::new(self)
    }

    pub fn members(&self) -> RepoResult<MemberRepository<'_>> {
        MemberRepository::new(self)
    }

    pub fn teams(&self) -> RepoResult<TeamRepository<'_>> {
        TeamRepository::new(self)
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    pub fn query_cache(&self) -> &QueryCache {
        &self.queries
    }

    /// Correlation tag used in log events.
    pub fn tag(&self) -> Uuid {
        self.tag
    }

    /// Statements executed so far in this unit of work.
    pub fn statement_count(&self) -> u64 {
        self.statements.get()
    }

    /// Number of entities currently tracked by the identity map.
    pub fn tracked_count(&self) -> usize {
        self.identity.borrow().len()
    }

    pub fn is_tracked<E: Entity>(&self, id: i64) -> bool {
        self.identity.borrow().contains_key(&(E::NAME, id))
    }

    /// Drops every identity-map entry; later lookups go to storage.
    pub fn clear(&self) {
        self.identity.borrow_mut().clear();
    }

    pub fn commit(self) -> RepoResult<()> {
        let tag = self.tag;
        let statements = self.statements.get();
        let started_at = self.started_at;
        match self.tx.commit() {
            Ok(()) => {
                info!(
                    "event=uow_commit module=repo status=ok uow={tag} statements={statements} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    "event=uow_commit module=repo status=error uow={tag} statements={statements} error={err}"
                );
                Err(err.into())
            }
        }
    }

    pub fn rollback(self) -> RepoResult<()> {
        let tag = self.tag;
        self.tx.rollback()?;
        info!("event=uow_rollback module=repo status=ok uow={tag}");
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.tx
    }

    pub(crate) fn record_statement(&self) {
        self.statements.set(self.statements.get() + 1);
    }

    /// Takes the database write lock once per unit of work.
    pub(crate) fn acquire_write_lock(&self, table: &str) -> RepoResult<()> {
        if self.write_locked.get() {
            return Ok(());
        }
        self.record_statement();
        self.tx
            .execute(&format!("UPDATE {table} SET rowid = rowid WHERE 0"), [])?;
        self.write_locked.set(true);
        debug!(
            "event=uow_lock module=repo status=ok uow={} mode=pessimistic_write table={table}",
            self.tag
        );
        Ok(())
    }

    pub(crate) fn cached<E: Entity>(&self, id: i64) -> Option<E> {
        self.identity
            .borrow()
            .get(&(E::NAME, id))
            .and_then(|entry| entry.downcast_ref::<E>())
            .cloned()
    }

    pub(crate) fn remember<E: Entity>(&self, entity: &E) {
        if let Some(id) = entity.id() {
            self.identity
                .borrow_mut()
                .insert((E::NAME, id), Box::new(entity.clone()));
        }
    }

    pub(crate) fn forget<E: Entity>(&self, id: i64) {
        self.identity.borrow_mut().remove(&(E::NAME, id));
    }

    pub(crate) fn evict_type(&self, entity: &'static str) -> usize {
        let mut identity = self.identity.borrow_mut();
        let before = identity.len();
        identity.retain(|(name, _), _| *name != entity);
        before - identity.len()
    }
}
