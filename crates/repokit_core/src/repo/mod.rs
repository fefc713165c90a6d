//! Repository layer: units of work, the generic entity repository and the
//! typed Member/Team facades.
//!
//! # Responsibility
//! - Translate repository operations into compiled SQL inside a unit of work.
//! - Keep SQLite details behind semantic errors.
//!
//! # Invariants
//! - Writes call `Entity::validate()` before touching storage.
//! - Optional lookups never report `NotFound`.
//! - Storage constraint failures surface as `ConstraintViolation`; every
//!   other storage failure is passed through as `Db`.

use crate::db::DbError;
use crate::meta::{MetaError, ValidationError};
use crate::page::PageRequestError;
use crate::query::QueryError;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod entity_repo;
pub mod member_repo;
pub mod member_spec;
pub mod session;
pub mod team_repo;

pub use entity_repo::{Assignment, CrudRepository, QueryOutcome, Repository};
pub use member_repo::{MemberRepository, MemberSummary, MemberWithTeam};
pub use session::{LockMode, QueryHints, Store, UnitOfWork};
pub use team_repo::TeamRepository;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository-facing error.
#[derive(Debug)]
pub enum RepoError {
    UnmappedType(String),
    UnknownField {
        entity: &'static str,
        field: String,
    },
    Query(QueryError),
    InvalidPageRequest(PageRequestError),
    Validation(ValidationError),
    /// A required row is absent; `key` names the lookup.
    NotFound {
        entity: &'static str,
        key: String,
    },
    NonUniqueResult {
        entity: &'static str,
        key: String,
    },
    /// The entity has never been saved.
    TransientEntity(&'static str),
    ConstraintViolation(String),
    /// The row changed since the entity was loaded.
    ConcurrentModification {
        entity: &'static str,
        id: i64,
        expected_version: i64,
    },
    InvalidData(String),
    Db(DbError),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnmappedType(name) => write!(f, "entity type is not mapped: {name}"),
            Self::UnknownField { entity, field } => {
                write!(f, "entity `{entity}` has no field `{field}`")
            }
            Self::Query(err) => write!(f, "{err}"),
            Self::InvalidPageRequest(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound { entity, key } => write!(f, "{entity} not found: {key}"),
            Self::NonUniqueResult { entity, key } => {
                write!(f, "more than one {entity} matched: {key}")
            }
            Self::TransientEntity(entity) => {
                write!(f, "{entity} has no identifier; save it first")
            }
            Self::ConstraintViolation(message) => write!(f, "constraint violation: {message}"),
            Self::ConcurrentModification {
                entity,
                id,
                expected_version,
            } => write!(
                f,
                "{entity} {id} was modified concurrently (expected version {expected_version})"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Query(err) => Some(err),
            Self::InvalidPageRequest(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MetaError> for RepoError {
    fn from(value: MetaError) -> Self {
        match value {
            MetaError::UnmappedType(name) => Self::UnmappedType(name),
            MetaError::UnknownField { entity, field } => Self::UnknownField { entity, field },
            MetaError::DuplicateType(name) => {
                Self::InvalidData(format!("entity type registered twice: {name}"))
            }
        }
    }
}

impl From<QueryError> for RepoError {
    fn from(value: QueryError) -> Self {
        match value {
            QueryError::Meta(err) => err.into(),
            other => Self::Query(other),
        }
    }
}

impl From<PageRequestError> for RepoError {
    fn from(value: PageRequestError) -> Self {
        Self::InvalidPageRequest(value)
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => err.into(),
            other => Self::Db(other),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        if value.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
            return Self::ConstraintViolation(value.to_string());
        }
        Self::Db(DbError::Sqlite(value))
    }
}

#[cfg(test)]
mod tests {
    use super::RepoError;
    use crate::meta::MetaError;
    use crate::query::QueryError;

    #[test]
    fn unknown_field_survives_query_wrapping() {
        let err: RepoError = QueryError::Meta(MetaError::UnknownField {
            entity: "Member",
            field: "nickname".to_string(),
        })
        .into();
        assert!(matches!(
            err,
            RepoError::UnknownField { entity: "Member", ref field } if field == "nickname"
        ));
    }

    #[test]
    fn constraint_failures_are_classified() {
        let conn = rusqlite::Connection::open_in_memory().expect("open");
        conn.execute_batch("CREATE TABLE t (v TEXT NOT NULL);")
            .expect("create");
        let err: RepoError = conn
            .execute("INSERT INTO t (v) VALUES (NULL)", [])
            .expect_err("not null")
            .into();
        assert!(matches!(err, RepoError::ConstraintViolation(_)));
    }
}
