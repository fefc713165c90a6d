//! The contract a record type implements to be stored by a repository.

use super::EntityMeta;
use crate::query::Value;
use crate::repo::RepoResult;
use rusqlite::Row;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// Identity and audit fields shared by every entity.
///
/// Only the persistence layer assigns these values: `id` and `created_at`
/// on first insert, `updated_at` and `version` on every write. Entities are
/// serializable for output but never deserializable:
///
/// ```compile_fail
/// let forged: repokit_core::Member =
///     serde_json::from_str(r#"{"id":1,"version":0,"username":"x","age":0,"team_id":null}"#).unwrap();
/// ```
///
/// ```compile_fail
/// let forged: repokit_core::EntityEnvelope = serde_json::from_str(r#"{"id":1}"#).unwrap();
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityEnvelope {
    id: Option<i64>,
    created_at: Option<i64>,
    updated_at: Option<i64>,
    version: i64,
}

impl EntityEnvelope {
    pub(crate) fn persisted(id: i64, created_at: i64, updated_at: i64, version: i64) -> Self {
        Self {
            id: Some(id),
            created_at: Some(created_at),
            updated_at: Some(updated_at),
            version,
        }
    }

    /// Storage identifier; `None` until the first `save`.
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Epoch milliseconds of the first insert.
    pub fn created_at(&self) -> Option<i64> {
        self.created_at
    }

    /// Epoch milliseconds of the last write.
    pub fn updated_at(&self) -> Option<i64> {
        self.updated_at
    }

    /// Optimistic-lock version; stays `0` for unversioned entities.
    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

/// Entity-level validation failures, checked before every write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    BlankField {
        entity: &'static str,
        field: &'static str,
    },
    OutOfRange {
        entity: &'static str,
        field: &'static str,
        value: i64,
    },
    /// A relation points at an entity that was never saved.
    TransientReference {
        entity: &'static str,
        relation: &'static str,
    },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankField { entity, field } => {
                write!(f, "{entity}.{field} must not be blank")
            }
            Self::OutOfRange {
                entity,
                field,
                value,
            } => write!(f, "{entity}.{field} is out of range: {value}"),
            Self::TransientReference { entity, relation } => write!(
                f,
                "{entity}.{relation} references an entity that has not been saved"
            ),
        }
    }
}

impl Error for ValidationError {}

/// A record type a [`Repository`](crate::repo::Repository) can persist.
pub trait Entity: Clone + Debug + 'static {
    /// Registry key; must equal `meta().name`.
    const NAME: &'static str;

    fn meta() -> EntityMeta;

    fn envelope(&self) -> &EntityEnvelope;

    fn envelope_mut(&mut self) -> &mut EntityEnvelope;

    /// Values for every writable column, keyed by field/relation name.
    fn values(&self) -> Vec<(&'static str, Value)>;

    /// Builds the entity from a row selected with `meta().select_columns()`.
    fn from_row(row: &Row<'_>, envelope: EntityEnvelope) -> RepoResult<Self>;

    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    fn id(&self) -> Option<i64> {
        self.envelope().id()
    }
}
