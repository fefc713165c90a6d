//! Team entity.

use crate::meta::{Entity, EntityEnvelope, EntityMeta, FieldKind, ValidationError};
use crate::query::Value;
use crate::repo::RepoResult;
use rusqlite::Row;
use serde::Serialize;

pub type TeamId = i64;

/// A named team. Its members are the members whose `team_id` points here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Team {
    #[serde(flatten)]
    envelope: EntityEnvelope,
    pub name: String,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            envelope: EntityEnvelope::default(),
            name: name.into(),
        }
    }

    pub fn created_at(&self) -> Option<i64> {
        self.envelope.created_at()
    }

    pub fn updated_at(&self) -> Option<i64> {
        self.envelope.updated_at()
    }
}

impl Entity for Team {
    const NAME: &'static str = "Team";

    fn meta() -> EntityMeta {
        EntityMeta::builder(Self::NAME, "teams", "team_id")
            .field("name", "name", FieldKind::Text)
            .one_to_many("members", "Member", "team")
            .build()
    }

    fn envelope(&self) -> &EntityEnvelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut EntityEnvelope {
        &mut self.envelope
    }

    fn values(&self) -> Vec<(&'static str, Value)> {
        vec![("name", Value::from(self.name.as_str()))]
    }

    fn from_row(row: &Row<'_>, envelope: EntityEnvelope) -> RepoResult<Self> {
        Ok(Self {
            envelope,
            name: row.get("name")?,
        })
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::BlankField {
                entity: Self::NAME,
                field: "name",
            });
        }
        Ok(())
    }
}
