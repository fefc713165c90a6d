//! Member entity.
//!
//! # Invariants
//! - `username` is never blank and `age` is never negative on write.
//! - `team_id` only ever holds the identifier of a saved team.

use crate::meta::{Entity, EntityEnvelope, EntityMeta, FieldKind, ValidationError};
use crate::model::team::{Team, TeamId};
use crate::query::Value;
use crate::repo::RepoResult;
use rusqlite::Row;
use serde::Serialize;

pub type MemberId = i64;

/// A member, optionally assigned to a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    #[serde(flatten)]
    envelope: EntityEnvelope,
    pub username: String,
    pub age: i32,
    team_id: Option<TeamId>,
}

impl Member {
    /// Creates an unsaved member with age `0` and no team.
    pub fn new(username: impl Into<String>) -> Self {
        Self::with_age(username, 0)
    }

    pub fn with_age(username: impl Into<String>, age: i32) -> Self {
        Self {
            envelope: EntityEnvelope::default(),
            username: username.into(),
            age,
            team_id: None,
        }
    }

    /// Creates an unsaved member that already belongs to `team`.
    ///
    /// Fails when `team` has not been saved yet.
    pub fn with_team(
        username: impl Into<String>,
        age: i32,
        team: &Team,
    ) -> Result<Self, ValidationError> {
        let mut member = Self::with_age(username, age);
        member.change_team(team)?;
        Ok(member)
    }

    /// Moves this member to `team`.
    ///
    /// Only the owning reference changes; the team's member list is derived
    /// from storage and picks the change up after the next `save`.
    pub fn change_team(&mut self, team: &Team) -> Result<(), ValidationError> {
        let team_id = team.id().ok_or(ValidationError::TransientReference {
            entity: Self::NAME,
            relation: "team",
        })?;
        self.team_id = Some(team_id);
        Ok(())
    }

    pub fn leave_team(&mut self) {
        self.team_id = None;
    }

    pub fn team_id(&self) -> Option<TeamId> {
        self.team_id
    }

    pub fn created_at(&self) -> Option<i64> {
        self.envelope.created_at()
    }

    pub fn updated_at(&self) -> Option<i64> {
        self.envelope.updated_at()
    }

    pub fn version(&self) -> i64 {
        self.envelope.version()
    }
}

impl Entity for Member {
    const NAME: &'static str = "Member";

    fn meta() -> EntityMeta {
        EntityMeta::builder(Self::NAME, "members", "member_id")
            .field("username", "username", FieldKind::Text)
            .field("age", "age", FieldKind::Integer)
            .many_to_one("team", Team::NAME, "team_id")
            .versioned("version")
            .build()
    }

    fn envelope(&self) -> &EntityEnvelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut EntityEnvelope {
        &mut self.envelope
    }

    fn values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("username", Value::from(self.username.as_str())),
            ("age", Value::from(self.age)),
            ("team", Value::from(self.team_id)),
        ]
    }

    fn from_row(row: &Row<'_>, envelope: EntityEnvelope) -> RepoResult<Self> {
        Ok(Self {
            envelope,
            username: row.get("username")?,
            age: row.get("age")?,
            team_id: row.get("team_id")?,
        })
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.username.trim().is_empty() {
            return Err(ValidationError::BlankField {
                entity: Self::NAME,
                field: "username",
            });
        }
        if self.age < 0 {
            return Err(ValidationError::OutOfRange {
                entity: Self::NAME,
                field: "age",
                value: i64::from(self.age),
            });
        }
        Ok(())
    }
}
