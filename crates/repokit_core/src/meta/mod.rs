//! Entity metadata: how a record type maps onto storage.
//!
//! # Responsibility
//! - Describe tables, identifier columns, scalar fields and relations.
//! - Resolve dotted field paths (`team.name`) through relations.
//!
//! # Invariants
//! - Metadata is immutable once registered.
//! - Relations are identifier references; the one-to-many side is always a
//!   derived lookup through the owning many-to-one column.

pub mod entity;
mod registry;

pub use entity::{Entity, EntityEnvelope, ValidationError};
pub use registry::{default_registry, MetaError, MetadataRegistry};

/// Storage type of one scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Text,
    Bool,
    /// Epoch milliseconds.
    Timestamp,
}

/// One scalar field mapped to one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

/// Relation cardinality and ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// Owning side: `column` holds the target identifier.
    ManyToOne { column: &'static str },
    /// Inverse side: derived from the target's many-to-one relation named
    /// `mapped_by`.
    OneToMany { mapped_by: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMeta {
    pub name: &'static str,
    pub target: &'static str,
    pub kind: RelationKind,
}

impl RelationMeta {
    /// Foreign-key column when this is the owning side.
    pub fn owning_column(&self) -> Option<&'static str> {
        match self.kind {
            RelationKind::ManyToOne { column } => Some(column),
            RelationKind::OneToMany { .. } => None,
        }
    }
}

/// Column names for the audit envelope shared by every entity.
pub const CREATED_AT_COLUMN: &str = "created_at";
pub const UPDATED_AT_COLUMN: &str = "updated_at";
/// Field name every entity exposes for its identifier.
pub const ID_FIELD: &str = "id";

/// Storage mapping for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMeta {
    pub name: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
    pub fields: Vec<FieldMeta>,
    pub relations: Vec<RelationMeta>,
    /// Optimistic-lock column, when versioning is enabled.
    pub version_column: Option<&'static str>,
}

/// Where a resolved field name lives in the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRef<'m> {
    Id(&'static str),
    Field(&'m FieldMeta),
    /// Foreign-key column of a many-to-one relation.
    Reference(&'m RelationMeta, &'static str),
    Audit(&'static str),
    Version(&'static str),
}

impl ColumnRef<'_> {
    pub fn column(&self) -> &'static str {
        match *self {
            Self::Id(column) | Self::Audit(column) | Self::Version(column) => column,
            Self::Field(field) => field.column,
            Self::Reference(_, column) => column,
        }
    }
}

impl EntityMeta {
    pub fn builder(name: &'static str, table: &'static str, id_column: &'static str) -> EntityMetaBuilder {
        EntityMetaBuilder {
            meta: EntityMeta {
                name,
                table,
                id_column,
                fields: Vec::new(),
                relations: Vec::new(),
                version_column: None,
            },
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationMeta> {
        self.relations.iter().find(|relation| relation.name == name)
    }

    /// Resolves a non-dotted field name to a column of this table.
    ///
    /// Accepts the identifier, scalar fields, many-to-one relation names
    /// (their foreign-key column), audit timestamps and the version column.
    pub fn column_for(&self, name: &str) -> Option<ColumnRef<'_>> {
        if name == ID_FIELD {
            return Some(ColumnRef::Id(self.id_column));
        }
        if let Some(field) = self.field(name) {
            return Some(ColumnRef::Field(field));
        }
        if let Some(relation) = self.relation(name) {
            return relation
                .owning_column()
                .map(|column| ColumnRef::Reference(relation, column));
        }
        match name {
            "created_at" | "createdAt" => Some(ColumnRef::Audit(CREATED_AT_COLUMN)),
            "updated_at" | "updatedAt" => Some(ColumnRef::Audit(UPDATED_AT_COLUMN)),
            "version" => self.version_column.map(ColumnRef::Version),
            _ => None,
        }
    }

    /// Columns written from entity values on insert/update, in field order:
    /// scalar fields first, then owning relation columns.
    pub fn writable_columns(&self) -> Vec<(&'static str, &'static str)> {
        let scalars = self.fields.iter().map(|field| (field.name, field.column));
        let references = self
            .relations
            .iter()
            .filter_map(|relation| relation.owning_column().map(|column| (relation.name, column)));
        scalars.chain(references).collect()
    }

    /// Every selected column, identifier and envelope included.
    pub fn select_columns(&self) -> Vec<&'static str> {
        let mut columns = vec![self.id_column];
        columns.extend(self.writable_columns().into_iter().map(|(_, column)| column));
        columns.push(CREATED_AT_COLUMN);
        columns.push(UPDATED_AT_COLUMN);
        if let Some(version) = self.version_column {
            columns.push(version);
        }
        columns
    }
}

/// Fluent constructor for [`EntityMeta`].
#[derive(Debug, Clone)]
pub struct EntityMetaBuilder {
    meta: EntityMeta,
}

impl EntityMetaBuilder {
    pub fn field(mut self, name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        self.meta.fields.push(FieldMeta { name, column, kind });
        self
    }

    pub fn many_to_one(mut self, name: &'static str, target: &'static str, column: &'static str) -> Self {
        self.meta.relations.push(RelationMeta {
            name,
            target,
            kind: RelationKind::ManyToOne { column },
        });
        self
    }

    pub fn one_to_many(
        mut self,
        name: &'static str,
        target: &'static str,
        mapped_by: &'static str,
    ) -> Self {
        self.meta.relations.push(RelationMeta {
            name,
            target,
            kind: RelationKind::OneToMany { mapped_by },
        });
        self
    }

    pub fn versioned(mut self, column: &'static str) -> Self {
        self.meta.version_column = Some(column);
        self
    }

    pub fn build(self) -> EntityMeta {
        self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::{ColumnRef, EntityMeta, FieldKind};

    fn member_like() -> EntityMeta {
        EntityMeta::builder("Member", "members", "member_id")
            .field("username", "username", FieldKind::Text)
            .field("age", "age", FieldKind::Integer)
            .many_to_one("team", "Team", "team_id")
            .versioned("version")
            .build()
    }

    #[test]
    fn column_for_covers_id_fields_references_and_envelope() {
        let meta = member_like();
        assert_eq!(meta.column_for("id"), Some(ColumnRef::Id("member_id")));
        assert_eq!(meta.column_for("age").map(|c| c.column()), Some("age"));
        assert_eq!(meta.column_for("team").map(|c| c.column()), Some("team_id"));
        assert_eq!(meta.column_for("createdAt").map(|c| c.column()), Some("created_at"));
        assert_eq!(meta.column_for("version").map(|c| c.column()), Some("version"));
        assert!(meta.column_for("nickname").is_none());
    }

    #[test]
    fn select_columns_put_identifier_first_and_envelope_last() {
        let meta = member_like();
        assert_eq!(
            meta.select_columns(),
            vec!["member_id", "username", "age", "team_id", "created_at", "updated_at", "version"]
        );
    }
}
