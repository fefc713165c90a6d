//! Process-wide entity metadata registry.

use super::{ColumnRef, EntityMeta, RelationKind};
use crate::meta::entity::Entity;
use crate::model::{Member, Team};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

static DEFAULT_REGISTRY: Lazy<Result<Arc<MetadataRegistry>, MetaError>> = Lazy::new(|| {
    let mut registry = MetadataRegistry::new();
    registry.register_entity::<Team>()?;
    registry.register_entity::<Member>()?;
    registry.validate()?;
    Ok(Arc::new(registry))
});

/// Returns the registry holding the built-in `Member` and `Team` mappings.
///
/// Built once on first use; read-only afterwards.
pub fn default_registry() -> Result<Arc<MetadataRegistry>, MetaError> {
    DEFAULT_REGISTRY.clone()
}

/// Metadata registration/lookup errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaError {
    /// The type was never registered.
    UnmappedType(String),
    DuplicateType(&'static str),
    /// The entity has no field, relation or path segment with this name.
    UnknownField { entity: &'static str, field: String },
}

impl Display for MetaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnmappedType(name) => write!(f, "entity type is not mapped: {name}"),
            Self::DuplicateType(name) => write!(f, "entity type already registered: {name}"),
            Self::UnknownField { entity, field } => {
                write!(f, "entity `{entity}` has no field `{field}`")
            }
        }
    }
}

impl Error for MetaError {}

/// Registry of entity mappings keyed by entity name.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    entities: BTreeMap<&'static str, EntityMeta>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one mapping.
    pub fn register(&mut self, meta: EntityMeta) -> Result<(), MetaError> {
        if self.entities.contains_key(meta.name) {
            return Err(MetaError::DuplicateType(meta.name));
        }
        self.entities.insert(meta.name, meta);
        Ok(())
    }

    pub fn register_entity<E: Entity>(&mut self) -> Result<(), MetaError> {
        self.register(E::meta())
    }

    /// Checks that every relation points at a registered type and that
    /// inverse relations name an owning relation on their target.
    pub fn validate(&self) -> Result<(), MetaError> {
        for meta in self.entities.values() {
            for relation in &meta.relations {
                let target = self.lookup(relation.target)?;
                if let RelationKind::OneToMany { mapped_by } = relation.kind {
                    let owning = target
                        .relation(mapped_by)
                        .and_then(|owning| owning.owning_column());
                    if owning.is_none() {
                        return Err(MetaError::UnknownField {
                            entity: target.name,
                            field: mapped_by.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns the mapping for `name`.
    pub fn lookup(&self, name: &str) -> Result<&EntityMeta, MetaError> {
        self.entities
            .get(name)
            .ok_or_else(|| MetaError::UnmappedType(name.to_string()))
    }

    pub fn lookup_entity<E: Entity>(&self) -> Result<&EntityMeta, MetaError> {
        self.lookup(E::NAME)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Sorted entity names.
    pub fn entity_names(&self) -> Vec<&'static str> {
        self.entities.keys().copied().collect()
    }

    /// Resolves a dotted path (`team.name`) starting at `entity`.
    ///
    /// Returns the entity owning the final segment and its column.
    pub fn resolve_path<'r>(
        &'r self,
        entity: &str,
        path: &str,
    ) -> Result<(&'r EntityMeta, ColumnRef<'r>), MetaError> {
        let mut current = self.lookup(entity)?;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                let column = current
                    .column_for(segment)
                    .ok_or_else(|| unknown_field(current, path))?;
                return Ok((current, column));
            }
            let relation = current
                .relation(segment)
                .ok_or_else(|| unknown_field(current, path))?;
            current = self.lookup(relation.target)?;
        }
        Err(unknown_field(current, path))
    }
}

fn unknown_field(meta: &EntityMeta, path: &str) -> MetaError {
    MetaError::UnknownField {
        entity: meta.name,
        field: path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{default_registry, MetaError, MetadataRegistry};
    use crate::meta::{ColumnRef, EntityMeta, FieldKind};

    #[test]
    fn default_registry_maps_members_and_teams() {
        let registry = default_registry().expect("default registry should build");
        assert_eq!(registry.entity_names(), vec!["Member", "Team"]);
        assert_eq!(registry.lookup("Member").expect("member").table, "members");
    }

    #[test]
    fn lookup_of_unregistered_type_fails() {
        let registry = MetadataRegistry::new();
        assert_eq!(
            registry.lookup("Order").expect_err("unmapped"),
            MetaError::UnmappedType("Order".to_string())
        );
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = MetadataRegistry::new();
        let meta = EntityMeta::builder("Tag", "tags", "tag_id")
            .field("name", "name", FieldKind::Text)
            .build();
        registry.register(meta.clone()).expect("first registration");
        assert_eq!(
            registry.register(meta),
            Err(MetaError::DuplicateType("Tag"))
        );
    }

    #[test]
    fn validate_rejects_relation_to_unmapped_type() {
        let mut registry = MetadataRegistry::new();
        registry
            .register(
                EntityMeta::builder("Post", "posts", "post_id")
                    .many_to_one("author", "Author", "author_id")
                    .build(),
            )
            .expect("register post");
        assert_eq!(
            registry.validate(),
            Err(MetaError::UnmappedType("Author".to_string()))
        );
    }

    #[test]
    fn resolve_path_walks_relations() {
        let registry = default_registry().expect("default registry");
        let (owner, column) = registry
            .resolve_path("Member", "team.name")
            .expect("team.name resolves");
        assert_eq!(owner.name, "Team");
        assert_eq!(column.column(), "name");

        let (owner, column) = registry
            .resolve_path("Team", "members.age")
            .expect("members.age resolves");
        assert_eq!(owner.name, "Member");
        assert!(matches!(column, ColumnRef::Field(_)));
    }

    #[test]
    fn resolve_path_reports_unknown_segments() {
        let registry = default_registry().expect("default registry");
        let err = registry
            .resolve_path("Member", "team.motto")
            .expect_err("unknown field");
        assert_eq!(
            err,
            MetaError::UnknownField {
                entity: "Team",
                field: "team.motto".to_string(),
            }
        );
    }
}
