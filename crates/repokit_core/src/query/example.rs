//! Query by example: a probe entity whose populated fields become equality
//! criteria.

use super::predicate::Predicate;
use super::value::Value;
use crate::meta::{Entity, ID_FIELD};
use std::collections::BTreeSet;
use std::marker::PhantomData;

/// Equality criteria taken from a probe of `E`.
///
/// Null and empty-text values are skipped, as are ignored paths. Related
/// probes contribute dotted paths (`team.name`).
#[derive(Debug, Clone)]
pub struct Example<E: Entity> {
    values: Vec<(String, Value)>,
    ignored: BTreeSet<String>,
    _entity: PhantomData<E>,
}

impl<E: Entity> Example<E> {
    pub fn of(probe: &E) -> Self {
        Self {
            values: probe_values(probe, None),
            ignored: BTreeSet::new(),
            _entity: PhantomData,
        }
    }

    /// Adds criteria on the entity behind `relation`, replacing any
    /// foreign-key criterion the root probe carried for it.
    pub fn with_related<R: Entity>(mut self, relation: &str, probe: &R) -> Self {
        self.values.retain(|(path, _)| path != relation);
        self.values.extend(probe_values(probe, Some(relation)));
        self
    }

    pub fn ignoring<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored.extend(paths.into_iter().map(Into::into));
        self
    }

    /// AND of the remaining criteria; `Always` when nothing is set.
    pub fn to_predicate(&self) -> Predicate {
        Predicate::all(
            self.values
                .iter()
                .filter(|(path, _)| !self.ignored.contains(path))
                .map(|(path, value)| Predicate::equals(path.clone(), value.clone())),
        )
    }
}

fn probe_values<P: Entity>(probe: &P, prefix: Option<&str>) -> Vec<(String, Value)> {
    let path = |name: &str| match prefix {
        Some(prefix) => format!("{prefix}.{name}"),
        None => name.to_string(),
    };
    let mut values = Vec::new();
    if let Some(id) = probe.id() {
        values.push((path(ID_FIELD), Value::Integer(id)));
    }
    values.extend(
        probe
            .values()
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, value)| (path(name), value)),
    );
    values
}
