//! repokit core: a small typed persistence and query layer over SQLite.
//!
//! Entities are described once in a metadata registry; repositories then
//! offer CRUD, composable predicates, derived queries from method names,
//! paging and projections inside explicit units of work.

pub mod config;
pub mod db;
pub mod logging;
pub mod meta;
pub mod model;
pub mod page;
pub mod query;
pub mod repo;

pub use config::{ConfigError, StoreConfig};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status, LoggingError};
pub use meta::{default_registry, Entity, EntityEnvelope, MetaError, MetadataRegistry, ValidationError};
pub use model::{Member, MemberId, Team, TeamId};
pub use page::{Direction, Order, Page, PageRequest, PageRequestError, Slice, Sort};
pub use query::{
    CompareOp, DerivedQuery, Example, Predicate, QueryArg, QueryCache, QueryError, ResultShape,
    Value,
};
pub use repo::{
    member_spec, Assignment, CrudRepository, LockMode, MemberRepository, MemberSummary,
    MemberWithTeam, QueryHints, QueryOutcome, RepoError, RepoResult, Repository, Store,
    TeamRepository, UnitOfWork,
};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
