//! Team facade.

use super::entity_repo::{CrudRepository, Repository};
use super::session::UnitOfWork;
use super::{RepoError, RepoResult};
use crate::meta::Entity;
use crate::model::{Member, Team};
use crate::query::{CompareOp, Predicate};

pub struct TeamRepository<'u> {
    inner: Repository<'u, Team>,
}

impl<'u> TeamRepository<'u> {
    pub fn new(uow: &'u UnitOfWork<'u>) -> RepoResult<Self> {
        Ok(Self {
            inner: Repository::new(uow)?,
        })
    }

    pub fn repository(&self) -> &Repository<'u, Team> {
        &self.inner
    }

    /// Members currently pointing at `team`, in identifier order.
    ///
    /// Always read from storage, so it reflects every saved `change_team`.
    pub fn members_of(&self, team: &Team) -> RepoResult<Vec<Member>> {
        let team_id = team.id().ok_or(RepoError::TransientEntity(Team::NAME))?;
        Repository::<Member>::new(self.inner.uow())?
            .find_all_matching(&Predicate::compare("team", CompareOp::Eq, team_id))
    }
}

impl CrudRepository<Team> for TeamRepository<'_> {
    fn save(&self, entity: &Team) -> RepoResult<Team> {
        self.inner.save(entity)
    }

    fn find_by_id(&self, id: i64) -> RepoResult<Option<Team>> {
        self.inner.find_by_id(id)
    }

    fn find_all(&self) -> RepoResult<Vec<Team>> {
        self.inner.find_all()
    }

    fn delete(&self, entity: &Team) -> RepoResult<()> {
        self.inner.delete(entity)
    }

    fn count(&self) -> RepoResult<u64> {
        self.inner.count()
    }
}
