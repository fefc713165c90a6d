//! Member facade: declared derived queries plus hand-written queries that
//! derivation cannot express (DTO joins, bulk updates, batched team loads).
//!
//! # Invariants
//! - Every derived query in [`MEMBER_QUERIES`] is resolved when the facade
//!   is constructed; a bad descriptor fails construction.
//! - `invoke` only runs declared descriptors.

use super::entity_repo::{Assignment, CrudRepository, QueryOutcome, Repository};
use super::member_spec;
use super::session::{LockMode, QueryHints, UnitOfWork};
use super::{RepoError, RepoResult};
use crate::meta::Entity;
use crate::model::{Member, Team};
use crate::page::{Page, PageRequest, Slice};
use crate::query::{Example, Predicate, QueryArg, QueryError, ResultShape, Value};
use rusqlite::params_from_iter;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Derived queries declared for `Member`.
pub const MEMBER_QUERIES: &[(&str, ResultShape)] = &[
    ("findByUsernameAndAgeGreaterThan", ResultShape::List),
    ("findTop3HelloBy", ResultShape::List),
    ("findByUsername", ResultShape::List),
    ("findByUsernameIn", ResultShape::List),
    ("findListByUsername", ResultShape::List),
    ("findMemberByUsername", ResultShape::One),
    ("findOptionalByUsername", ResultShape::Optional),
    ("findByAge", ResultShape::Page),
    ("findSliceByAge", ResultShape::Slice),
    ("countByAge", ResultShape::Count),
    ("existsByUsername", ResultShape::Exists),
    ("findReadOnlyValueByUsername", ResultShape::One),
    ("findLockByUsername", ResultShape::List),
    ("findByTeam", ResultShape::List),
    ("findMemberEntityGraphByUsername", ResultShape::List),
];

const SUMMARY_FROM: &str = "FROM members m JOIN teams t ON t.team_id = m.team_id";

/// Member row joined with its team's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberSummary {
    pub id: i64,
    pub username: String,
    pub team_name: String,
}

/// A member together with its loaded team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberWithTeam {
    pub member: Member,
    pub team: Option<Team>,
}

pub struct MemberRepository<'u> {
    inner: Repository<'u, Member>,
}

impl<'u> MemberRepository<'u> {
    pub fn new(uow: &'u UnitOfWork<'u>) -> RepoResult<Self> {
        uow.query_cache()
            .preload(uow.registry(), Member::NAME, MEMBER_QUERIES)?;
        Ok(Self {
            inner: Repository::new(uow)?,
        })
    }

    pub fn repository(&self) -> &Repository<'u, Member> {
        &self.inner
    }

    /// Runs a declared derived query by descriptor.
    pub fn invoke(
        &self,
        descriptor: &str,
        args: &[QueryArg],
        paging: Option<&PageRequest>,
    ) -> RepoResult<QueryOutcome<Member>> {
        let (_, shape) = MEMBER_QUERIES
            .iter()
            .find(|(declared, _)| *declared == descriptor)
            .ok_or_else(|| QueryError::UndeclaredMethod {
                entity: Member::NAME,
                descriptor: descriptor.to_string(),
            })?;
        self.inner.derived(descriptor, Some(*shape), args, paging)
    }

    pub fn find_by_username_and_age_greater_than(
        &self,
        username: &str,
        age: i32,
    ) -> RepoResult<Vec<Member>> {
        self.inner.find_by(
            "findByUsernameAndAgeGreaterThan",
            &[username.into(), age.into()],
        )
    }

    /// First three members in identifier order.
    pub fn find_top3(&self) -> RepoResult<Vec<Member>> {
        self.inner.find_by("findTop3HelloBy", &[])
    }

    pub fn find_by_username(&self, username: &str) -> RepoResult<Vec<Member>> {
        self.inner.find_by("findByUsername", &[username.into()])
    }

    /// `username = ? AND age >= ?`.
    pub fn find_query_custom(&self, username: &str, age: i32) -> RepoResult<Vec<Member>> {
        self.inner
            .find_all_matching(&member_spec::username(username).and(member_spec::age_at_least(age)))
    }

    pub fn usernames(&self) -> RepoResult<Vec<String>> {
        self.inner.select_field("username", &Predicate::Always)
    }

    /// Members that belong to a team, with the team name.
    pub fn find_summaries(&self) -> RepoResult<Vec<MemberSummary>> {
        self.query_summaries(None)
    }

    pub fn find_summaries_page(&self, request: &PageRequest) -> RepoResult<Page<MemberSummary>> {
        let content = self.query_summaries(Some(request))?;
        let uow = self.inner.uow();
        uow.record_statement();
        let total: i64 = uow
            .conn()
            .query_row(&format!("SELECT COUNT(*) {SUMMARY_FROM}"), [], |row| row.get(0))?;
        let total = u64::try_from(total)
            .map_err(|_| RepoError::InvalidData(format!("negative count {total}")))?;
        Ok(Page::new(content, request, total))
    }

    pub fn find_by_usernames<I, S>(&self, names: I) -> RepoResult<Vec<Member>>
    where
        I: IntoIterator<Item = S>,
        S: Into<Value>,
    {
        self.inner
            .find_by("findByUsernameIn", &[QueryArg::list(names)])
    }

    pub fn find_list_by_username(&self, username: &str) -> RepoResult<Vec<Member>> {
        self.inner.find_by("findListByUsername", &[username.into()])
    }

    /// Exactly one member; `NotFound` or `NonUniqueResult` otherwise.
    pub fn find_member_by_username(&self, username: &str) -> RepoResult<Member> {
        self.inner
            .find_one_by("findMemberByUsername", &[username.into()])
    }

    pub fn find_optional_by_username(&self, username: &str) -> RepoResult<Option<Member>> {
        self.inner
            .find_optional_by("findOptionalByUsername", &[username.into()])
    }

    pub fn find_by_age(&self, age: i32, request: &PageRequest) -> RepoResult<Page<Member>> {
        self.inner.find_page_by("findByAge", &[age.into()], request)
    }

    pub fn find_slice_by_age(&self, age: i32, request: &PageRequest) -> RepoResult<Slice<Member>> {
        self.inner
            .find_slice_by("findSliceByAge", &[age.into()], request)
    }

    pub fn count_by_age(&self, age: i32) -> RepoResult<u64> {
        self.inner.count_by("countByAge", &[age.into()])
    }

    pub fn exists_by_username(&self, username: &str) -> RepoResult<bool> {
        self.inner.exists_by("existsByUsername", &[username.into()])
    }

    /// Adds one year to every member at least `age` old; returns the number
    /// of updated rows.
    pub fn bulk_age_plus(&self, age: i32) -> RepoResult<u64> {
        self.inner.bulk_update(
            &member_spec::age_at_least(age),
            &[Assignment::increment("age", 1)],
        )
    }

    /// Every member with its team, loading all referenced teams in one
    /// extra query.
    pub fn find_all_with_team(&self) -> RepoResult<Vec<MemberWithTeam>> {
        let members = self.inner.find_all()?;
        self.attach_teams(members)
    }

    /// Members with this username, each with its team loaded.
    pub fn find_member_entity_graph_by_username(
        &self,
        username: &str,
    ) -> RepoResult<Vec<MemberWithTeam>> {
        let members = self
            .inner
            .find_by("findMemberEntityGraphByUsername", &[username.into()])?;
        self.attach_teams(members)
    }

    /// The single matching member, not tracked in the identity map.
    pub fn find_read_only_by_username(&self, username: &str) -> RepoResult<Member> {
        self.inner
            .with_hints(QueryHints::read_only())
            .find_one_by("findReadOnlyValueByUsername", &[username.into()])
    }

    /// Matching members with the database write lock held until the unit of
    /// work ends.
    pub fn find_lock_by_username(&self, username: &str) -> RepoResult<Vec<Member>> {
        self.inner
            .with_hints(QueryHints::lock(LockMode::PessimisticWrite))
            .find_by("findLockByUsername", &[username.into()])
    }

    pub fn find_by_team(&self, team: &Team) -> RepoResult<Vec<Member>> {
        let team_id = team.id().ok_or(RepoError::TransientEntity(Team::NAME))?;
        self.inner.find_by("findByTeam", &[team_id.into()])
    }

    pub fn find_all_by_example(&self, example: &Example<Member>) -> RepoResult<Vec<Member>> {
        self.inner.find_all_by_example(example)
    }

    pub fn find_all_matching(&self, predicate: &Predicate) -> RepoResult<Vec<Member>> {
        self.inner.find_all_matching(predicate)
    }

    /// Hand-written equivalent of `find_all`.
    pub fn find_member_custom(&self) -> RepoResult<Vec<Member>> {
        self.inner.find_all_matching(&Predicate::Always)
    }

    fn attach_teams(&self, members: Vec<Member>) -> RepoResult<Vec<MemberWithTeam>> {
        let team_ids: Vec<i64> = members
            .iter()
            .filter_map(Member::team_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let teams: HashMap<i64, Team> = if team_ids.is_empty() {
            HashMap::new()
        } else {
            Repository::<Team>::new(self.inner.uow())?
                .with_hints(self.inner.hints())
                .find_all_by_ids(&team_ids)?
                .into_iter()
                .filter_map(|team| team.id().map(|id| (id, team)))
                .collect()
        };

        Ok(members
            .into_iter()
            .map(|member| {
                let team = member.team_id().and_then(|id| teams.get(&id).cloned());
                MemberWithTeam { member, team }
            })
            .collect())
    }

    fn query_summaries(&self, window: Option<&PageRequest>) -> RepoResult<Vec<MemberSummary>> {
        let mut sql = format!("SELECT m.member_id, m.username, t.name {SUMMARY_FROM} ORDER BY m.member_id");
        let mut binds = Vec::new();
        if let Some(request) = window {
            sql.push_str(" LIMIT ? OFFSET ?");
            binds.push(i64::try_from(request.size()).unwrap_or(i64::MAX));
            binds.push(i64::try_from(request.offset()).unwrap_or(i64::MAX));
        }

        let uow = self.inner.uow();
        uow.record_statement();
        let mut stmt = uow.conn().prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(binds.iter()), |row| {
                Ok(MemberSummary {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    team_name: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl CrudRepository<Member> for MemberRepository<'_> {
    fn save(&self, entity: &Member) -> RepoResult<Member> {
        self.inner.save(entity)
    }

    fn find_by_id(&self, id: i64) -> RepoResult<Option<Member>> {
        self.inner.find_by_id(id)
    }

    fn find_all(&self) -> RepoResult<Vec<Member>> {
        self.inner.find_all()
    }

    fn delete(&self, entity: &Member) -> RepoResult<()> {
        self.inner.delete(entity)
    }

    fn count(&self) -> RepoResult<u64> {
        self.inner.count()
    }
}
