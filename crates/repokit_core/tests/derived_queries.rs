use repokit_core::{
    CrudRepository, Member, QueryArg, QueryError, QueryOutcome, RepoError, ResultShape, Store,
    Team, UnitOfWork,
};

fn seed_members(uow: &UnitOfWork<'_>, rows: &[(&str, i32)]) {
    let members = uow.members().unwrap();
    for (username, age) in rows {
        members.save(&Member::with_age(*username, *age)).unwrap();
    }
}

#[test]
fn find_by_username_and_age_greater_than() {
    let mut store = Store::open_in_memory().unwrap();
    let uow = store.begin().unwrap();
    seed_members(&uow, &[("AAA", 10), ("AAA", 20)]);

    let result = uow
        .members()
        .unwrap()
        .find_by_username_and_age_greater_than("AAA", 15)
        .unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].username, "AAA");
    assert_eq!(result[0].age, 20);
}

#[test]
fn top3_limits_in_identifier_order() {
    let mut store = Store::open_in_memory().unwrap();
    let uow = store.begin().unwrap();
    seed_members(&uow, &[("m1", 1), ("m2", 2), ("m3", 3), ("m4", 4)]);

    let names: Vec<String> = uow
        .members()
        .unwrap()
        .find_top3()
        .unwrap()
        .into_iter()
        .map(|m| m.username)
        .collect();
    assert_eq!(names, vec!["m1", "m2", "m3"]);
}

#[test]
fn single_result_shapes() {
    let mut store = Store::open_in_memory().unwrap();
    let uow = store.begin().unwrap();
    seed_members(&uow, &[("solo", 10), ("twin", 10), ("twin", 11)]);
    let members = uow.members().unwrap();

    assert_eq!(members.find_member_by_username("solo").unwrap().age, 10);
    assert!(matches!(
        members.find_member_by_username("nobody"),
        Err(RepoError::NotFound { entity: "Member", .. })
    ));
    assert!(matches!(
        members.find_member_by_username("twin"),
        Err(RepoError::NonUniqueResult { entity: "Member", .. })
    ));

    assert_eq!(members.find_optional_by_username("nobody").unwrap(), None);
    assert!(members.find_optional_by_username("solo").unwrap().is_some());
    assert!(members.find_list_by_username("nobody").unwrap().is_empty());
    assert_eq!(members.find_list_by_username("twin").unwrap().len(), 2);
}

#[test]
fn count_exists_and_collection_parameters() {
    let mut store = Store::open_in_memory().unwrap();
    let uow = store.begin().unwrap();
    seed_members(&uow, &[("a", 10), ("b", 10), ("c", 20)]);
    let members = uow.members().unwrap();

    assert_eq!(members.count_by_age(10).unwrap(), 2);
    assert!(members.exists_by_username("c").unwrap());
    assert!(!members.exists_by_username("z").unwrap());

    let found = members.find_by_usernames(["a", "c", "z"]).unwrap();
    let names: Vec<&str> = found.iter().map(|m| m.username.as_str()).collect();
    assert_eq!(names, vec!["a", "c"]);
}

#[test]
fn custom_query_and_username_projection() {
    let mut store = Store::open_in_memory().unwrap();
    let uow = store.begin().unwrap();
    seed_members(&uow, &[("AAA", 10), ("AAA", 20), ("BBB", 30)]);
    let members = uow.members().unwrap();

    let found = members.find_query_custom("AAA", 10).unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(members.usernames().unwrap(), vec!["AAA", "AAA", "BBB"]);
    assert_eq!(members.find_member_custom().unwrap().len(), 3);
}

#[test]
fn summaries_only_include_members_with_team() {
    let mut store = Store::open_in_memory().unwrap();
    let uow = store.begin().unwrap();
    let team = uow.teams().unwrap().save(&Team::new("teamA")).unwrap();
    let members = uow.members().unwrap();
    let with_team = members
        .save(&Member::with_team("AAA", 10, &team).unwrap())
        .unwrap();
    members.save(&Member::new("loner")).unwrap();

    let summaries = members.find_summaries().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].username, "AAA");
    assert_eq!(summaries[0].team_name, "teamA");
    assert_eq!(Some(summaries[0].id), repokit_core::Entity::id(&with_team));
}

#[test]
fn generic_dispatch_resolves_any_descriptor() {
    let mut store = Store::open_in_memory().unwrap();
    let uow = store.begin().unwrap();
    seed_members(&uow, &[("amy", 10), ("bob", 25), ("ann", 40)]);
    let repo = uow.repository::<Member>().unwrap();

    let found = repo
        .find_by(
            "findByUsernameStartingWithOrderByAgeDesc",
            &[QueryArg::from("a")],
        )
        .unwrap();
    let names: Vec<&str> = found.iter().map(|m| m.username.as_str()).collect();
    assert_eq!(names, vec!["ann", "amy"]);

    let between = repo
        .find_by("findByAgeBetween", &[QueryArg::from(20), QueryArg::from(40)])
        .unwrap();
    assert_eq!(between.len(), 2);

    let outcome = repo
        .derived("countByAgeGreaterThan", None, &[QueryArg::from(15)], None)
        .unwrap();
    assert!(matches!(outcome, QueryOutcome::Count(2)));
    assert_eq!(outcome.shape(), ResultShape::Count);
}

#[test]
fn resolution_is_cached_per_store() {
    let mut store = Store::open_in_memory().unwrap();
    {
        let uow = store.begin().unwrap();
        uow.members().unwrap();
    }
    let cached = store.query_cache().len();
    assert!(cached >= 14);

    let uow = store.begin().unwrap();
    uow.members().unwrap().find_by_username("x").unwrap();
    assert_eq!(uow.query_cache().len(), cached);
}

#[test]
fn undeclared_and_invalid_methods_fail() {
    let mut store = Store::open_in_memory().unwrap();
    let uow = store.begin().unwrap();
    let members = uow.members().unwrap();

    assert!(matches!(
        members.invoke("findByAgeBetween", &[], None),
        Err(RepoError::Query(QueryError::UndeclaredMethod { .. }))
    ));
    assert!(matches!(
        members.invoke("findByUsername", &[], None),
        Err(RepoError::Query(QueryError::ArgumentMismatch {
            expected: 1,
            found: 0,
            ..
        }))
    ));

    let repo = members.repository();
    assert!(matches!(
        repo.find_by("findByNickname", &[QueryArg::from("x")]),
        Err(RepoError::UnknownField { entity: "Member", ref field }) if field == "nickname"
    ));
    assert!(matches!(
        repo.find_by("removeByUsername", &[QueryArg::from("x")]),
        Err(RepoError::Query(QueryError::InvalidMethodName { .. }))
    ));
}

#[test]
fn invoke_runs_declared_methods_with_their_shapes() {
    let mut store = Store::open_in_memory().unwrap();
    let uow = store.begin().unwrap();
    seed_members(&uow, &[("amy", 10)]);
    let members = uow.members().unwrap();

    let outcome = members
        .invoke("existsByUsername", &[QueryArg::from("amy")], None)
        .unwrap();
    assert!(matches!(outcome, QueryOutcome::Exists(true)));
    assert_eq!(members.count().unwrap(), 1);
}
