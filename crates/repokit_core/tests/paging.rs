use repokit_core::{
    CrudRepository, Member, PageRequest, PageRequestError, RepoError, Sort, Store, Team,
    UnitOfWork,
};
use std::collections::BTreeSet;

fn seed_same_age(uow: &UnitOfWork<'_>) {
    let members = uow.members().unwrap();
    for name in ["member1", "member2", "member3", "member4", "member5"] {
        members.save(&Member::with_age(name, 10)).unwrap();
    }
    members.save(&Member::with_age("older", 30)).unwrap();
}

fn by_username_desc(index: u64, size: u64) -> PageRequest {
    PageRequest::of(index, size)
        .unwrap()
        .with_sort(Sort::by("username").desc())
}

#[test]
fn page_reports_totals_and_sorted_content() {
    let mut store = Store::open_in_memory().unwrap();
    let uow = store.begin().unwrap();
    seed_same_age(&uow);

    let page = uow
        .members()
        .unwrap()
        .find_by_age(10, &by_username_desc(0, 3))
        .unwrap();

    let names: Vec<&str> = page.content().iter().map(|m| m.username.as_str()).collect();
    assert_eq!(names, vec!["member5", "member4", "member3"]);
    assert_eq!(page.number_of_elements(), 3);
    assert_eq!(page.total_elements(), 5);
    assert_eq!(page.total_pages(), 2);
    assert_eq!(page.index(), 0);
    assert!(page.is_first());
    assert!(page.has_next());
    assert!(!page.has_previous());
}

#[test]
fn consecutive_pages_partition_the_result() {
    let mut store = Store::open_in_memory().unwrap();
    let uow = store.begin().unwrap();
    seed_same_age(&uow);
    let members = uow.members().unwrap();

    let first = members.find_by_age(10, &by_username_desc(0, 3)).unwrap();
    let second = members.find_by_age(10, &by_username_desc(1, 3)).unwrap();

    assert_eq!(second.number_of_elements(), 2);
    assert!(second.is_last());
    assert!(!second.has_next());

    let mut seen = BTreeSet::new();
    for member in first.content().iter().chain(second.content()) {
        assert!(seen.insert(member.username.clone()), "duplicate {}", member.username);
    }
    assert_eq!(seen.len(), 5);
}

#[test]
fn page_past_the_end_is_empty_but_keeps_totals() {
    let mut store = Store::open_in_memory().unwrap();
    let uow = store.begin().unwrap();
    seed_same_age(&uow);

    let page = uow
        .members()
        .unwrap()
        .find_by_age(10, &by_username_desc(7, 3))
        .unwrap();
    assert!(page.content().is_empty());
    assert_eq!(page.total_elements(), 5);
    assert_eq!(page.total_pages(), 2);
    assert!(!page.has_next());
}

#[test]
fn slice_probes_one_extra_row_without_counting() {
    let mut store = Store::open_in_memory().unwrap();
    let uow = store.begin().unwrap();
    seed_same_age(&uow);
    let members = uow.members().unwrap();

    let before = uow.statement_count();
    let slice = members
        .find_slice_by_age(10, &by_username_desc(0, 3))
        .unwrap();
    assert_eq!(uow.statement_count() - before, 1);
    assert_eq!(slice.number_of_elements(), 3);
    assert!(slice.has_next());

    let last = members
        .find_slice_by_age(10, &by_username_desc(1, 3))
        .unwrap();
    assert_eq!(last.number_of_elements(), 2);
    assert!(!last.has_next());
    assert!(last.has_previous());
}

#[test]
fn page_runs_content_and_count_statements() {
    let mut store = Store::open_in_memory().unwrap();
    let uow = store.begin().unwrap();
    seed_same_age(&uow);

    let before = uow.statement_count();
    uow.members()
        .unwrap()
        .find_by_age(10, &by_username_desc(0, 3))
        .unwrap();
    assert_eq!(uow.statement_count() - before, 2);
}

#[test]
fn zero_page_size_is_rejected() {
    assert_eq!(PageRequest::of(0, 0), Err(PageRequestError::ZeroSize));
    let err: RepoError = PageRequestError::ZeroSize.into();
    assert!(matches!(err, RepoError::InvalidPageRequest(_)));
}

#[test]
fn page_content_can_be_mapped() {
    let mut store = Store::open_in_memory().unwrap();
    let uow = store.begin().unwrap();
    seed_same_age(&uow);

    let page = uow
        .members()
        .unwrap()
        .find_by_age(10, &by_username_desc(0, 2))
        .unwrap()
        .map(|member| member.username);
    assert_eq!(page.content(), &["member5".to_string(), "member4".to_string()]);
    assert_eq!(page.total_pages(), 3);
}

#[test]
fn find_all_page_uses_identifier_order_when_unsorted() {
    let mut store = Store::open_in_memory().unwrap();
    let uow = store.begin().unwrap();
    seed_same_age(&uow);
    let repo = uow.repository::<Member>().unwrap();

    let page = repo.find_all_page(&PageRequest::of(1, 4).unwrap()).unwrap();
    let names: Vec<&str> = page.content().iter().map(|m| m.username.as_str()).collect();
    assert_eq!(names, vec!["member5", "older"]);
    assert_eq!(page.total_elements(), 6);
    assert_eq!(repo.count().unwrap(), 6);
}

#[test]
fn summary_page_counts_only_members_with_team() {
    let mut store = Store::open_in_memory().unwrap();
    let uow = store.begin().unwrap();
    let team = uow.teams().unwrap().save(&Team::new("teamA")).unwrap();
    let members = uow.members().unwrap();
    for name in ["a", "b", "c"] {
        members
            .save(&Member::with_team(name, 20, &team).unwrap())
            .unwrap();
    }
    members.save(&Member::new("loner")).unwrap();

    let page = members
        .find_summaries_page(&PageRequest::of(0, 2).unwrap())
        .unwrap();
    assert_eq!(page.number_of_elements(), 2);
    assert_eq!(page.total_elements(), 3);
    assert!(page.has_next());
    assert!(page.content().iter().all(|s| s.team_name == "teamA"));
}
