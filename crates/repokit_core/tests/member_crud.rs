use repokit_core::{CrudRepository, Entity, Member, RepoError, Store, Team, ValidationError};

fn store() -> Store {
    Store::open_in_memory().unwrap()
}

#[test]
fn save_assigns_identifier_audit_fields_and_version() {
    let mut store = store();
    let uow = store.begin().unwrap();
    let members = uow.members().unwrap();

    let saved = members.save(&Member::with_age("memberA", 10)).unwrap();

    let id = saved.id().unwrap();
    assert!(id > 0);
    let created_at = saved.created_at().unwrap();
    assert!(created_at > 0);
    assert_eq!(saved.updated_at(), Some(created_at));
    assert_eq!(saved.version(), 0);

    let loaded = members.find_by_id(id).unwrap().unwrap();
    assert_eq!(loaded, saved);
}

#[test]
fn saving_twice_updates_the_same_row() {
    let mut store = store();
    let uow = store.begin().unwrap();
    let members = uow.members().unwrap();

    let first = members.save(&Member::with_age("memberA", 10)).unwrap();
    let mut changed = first.clone();
    changed.age = 11;
    let second = members.save(&changed).unwrap();

    assert_eq!(second.id(), first.id());
    assert_eq!(second.created_at(), first.created_at());
    assert!(second.updated_at() >= first.updated_at());
    assert_eq!(second.version(), 1);
    assert_eq!(members.count().unwrap(), 1);

    uow.clear();
    let reloaded = members.find_by_id(first.id().unwrap()).unwrap().unwrap();
    assert_eq!(reloaded.age, 11);
    assert_eq!(reloaded.version(), 1);
}

#[test]
fn repeated_lookups_are_served_from_identity_map() {
    let mut store = store();
    let id = {
        let uow = store.begin().unwrap();
        let saved = uow.members().unwrap().save(&Member::new("memberA")).unwrap();
        uow.commit().unwrap();
        saved.id().unwrap()
    };

    let uow = store.begin().unwrap();
    let members = uow.members().unwrap();
    let first = members.find_by_id(id).unwrap().unwrap();
    let statements = uow.statement_count();
    let second = members.find_by_id(id).unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(uow.statement_count(), statements);
    assert!(uow.is_tracked::<Member>(id));
}

#[test]
fn identity_map_does_not_cross_units_of_work() {
    let mut store = store();
    let id = {
        let uow = store.begin().unwrap();
        let saved = uow.members().unwrap().save(&Member::new("memberA")).unwrap();
        uow.commit().unwrap();
        saved.id().unwrap()
    };

    let uow = store.begin().unwrap();
    assert_eq!(uow.tracked_count(), 0);
    assert!(!uow.is_tracked::<Member>(id));
}

#[test]
fn optional_lookup_of_missing_row_is_none_and_get_is_not_found() {
    let mut store = store();
    let uow = store.begin().unwrap();
    let members = uow.members().unwrap();

    assert_eq!(members.find_by_id(404).unwrap(), None);
    assert!(!members.repository().exists_by_id(404).unwrap());
    assert!(matches!(
        members.repository().get_by_id(404),
        Err(RepoError::NotFound {
            entity: "Member",
            ..
        })
    ));
}

#[test]
fn find_all_by_ids_and_save_all() {
    let mut store = store();
    let uow = store.begin().unwrap();
    let repo = uow.repository::<Member>().unwrap();

    let saved = repo
        .save_all(&[Member::new("a"), Member::new("b"), Member::new("c")])
        .unwrap();
    let ids: Vec<i64> = saved.iter().map(|m| m.id().unwrap()).collect();

    let found = repo.find_all_by_ids(&[ids[2], ids[0]]).unwrap();
    let names: Vec<&str> = found.iter().map(|m| m.username.as_str()).collect();
    assert_eq!(names, vec!["a", "c"]);
}

#[test]
fn delete_removes_row_and_missing_row_is_noop() {
    let mut store = store();
    let uow = store.begin().unwrap();
    let members = uow.members().unwrap();

    let saved = members.save(&Member::new("memberA")).unwrap();
    members.delete(&saved).unwrap();
    assert_eq!(members.count().unwrap(), 0);
    assert_eq!(members.find_by_id(saved.id().unwrap()).unwrap(), None);

    members.delete(&saved).unwrap();
    assert!(!members.repository().delete_by_id(saved.id().unwrap()).unwrap());
}

#[test]
fn deleting_unsaved_entity_is_rejected() {
    let mut store = store();
    let uow = store.begin().unwrap();

    let err = uow.members().unwrap().delete(&Member::new("ghost")).unwrap_err();
    assert!(matches!(err, RepoError::TransientEntity("Member")));
}

#[test]
fn invalid_entities_are_rejected_before_storage() {
    let mut store = store();
    let uow = store.begin().unwrap();
    let members = uow.members().unwrap();

    let before = uow.statement_count();
    let err = members.save(&Member::with_age("  ", 3)).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ValidationError::BlankField {
            field: "username",
            ..
        })
    ));
    let err = members.save(&Member::with_age("memberA", -1)).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ValidationError::OutOfRange { field: "age", .. })
    ));
    assert_eq!(uow.statement_count(), before);
}

#[test]
fn unsaved_team_cannot_be_referenced() {
    let err = Member::with_team("memberA", 10, &Team::new("teamA")).unwrap_err();
    assert_eq!(
        err,
        ValidationError::TransientReference {
            entity: "Member",
            relation: "team",
        }
    );
}

#[test]
fn deleting_referenced_team_is_a_constraint_violation() {
    let mut store = store();
    let uow = store.begin().unwrap();
    let teams = uow.teams().unwrap();
    let team = teams.save(&Team::new("teamA")).unwrap();
    uow.members()
        .unwrap()
        .save(&Member::with_team("memberA", 10, &team).unwrap())
        .unwrap();

    let err = teams.delete(&team).unwrap_err();
    assert!(matches!(err, RepoError::ConstraintViolation(_)), "{err}");
}

#[test]
fn stale_version_is_a_concurrent_modification() {
    let mut store = store();
    let uow = store.begin().unwrap();
    let members = uow.members().unwrap();

    let original = members.save(&Member::with_age("memberA", 10)).unwrap();
    let mut fresh = original.clone();
    fresh.age = 20;
    members.save(&fresh).unwrap();

    let mut stale = original;
    stale.age = 30;
    let err = members.save(&stale).unwrap_err();
    assert!(matches!(
        err,
        RepoError::ConcurrentModification {
            entity: "Member",
            expected_version: 0,
            ..
        }
    ));
}

#[test]
fn updating_deleted_row_is_not_found() {
    let mut store = store();
    let uow = store.begin().unwrap();
    let teams = uow.teams().unwrap();

    let mut team = teams.save(&Team::new("teamA")).unwrap();
    teams.delete(&team).unwrap();
    team.name = "renamed".to_string();

    assert!(matches!(
        teams.save(&team),
        Err(RepoError::NotFound { entity: "Team", .. })
    ));
}

#[test]
fn change_team_moves_member_between_derived_collections() {
    let mut store = store();
    let uow = store.begin().unwrap();
    let teams = uow.teams().unwrap();
    let members = uow.members().unwrap();

    let team_a = teams.save(&Team::new("teamA")).unwrap();
    let team_b = teams.save(&Team::new("teamB")).unwrap();
    let mut member = members
        .save(&Member::with_team("member1", 10, &team_a).unwrap())
        .unwrap();
    assert_eq!(teams.members_of(&team_a).unwrap().len(), 1);

    member.change_team(&team_b).unwrap();
    let member = members.save(&member).unwrap();

    assert!(teams.members_of(&team_a).unwrap().is_empty());
    assert_eq!(teams.members_of(&team_b).unwrap(), vec![member.clone()]);
    assert_eq!(members.find_by_team(&team_b).unwrap(), vec![member]);
}

#[test]
fn member_serializes_with_flattened_envelope() {
    let mut store = store();
    let uow = store.begin().unwrap();
    let saved = uow.members().unwrap().save(&Member::with_age("m1", 7)).unwrap();

    let json = serde_json::to_value(&saved).unwrap();
    assert_eq!(json["username"], "m1");
    assert_eq!(json["age"], 7);
    assert_eq!(json["id"], saved.id().unwrap());
}

#[test]
fn unsaved_entities_always_insert_new_rows() {
    let mut store = store();
    let uow = store.begin().unwrap();
    let members = uow.members().unwrap();
    let victim = members.save(&Member::with_age("victim", 30)).unwrap();

    let other = members.save(&Member::with_age("attacker", 1)).unwrap();
    assert_ne!(other.id(), victim.id());
    assert_eq!(other.version(), 0);

    uow.clear();
    let stored = members.find_by_id(victim.id().unwrap()).unwrap().unwrap();
    assert_eq!(stored.username, "victim");
    assert_eq!(stored.age, 30);
}
