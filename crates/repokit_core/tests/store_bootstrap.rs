use repokit_core::db::migrations::latest_version;
use repokit_core::db::{open_db, open_db_in_memory, DbError};
use repokit_core::{CrudRepository, RepoError, Store, StoreConfig, Team};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "teams");
    assert_table_exists(&conn, "members");
    assert!(column_names(&conn, "members").contains(&"version".to_string()));
}

#[test]
fn foreign_keys_are_enforced() {
    let conn = open_db_in_memory().unwrap();
    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 1);
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("repokit.db");

    let first = open_db(&path).unwrap();
    assert_eq!(schema_version(&first), latest_version());
    drop(first);

    let second = open_db(&path).unwrap();
    assert_eq!(schema_version(&second), latest_version());
}

#[test]
fn newer_schema_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = Store::open(&StoreConfig::file(&path)).err().unwrap();
    assert!(matches!(
        err,
        RepoError::Db(DbError::UnsupportedSchemaVersion { .. })
    ));
}

#[test]
fn committed_work_survives_reopen_and_dropped_work_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::file(dir.path().join("store.db"));

    {
        let mut store = Store::open(&config).unwrap();
        let uow = store.begin().unwrap();
        uow.teams().unwrap().save(&Team::new("kept")).unwrap();
        uow.commit().unwrap();

        let uow = store.begin().unwrap();
        uow.teams().unwrap().save(&Team::new("dropped")).unwrap();
        drop(uow);
    }

    let mut store = Store::open(&config).unwrap();
    let uow = store.begin().unwrap();
    let names: Vec<String> = uow
        .teams()
        .unwrap()
        .find_all()
        .unwrap()
        .into_iter()
        .map(|team| team.name)
        .collect();
    assert_eq!(names, vec!["kept".to_string()]);
}

#[test]
fn explicit_rollback_discards_writes() {
    let mut store = Store::open_in_memory().unwrap();
    let uow = store.begin_immediate().unwrap();
    uow.teams().unwrap().save(&Team::new("gone")).unwrap();
    uow.rollback().unwrap();

    let uow = store.begin().unwrap();
    assert_eq!(uow.teams().unwrap().count().unwrap(), 0);
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn column_names(conn: &Connection, table: &str) -> Vec<String> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table});"))
        .unwrap();
    stmt.query_map([], |row| row.get::<_, String>(1))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
