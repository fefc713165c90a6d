//! Ordered schema scripts for the `teams` and `members` tables.
//!
//! - `0001_init`: both tables with audit columns, the nullable
//!   `members.team_id` reference and lookup indexes.
//! - `0002_member_version`: the optimistic-lock `version` column on
//!   `members` plus an `age` index for range queries.
//!
//! Pending scripts run inside one transaction, so a failing script leaves
//! the database at its previous version.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;
use std::time::Instant;

struct Script {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCRIPTS: &[Script] = &[
    Script {
        version: 1,
        name: "init",
        sql: include_str!("0001_init.sql"),
    },
    Script {
        version: 2,
        name: "member_version",
        sql: include_str!("0002_member_version.sql"),
    },
];

/// Schema version this build migrates to.
pub fn latest_version() -> u32 {
    SCRIPTS.last().map_or(0, |script| script.version)
}

/// Brings `conn` to [`latest_version`]; returns how many scripts ran.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<usize> {
    let from = current_user_version(conn)?;
    let latest = latest_version();
    if from > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: latest,
        });
    }

    let pending: Vec<&Script> = SCRIPTS.iter().filter(|s| s.version > from).collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let started_at = Instant::now();
    let tx = conn.transaction()?;
    for script in &pending {
        let wrap = |source| DbError::Migration {
            version: script.version,
            name: script.name,
            source,
        };
        tx.execute_batch(script.sql).map_err(wrap)?;
        tx.pragma_update(None, "user_version", script.version)
            .map_err(wrap)?;
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from={from} to={latest} scripts={} duration_ms={}",
        pending.len(),
        started_at.elapsed().as_millis()
    );
    Ok(pending.len())
}

/// Schema version recorded in `PRAGMA user_version`.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
