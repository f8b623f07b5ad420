use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// One schema step. `MIGRATIONS[n]` moves `user_version` from `n` to `n + 1`.
struct Migration {
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "spools, locations and move records",
        sql: include_str!("schemas/schema_v1.sql"),
    },
    Migration {
        name: "weight log",
        sql: include_str!("schemas/schema_v2.sql"),
    },
];

pub const CURRENT_SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

/// Brings the registry up to `CURRENT_SCHEMA_VERSION` in a single transaction.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let found: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if found > CURRENT_SCHEMA_VERSION {
        bail!("registry schema v{found} is newer than this build understands (v{CURRENT_SCHEMA_VERSION})");
    }
    if found == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;

    for (index, step) in MIGRATIONS.iter().enumerate().skip(found.max(0) as usize) {
        let target = index + 1;
        tx.execute_batch(step.sql)
            .with_context(|| format!("migration to v{target} ({}) failed", step.name))?;
        log::info!("Registry schema migrated to v{target}: {}", step.name);
    }

    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")
}
