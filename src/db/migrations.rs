//! Schema upgrades for existing Kindred databases.
//!
//! `schema_meta.schema_version` holds the version a database was last brought
//! up to. [`run_migrations`] applies every step in [`MIGRATIONS`] above that
//! version, in order, each in its own transaction together with the version bump.

use rusqlite::{Connection, OptionalExtension, Transaction};

/// Version written by this build once all steps have run.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Model assumed for vectors stored before the model was recorded.
const LEGACY_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

type Step = fn(&Transaction<'_>) -> rusqlite::Result<()>;

/// `(target version, step)`, ascending.
const MIGRATIONS: &[(u32, Step)] = &[(2, record_embedding_model)];

/// Unparseable versions read as 0 so every step is retried.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let raw: String = conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| row.get(0),
    )?;
    Ok(raw.parse().unwrap_or(0))
}

/// Model name behind the stored memory embeddings, once recorded.
pub fn get_embedding_model(conn: &Connection) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'embedding_model'",
        [],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_embedding_model(conn: &Connection, model: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO schema_meta (key, value) VALUES ('embedding_model', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [model],
    )?;
    Ok(())
}

/// Bring the database up to [`CURRENT_SCHEMA_VERSION`]. Already-current and newer
/// databases are left alone.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let from = get_schema_version(conn)?;
    let pending: Vec<&(u32, Step)> = MIGRATIONS.iter().filter(|(to, _)| *to > from).collect();
    if pending.is_empty() {
        tracing::debug!(schema_version = from, "schema up to date");
        return Ok(());
    }

    for (to, step) in pending {
        let tx = conn.transaction()?;
        step(&tx)?;
        tx.execute(
            "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
            [to.to_string()],
        )?;
        tx.commit()?;
        tracing::info!(schema_version = to, "schema migrated");
    }
    Ok(())
}

/// v2: memories written by v1 were embedded with MiniLM, recorded so a model
/// change can be detected at startup.
fn record_embedding_model(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('embedding_model', ?1)",
        [LEGACY_EMBEDDING_MODEL],
    )?;
    Ok(())
}
