//! SQL DDL for all Kindred tables.
//!
//! Defines `personas`, `persona_access`, `memories`, `shared_facts`,
//! `persona_lockets`, `user_limits`, and `schema_meta`. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Persona definitions (written by the persona editor, read-only here)
CREATE TABLE IF NOT EXISTS personas (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    system_prompt TEXT NOT NULL DEFAULT '',
    visibility TEXT NOT NULL DEFAULT 'PRIVATE',
    owner_id TEXT,
    safety_level TEXT NOT NULL DEFAULT 'ADULT',
    temperature REAL
);

CREATE INDEX IF NOT EXISTS idx_personas_owner ON personas(owner_id);

-- Explicit grants for non-public personas
CREATE TABLE IF NOT EXISTS persona_access (
    persona_id TEXT NOT NULL REFERENCES personas(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (persona_id, user_id)
);

-- One row per conversational turn
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    persona_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    embedding BLOB,
    domain TEXT NOT NULL DEFAULT 'personal',
    tags TEXT NOT NULL DEFAULT '[]',
    emotion TEXT NOT NULL DEFAULT 'neutral',
    importance INTEGER NOT NULL DEFAULT 5 CHECK(importance >= 1 AND importance <= 10),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_pair ON memories(user_id, persona_id);
CREATE INDEX IF NOT EXISTS idx_memories_user_time ON memories(user_id, created_at);

-- Facts the user exposed to every persona
CREATE TABLE IF NOT EXISTS shared_facts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    content TEXT NOT NULL,
    fact_type TEXT NOT NULL,
    shared_with_all INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_shared_facts_user ON shared_facts(user_id);

-- Persistent notes injected into a persona's context
CREATE TABLE IF NOT EXISTS persona_lockets (
    id TEXT PRIMARY KEY,
    persona_id TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_lockets_persona ON persona_lockets(persona_id);

-- Per-user daily quota
CREATE TABLE IF NOT EXISTS user_limits (
    user_id TEXT PRIMARY KEY,
    requests_today INTEGER NOT NULL DEFAULT 0,
    max_requests_per_day INTEGER NOT NULL DEFAULT 50,
    is_premium INTEGER NOT NULL DEFAULT 0
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "memories",
            "persona_access",
            "persona_lockets",
            "personas",
            "schema_meta",
            "shared_facts",
            "user_limits",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }

        // sqlite-vec scalar functions are available on every connection
        let version: String = conn
            .query_row("SELECT vec_version()", [], |r| r.get(0))
            .unwrap();
        assert!(!version.is_empty());
    }

    #[test]
    fn schema_is_idempotent() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error
    }

    #[test]
    fn importance_out_of_range_is_rejected() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO memories (id, user_id, persona_id, role, content, importance, created_at) \
             VALUES ('m1', 'u1', 'p1', 'user', 'hi', 11, '2025-01-01T00:00:00.000000Z')",
            [],
        );
        assert!(result.is_err());
    }
}
