//! Persona visibility and grant checks.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::memory::types::{Persona, SafetyLevel, Visibility};

/// Load a persona row, defaulting malformed enum columns.
pub fn load_persona(conn: &Connection, persona_id: &str) -> Result<Option<Persona>> {
    let persona = conn
        .query_row(
            "SELECT id, name, system_prompt, visibility, owner_id, safety_level, temperature \
             FROM personas WHERE id = ?1",
            params![persona_id],
            |row| {
                Ok(Persona {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    system_prompt: row.get(2)?,
                    visibility: Visibility::from_str_lenient(&row.get::<_, String>(3)?),
                    owner_id: row.get(4)?,
                    safety_level: SafetyLevel::from_str_lenient(&row.get::<_, String>(5)?),
                    temperature: row.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(persona)
}

fn has_grant(conn: &Connection, persona_id: &str, user_id: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM persona_access WHERE persona_id = ?1 AND user_id = ?2",
            params![persona_id, user_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Whether `user_id` may chat with an already loaded persona.
pub fn can_access(conn: &Connection, user_id: &str, persona: &Persona) -> Result<bool> {
    if persona.visibility == Visibility::Public {
        return Ok(true);
    }
    if persona.owner_id.as_deref() == Some(user_id) {
        return Ok(true);
    }
    has_grant(conn, &persona.id, user_id)
}

/// Whether `user_id` may chat with `persona_id`. Unknown personas are denied.
pub fn check_persona_access(conn: &Connection, user_id: &str, persona_id: &str) -> Result<bool> {
    match load_persona(conn, persona_id)? {
        Some(persona) => can_access(conn, user_id, &persona),
        None => Ok(false),
    }
}

/// Grant a user access to a non-public persona. Idempotent.
pub fn grant_access(conn: &Connection, persona_id: &str, user_id: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO persona_access (persona_id, user_id, created_at) VALUES (?1, ?2, ?3)",
        params![persona_id, user_id, crate::db::now_timestamp()],
    )?;
    Ok(())
}
