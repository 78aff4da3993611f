//! Readers for the auxiliary context blocks: shared facts, cross-persona handoff,
//! and persona lockets.

use anyhow::Result;
use chrono::{Duration, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::db::timestamp;
use crate::memory::types::{PersonaLocket, SharedFact};

/// All facts the user marked as shared with every persona, oldest first.
pub fn load_shared_facts(conn: &Connection, user_id: &str) -> Result<Vec<SharedFact>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, content, fact_type, shared_with_all FROM shared_facts \
         WHERE user_id = ?1 AND shared_with_all = 1 ORDER BY created_at, rowid",
    )?;
    let facts = stmt
        .query_map(params![user_id], |row| {
            Ok(SharedFact {
                user_id: row.get(0)?,
                content: row.get(1)?,
                fact_type: row.get(2)?,
                shared_with_all: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(facts)
}

/// Render shared facts as `[SHARED FACT - type]: content` lines. Empty when none.
pub fn shared_facts(conn: &Connection, user_id: &str) -> Result<String> {
    let facts = load_shared_facts(conn, user_id)?;
    Ok(facts
        .iter()
        .map(|f| format!("[SHARED FACT - {}]: {}", f.fact_type, f.content))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// A recent user message sent to a different persona.
#[derive(Debug, Clone, Serialize)]
pub struct HandoffEntry {
    pub persona_name: String,
    pub content: String,
    pub created_at: String,
}

/// Up to `limit` user-authored messages from the last `window` sent to personas
/// other than `current_persona_id`, newest first.
pub fn recent_handoffs(
    conn: &Connection,
    user_id: &str,
    current_persona_id: &str,
    window: Duration,
    limit: usize,
) -> Result<Vec<HandoffEntry>> {
    let cutoff = timestamp(Utc::now() - window);
    let mut stmt = conn.prepare(
        "SELECT COALESCE(p.name, m.persona_id), m.content, m.created_at \
         FROM memories m LEFT JOIN personas p ON p.id = m.persona_id \
         WHERE m.user_id = ?1 AND m.persona_id != ?2 AND m.role = 'user' AND m.created_at >= ?3 \
         ORDER BY m.created_at DESC LIMIT ?4",
    )?;
    let entries = stmt
        .query_map(
            params![user_id, current_persona_id, cutoff, limit as i64],
            |row| {
                Ok(HandoffEntry {
                    persona_name: row.get(0)?,
                    content: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

pub fn render_handoff(entries: &[HandoffEntry]) -> String {
    if entries.is_empty() {
        return String::new();
    }
    let lines = entries
        .iter()
        .map(|e| format!("- {}: User said \"{}\"", e.persona_name, e.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "[HANDOFF CONTEXT]: The user was just talking to other personas. Here's what happened recently:\n\
         {lines}\n\
         Acknowledge this context naturally if relevant to the current conversation."
    )
}

/// Render the handoff block for `current_persona_id`. Empty when nothing recent.
pub fn handoff_context(
    conn: &Connection,
    user_id: &str,
    current_persona_id: &str,
    window: Duration,
    limit: usize,
) -> Result<String> {
    let entries = recent_handoffs(conn, user_id, current_persona_id, window, limit)?;
    Ok(render_handoff(&entries))
}

/// Locket notes of one persona.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PersonaLockets {
    pub persona_id: String,
    pub lockets: Vec<PersonaLocket>,
}

impl PersonaLockets {
    pub fn lines(&self) -> Vec<String> {
        self.lockets.iter().map(|l| l.content.clone()).collect()
    }
}

/// Lockets for each persona, grouped and in the order of `persona_ids`.
pub fn lockets(conn: &Connection, persona_ids: &[String]) -> Result<Vec<PersonaLockets>> {
    let mut stmt = conn.prepare(
        "SELECT persona_id, content FROM persona_lockets WHERE persona_id = ?1 ORDER BY created_at, rowid",
    )?;

    let mut grouped = Vec::with_capacity(persona_ids.len());
    for persona_id in persona_ids {
        let lockets = stmt
            .query_map(params![persona_id], |row| {
                Ok(PersonaLocket {
                    persona_id: row.get(0)?,
                    content: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        grouped.push(PersonaLockets {
            persona_id: persona_id.clone(),
            lockets,
        });
    }
    Ok(grouped)
}
