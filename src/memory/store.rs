//! Write path: persisting completed turns into `memories`.
//!
//! [`store_turn`] is the entry point used after the model replies. It writes the
//! reply's shared facts plus one user row and one assistant row per active persona
//! inside a single transaction, so a partially recorded exchange is never visible.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::db::timestamp;
use crate::embedding::{is_usable_embedding, EMBEDDING_DIM};
use crate::memory::facts::{self, FactCommand};
use crate::memory::signals::MessageSignals;
use crate::memory::types::{Domain, Emotion, Memory, Role};
use crate::memory::{bytes_to_embedding, embedding_to_bytes};

/// Importance assigned to assistant turns.
pub const ASSISTANT_IMPORTANCE: u8 = 3;

/// One row to insert into `memories`.
#[derive(Debug, Clone)]
pub struct NewMemory<'a> {
    pub user_id: &'a str,
    pub persona_id: &'a str,
    pub role: Role,
    pub content: &'a str,
    pub embedding: Option<&'a [f32]>,
    pub domain: Domain,
    pub tags: &'a [String],
    pub emotion: Emotion,
    pub importance: u8,
}

/// A finished exchange to persist for every persona that took part.
#[derive(Debug, Clone)]
pub struct TurnRecord<'a> {
    pub user_id: &'a str,
    pub persona_ids: &'a [String],
    pub user_message: &'a str,
    pub assistant_reply: &'a str,
    /// Embedding of `user_message`, if one was generated for this turn.
    pub embedding: Option<&'a [f32]>,
    /// `[SAVE_FACT]` commands extracted from the reply.
    pub facts: &'a [FactCommand],
}

/// Result of [`store_turn`].
#[derive(Debug, Serialize)]
pub struct StoredTurn {
    /// IDs of every inserted row, user row first for each persona.
    pub memory_ids: Vec<String>,
    pub fact_ids: Vec<String>,
    pub domain: Domain,
    pub importance: u8,
}

/// Insert a single memory row with an explicit creation time. Returns its id.
pub fn insert_memory(conn: &Connection, memory: &NewMemory<'_>, created_at: DateTime<Utc>) -> Result<String> {
    let id = uuid::Uuid::now_v7().to_string();
    let embedding_bytes = memory.embedding.map(embedding_to_bytes);
    let tags_json = serde_json::to_string(memory.tags)?;

    conn.execute(
        "INSERT INTO memories (id, user_id, persona_id, role, content, embedding, domain, tags, emotion, importance, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            id,
            memory.user_id,
            memory.persona_id,
            memory.role.as_str(),
            memory.content,
            embedding_bytes,
            memory.domain.as_str(),
            tags_json,
            memory.emotion.as_str(),
            memory.importance.clamp(1, 10),
            timestamp(created_at),
        ],
    )?;

    Ok(id)
}

/// Persist a user/assistant exchange for each persona in one transaction.
///
/// An embedding of the wrong dimensionality, or one that cannot be scored (zero
/// or non-finite), is dropped (stored as NULL) rather than failing the write.
pub fn store_turn(conn: &mut Connection, turn: &TurnRecord<'_>) -> Result<StoredTurn> {
    let signals = MessageSignals::extract(turn.user_message);

    let embedding = match turn.embedding {
        Some(e) if is_usable_embedding(e) => Some(e),
        Some(e) => {
            tracing::warn!(len = e.len(), expected = EMBEDDING_DIM, "dropping malformed turn embedding");
            None
        }
        None => None,
    };

    let no_tags: Vec<String> = Vec::new();
    let user_at = Utc::now();
    // assistant row sorts strictly after its user row
    let assistant_at = user_at + chrono::Duration::microseconds(1);

    let tx = conn.transaction()?;

    let mut fact_ids = Vec::with_capacity(turn.facts.len());
    for fact in turn.facts {
        fact_ids.push(facts::store_shared_fact(&tx, turn.user_id, fact)?);
    }

    let mut memory_ids = Vec::with_capacity(turn.persona_ids.len() * 2);

    for persona_id in turn.persona_ids {
        let user_row = NewMemory {
            user_id: turn.user_id,
            persona_id,
            role: Role::User,
            content: turn.user_message,
            embedding,
            domain: signals.domain,
            tags: &signals.tags,
            emotion: signals.emotion,
            importance: signals.importance,
        };
        memory_ids.push(insert_memory(&tx, &user_row, user_at)?);

        let assistant_row = NewMemory {
            user_id: turn.user_id,
            persona_id,
            role: Role::Assistant,
            content: turn.assistant_reply,
            embedding: None,
            domain: signals.domain,
            tags: &no_tags,
            emotion: Emotion::Neutral,
            importance: ASSISTANT_IMPORTANCE,
        };
        memory_ids.push(insert_memory(&tx, &assistant_row, assistant_at)?);
    }

    tx.commit()?;

    tracing::debug!(
        user_id = %turn.user_id,
        personas = turn.persona_ids.len(),
        rows = memory_ids.len(),
        facts = fact_ids.len(),
        "turn stored"
    );

    Ok(StoredTurn {
        memory_ids,
        fact_ids,
        domain: signals.domain,
        importance: signals.importance,
    })
}

/// Fetch one memory by id. Malformed rows are reported as absent.
pub fn fetch_memory(conn: &Connection, id: &str) -> Result<Option<Memory>> {
    let row = conn
        .query_row(
            "SELECT id, user_id, persona_id, role, content, embedding, domain, tags, emotion, importance, created_at \
             FROM memories WHERE id = ?1",
            params![id],
            memory_from_row,
        )
        .optional()?;
    Ok(row.flatten())
}

/// Map a full `memories` row into a [`Memory`], validating at the boundary.
///
/// Unknown roles reject the row; other malformed columns are defaulted.
pub(crate) fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<Option<Memory>> {
    let id: String = row.get(0)?;
    let role_str: String = row.get(3)?;
    let role = match role_str.parse::<Role>() {
        Ok(role) => role,
        Err(e) => {
            tracing::warn!(id = %id, error = %e, "skipping memory row with unknown role");
            return Ok(None);
        }
    };

    let embedding_blob: Option<Vec<u8>> = row.get(5)?;
    let embedding = embedding_blob.and_then(|b| {
        let decoded = bytes_to_embedding(&b, EMBEDDING_DIM);
        if decoded.is_none() {
            tracing::warn!(id = %id, bytes = b.len(), "ignoring embedding of unexpected size");
        }
        decoded
    });

    let tags_json: String = row.get(7)?;
    let tags = serde_json::from_str::<Vec<String>>(&tags_json).unwrap_or_default();
    let importance: i64 = row.get(9)?;

    Ok(Some(Memory {
        id,
        user_id: row.get(1)?,
        persona_id: row.get(2)?,
        role,
        content: row.get(4)?,
        embedding,
        domain: Domain::from_str_lenient(&row.get::<_, String>(6)?),
        tags,
        emotion: Emotion::from_str_lenient(&row.get::<_, String>(8)?),
        importance: importance.clamp(1, 10) as u8,
        created_at: row.get(10)?,
    }))
}
