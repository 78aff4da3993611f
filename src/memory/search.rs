//! Read path: similarity search over past turns with time-decay ranking.
//!
//! Candidates are restricted to one (user, persona) pair and scored in SQLite with
//! sqlite-vec's `vec_distance_cosine`. Ranking adds a bounded recency bonus to the
//! raw cosine similarity:
//!
//! ```text
//! score = similarity + recency_weight * 0.5 ^ (age_days / half_life_days)
//! ```
//!
//! The bonus halves every `half_life_days` and never exceeds `recency_weight`, so a
//! fresh memory can overtake a stale one with marginally higher similarity, but a
//! similarity gap wider than `recency_weight` is never inverted.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::cmp::Ordering;

use crate::config::RetrievalConfig;
use crate::embedding::{is_usable_embedding, EMBEDDING_DIM};

/// Arguments of the similarity search, mirroring the `match_memories` contract.
#[derive(Debug, Clone)]
pub struct MatchParams<'a> {
    /// Minimum raw cosine similarity.
    pub threshold: f64,
    pub max_count: usize,
    pub persona_filter: &'a str,
    pub user_filter: &'a str,
    pub half_life_days: f64,
    pub recency_weight: f64,
    /// Reference time for ages; injectable for tests.
    pub now: DateTime<Utc>,
}

impl<'a> MatchParams<'a> {
    pub fn from_config(
        config: &RetrievalConfig,
        persona_id: &'a str,
        user_id: &'a str,
    ) -> Self {
        Self {
            threshold: config.match_threshold,
            max_count: config.match_count,
            persona_filter: persona_id,
            user_filter: user_id,
            half_life_days: config.half_life_days,
            recency_weight: config.recency_weight,
            now: Utc::now(),
        }
    }
}

/// One ranked search hit.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryMatch {
    pub id: String,
    pub content: String,
    pub created_at: String,
    /// Raw cosine similarity in `[-1, 1]`.
    pub similarity: f64,
    /// Decay-adjusted ranking score.
    pub score: f64,
}

/// Retrieve and render the memory block for one (user, persona) pair.
///
/// Returns an empty string without touching the database when `embedding` is
/// `None`, and an empty string when nothing clears the threshold.
pub fn retrieve_memories(
    conn: &Connection,
    embedding: Option<&[f32]>,
    persona_id: &str,
    user_id: &str,
    config: &RetrievalConfig,
) -> Result<String> {
    let Some(embedding) = embedding else {
        return Ok(String::new());
    };

    let params = MatchParams::from_config(config, persona_id, user_id);
    let matches = match_memories(conn, embedding, &params)?;

    tracing::debug!(
        user_id = %user_id,
        persona_id = %persona_id,
        matches = matches.len(),
        "memories retrieved"
    );

    Ok(render_memories(&matches))
}

/// Similarity search restricted to `params.user_filter` / `params.persona_filter`.
///
/// Rows without an embedding, or with a stored vector of the wrong size, are
/// never candidates. Rows sqlite-vec cannot score (a zero vector yields NULL) are
/// skipped individually.
pub fn match_memories(
    conn: &Connection,
    embedding: &[f32],
    params: &MatchParams<'_>,
) -> Result<Vec<MemoryMatch>> {
    if !is_usable_embedding(embedding) {
        tracing::warn!(len = embedding.len(), expected = EMBEDDING_DIM, "query embedding is malformed or zero");
        return Ok(Vec::new());
    }
    if params.max_count == 0 {
        return Ok(Vec::new());
    }

    let embedding_bytes = super::embedding_to_bytes(embedding);
    let blob_len = (EMBEDDING_DIM * std::mem::size_of::<f32>()) as i64;

    let mut stmt = conn.prepare(
        "SELECT id, content, created_at, 1.0 - vec_distance_cosine(embedding, ?1) AS similarity \
         FROM memories \
         WHERE user_id = ?2 AND persona_id = ?3 \
           AND embedding IS NOT NULL AND length(embedding) = ?4",
    )?;

    let candidates = stmt
        .query_map(
            params![embedding_bytes, params.user_filter, params.persona_filter, blob_len],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                ))
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let mut matches: Vec<MemoryMatch> = candidates
        .into_iter()
        .filter_map(|(id, content, created_at, similarity)| match similarity {
            Some(similarity) => Some((id, content, created_at, similarity)),
            None => {
                tracing::warn!(id = %id, "skipping memory whose embedding cannot be scored");
                None
            }
        })
        .filter(|(_, _, _, similarity)| *similarity >= params.threshold)
        .map(|(id, content, created_at, similarity)| {
            let age_days = age_in_days(&created_at, params.now);
            let score = similarity
                + recency_bonus(age_days, params.half_life_days, params.recency_weight);
            MemoryMatch {
                id,
                content,
                created_at,
                similarity,
                score,
            }
        })
        .collect();

    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    matches.truncate(params.max_count);

    Ok(matches)
}

/// Bounded exponential recency bonus: `weight` at age 0, halving every `half_life_days`.
pub fn recency_bonus(age_days: f64, half_life_days: f64, weight: f64) -> f64 {
    if half_life_days <= 0.0 {
        return 0.0;
    }
    weight * 0.5f64.powf(age_days.max(0.0) / half_life_days)
}

/// Age of an RFC 3339 timestamp in fractional days. Unparseable timestamps are
/// treated as infinitely old so they earn no recency bonus.
fn age_in_days(created_at: &str, now: DateTime<Utc>) -> f64 {
    match DateTime::parse_from_rfc3339(created_at) {
        Ok(ts) => {
            let age = now.signed_duration_since(ts.with_timezone(&Utc));
            age.num_seconds() as f64 / 86_400.0
        }
        Err(e) => {
            tracing::warn!(created_at = %created_at, error = %e, "unparseable memory timestamp");
            f64::INFINITY
        }
    }
}

/// Render hits as `[MEMORY - YYYY-MM-DD]: content`, blank-line separated, in rank order.
pub fn render_memories(matches: &[MemoryMatch]) -> String {
    matches
        .iter()
        .map(|m| {
            let date = m.created_at.split('T').next().unwrap_or(&m.created_at);
            format!("[MEMORY - {date}]: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
