#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kindred::config::KindredConfig;
use kindred::console::Console;
use kindred::db;
use kindred::embedding::{EmbeddingProvider, EMBEDDING_DIM};
use kindred::memory::store::{insert_memory, NewMemory};
use kindred::memory::types::{Domain, Emotion, Role};
use rusqlite::{params, Connection};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::load_sqlite_vec();
    let mut conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&mut conn).unwrap();
    conn
}

/// Generate a deterministic 384-dim embedding with a spike at position `seed`.
/// Each seed produces a distinct, orthogonal vector.
pub fn test_embedding(seed: u16) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[seed as usize % EMBEDDING_DIM] = 1.0;
    v
}

/// Unit vector whose cosine similarity to `test_embedding(0)` is exactly `similarity`.
pub fn embedding_with_similarity(similarity: f32) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[0] = similarity;
    v[1] = (1.0 - similarity * similarity).max(0.0).sqrt();
    v
}

pub fn seed_persona(conn: &Connection, id: &str, name: &str, visibility: &str, owner: Option<&str>) {
    conn.execute(
        "INSERT INTO personas (id, name, system_prompt, visibility, owner_id) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, name, format!("You are {name}."), visibility, owner],
    )
    .unwrap();
}

pub fn grant(conn: &Connection, persona_id: &str, user_id: &str) {
    kindred::access::grant_access(conn, persona_id, user_id).unwrap();
}

pub fn seed_locket(conn: &Connection, persona_id: &str, content: &str) {
    conn.execute(
        "INSERT INTO persona_lockets (id, persona_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![uuid::Uuid::now_v7().to_string(), persona_id, content, db::now_timestamp()],
    )
    .unwrap();
}

/// Insert one memory row at an explicit time. Returns its id.
pub fn seed_memory(
    conn: &Connection,
    user_id: &str,
    persona_id: &str,
    role: Role,
    content: &str,
    embedding: Option<&[f32]>,
    created_at: DateTime<Utc>,
) -> String {
    insert_memory(
        conn,
        &NewMemory {
            user_id,
            persona_id,
            role,
            content,
            embedding,
            domain: Domain::Personal,
            tags: &[],
            emotion: Emotion::Neutral,
            importance: 5,
        },
        created_at,
    )
    .unwrap()
}

/// Seed `count` plain turns between a user and a persona, spread over the last year.
pub fn seed_history(conn: &Connection, user_id: &str, persona_id: &str, count: usize) {
    let start = Utc::now() - chrono::Duration::days(365);
    for i in 0..count {
        let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
        seed_memory(
            conn,
            user_id,
            persona_id,
            role,
            &format!("old message {i}"),
            None,
            start + chrono::Duration::minutes(i as i64),
        );
    }
}

pub fn set_quota(conn: &Connection, user_id: &str, used: i64, max: i64, premium: bool) {
    conn.execute(
        "INSERT OR REPLACE INTO user_limits (user_id, requests_today, max_requests_per_day, is_premium) \
         VALUES (?1, ?2, ?3, ?4)",
        params![user_id, used, max, premium],
    )
    .unwrap();
}

/// Embedder returning a fixed vector and counting calls.
pub struct StaticEmbedder {
    pub vector: Vec<f32>,
    pub calls: AtomicUsize,
}

impl StaticEmbedder {
    pub fn new(vector: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            vector,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbedder {
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector.clone())
    }
}

/// Embedder that always fails, as when the embedding service is down.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("embedding service unavailable")
    }
}

/// Build a console over `conn` with default config.
pub fn console(conn: Connection, embedder: Arc<dyn EmbeddingProvider>) -> (Console, Arc<Mutex<Connection>>) {
    let db = Arc::new(Mutex::new(conn));
    let console = Console::new(db.clone(), embedder, Arc::new(KindredConfig::default()));
    (console, db)
}
