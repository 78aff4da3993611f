mod helpers;

use helpers::{console, seed_persona, test_db, FailingEmbedder, StaticEmbedder};
use kindred::console::ChatRequest;
use kindred::db;
use kindred::embedding::EMBEDDING_DIM;
use kindred::memory::types::Role;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn open_creates_new_db_at_nonexistent_path() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("subdir").join("new.db");

    assert!(!db_path.exists());

    let conn = db::open_database(&db_path).unwrap();

    assert!(db_path.exists());

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn reopening_keeps_data() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("kindred.db");

    {
        let conn = db::open_database(&db_path).unwrap();
        seed_persona(&conn, "p1", "Rem", "PUBLIC", None);
    }

    let conn = db::open_database(&db_path).unwrap();
    let name: String = conn
        .query_row("SELECT name FROM personas WHERE id = 'p1'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(name, "Rem");
}

#[tokio::test]
async fn embedding_outage_still_produces_prompt() {
    let conn = test_db();
    seed_persona(&conn, "p1", "Rem", "PUBLIC", None);
    let (console, _db) = console(conn, Arc::new(FailingEmbedder));

    let prepared = console
        .prepare_turn(&ChatRequest {
            user_id: Some("u1".into()),
            persona_id: Some("p1".into()),
            message: "Do you remember my sister?".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(prepared.embedding.is_none());
    assert!(prepared.system_prompt.contains("Name: Rem"));
    assert!(!prepared.system_prompt.contains("[RECALLED MEMORIES]"));
}

#[tokio::test]
async fn broken_context_table_degrades_to_empty_block() {
    let conn = test_db();
    seed_persona(&conn, "p1", "Rem", "PUBLIC", None);
    conn.execute_batch("DROP TABLE shared_facts").unwrap();
    let (console, _db) = console(conn, Arc::new(FailingEmbedder));

    let prepared = console
        .prepare_turn(&ChatRequest {
            user_id: Some("u1".into()),
            persona_id: Some("p1".into()),
            message: "hi".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(!prepared.system_prompt.contains("[SHARED FACTS ABOUT THE USER]"));
    assert!(prepared.system_prompt.contains("[RELATIONSHIP STATUS]: STRANGER (0 messages exchanged)"));
}

#[tokio::test]
async fn quota_storage_failure_rejects_request() {
    let conn = test_db();
    seed_persona(&conn, "p1", "Rem", "PUBLIC", None);
    conn.execute_batch("DROP TABLE user_limits").unwrap();
    let (console, _db) = console(conn, Arc::new(FailingEmbedder));

    let err = console
        .prepare_turn(&ChatRequest {
            user_id: Some("u1".into()),
            persona_id: Some("p1".into()),
            message: "hi".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "internal");
    assert!(matches!(err, kindred::error::ConsoleError::Persistence(_)));
}

#[tokio::test]
async fn zero_vector_memory_does_not_hide_recall() {
    let conn = test_db();
    seed_persona(&conn, "p1", "Rem", "PUBLIC", None);
    let now = chrono::Utc::now();
    helpers::seed_memory(
        &conn,
        "u1",
        "p1",
        Role::User,
        "My sister lives in Porto",
        Some(&helpers::test_embedding(0)),
        now,
    );
    helpers::seed_memory(
        &conn,
        "u1",
        "p1",
        Role::User,
        "corrupted row",
        Some(&vec![0.0f32; EMBEDDING_DIM]),
        now,
    );
    let (console, _db) = console(conn, StaticEmbedder::new(helpers::test_embedding(0)));

    let prepared = console
        .prepare_turn(&ChatRequest {
            user_id: Some("u1".into()),
            persona_id: Some("p1".into()),
            message: "Where does my sister live?".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(prepared.system_prompt.contains("]: My sister lives in Porto"));
    assert!(!prepared.system_prompt.contains("corrupted row"));
}
