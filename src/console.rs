//! Request orchestration: everything between an inbound chat message and the
//! language-model call, and the write-back once the reply is complete.
//!
//! [`Console::prepare_turn`] gates the request (quota, then access), gathers
//! context, and synthesizes the system prompt. Only quota, access and persona
//! lookups can fail the request; every other context source degrades to an empty
//! block with a warning. [`Console::record_turn`] persists the finished exchange.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::access;
use crate::config::KindredConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{ConsoleError, Result};
use crate::limits;
use crate::memory::context;
use crate::memory::facts;
use crate::memory::relationship;
use crate::memory::search;
use crate::memory::signals::MessageSignals;
use crate::memory::store::{self, TurnRecord};
use crate::memory::types::Persona;
use crate::prompt::{self, PersonaProfile, PromptInputs};

/// User id applied when the caller does not identify the user.
pub const ANONYMOUS_USER: &str = "anonymous_user";

/// Sampling temperature when the first persona does not set one.
pub const DEFAULT_TEMPERATURE: f64 = 0.9;

/// Inbound chat message. Accepts either a single `persona_id` or a list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub persona_id: Option<String>,
    #[serde(default)]
    pub persona_ids: Vec<String>,
    #[serde(default)]
    pub message: String,
}

impl ChatRequest {
    fn persona_list(&self) -> Vec<String> {
        let ids = if self.persona_ids.is_empty() {
            self.persona_id.iter().cloned().collect()
        } else {
            self.persona_ids.clone()
        };
        dedup_ids(ids)
    }
}

/// A finished exchange submitted after the model replied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordTurnRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub persona_ids: Vec<String>,
    pub user_message: String,
    pub assistant_reply: String,
    /// Embedding returned by `prepare_turn`, reused so the message is not embedded twice.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersonaSummary {
    pub id: String,
    pub name: String,
}

/// An admitted request, ready to be dispatched to the language model.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedTurn {
    pub user_id: String,
    pub system_prompt: String,
    pub personas: Vec<PersonaSummary>,
    pub remaining: i64,
    pub temperature: f64,
    pub signals: MessageSignals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordedTurn {
    /// Assistant reply with `[SAVE_FACT]` markers removed.
    pub reply: String,
    pub facts_saved: usize,
    pub memory_ids: Vec<String>,
    pub remaining: i64,
}

fn dedup_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

fn resolve_user(user_id: Option<&str>) -> String {
    match user_id.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => ANONYMOUS_USER.to_string(),
    }
}

/// Unwrap an optional context source, logging and substituting a default on failure.
fn degrade<T: Default>(source: &'static str, result: anyhow::Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(source, error = %e, "context source unavailable, continuing without it");
            T::default()
        }
    }
}

/// Shared request handler. Cheap to clone; holds no per-request state.
#[derive(Clone)]
pub struct Console {
    db: Arc<Mutex<Connection>>,
    embedding: Arc<dyn EmbeddingProvider>,
    config: Arc<KindredConfig>,
}

impl Console {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        embedding: Arc<dyn EmbeddingProvider>,
        config: Arc<KindredConfig>,
    ) -> Self {
        Self {
            db,
            embedding,
            config,
        }
    }

    pub fn config(&self) -> &KindredConfig {
        &self.config
    }

    /// Run a hard database step on the blocking pool. Failures abort the request.
    async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| ConsoleError::Task(format!("db lock poisoned: {e}")))?;
            f(&mut conn)
        })
        .await?
    }

    /// Spawn an optional context read on the blocking pool.
    fn spawn_read<T, F>(&self, f: F) -> JoinHandle<anyhow::Result<T>>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            f(&conn)
        })
    }

    /// Gate the request, gather context and build the system prompt.
    pub async fn prepare_turn(&self, request: &ChatRequest) -> Result<PreparedTurn> {
        let persona_ids = request.persona_list();
        if persona_ids.is_empty() {
            return Err(ConsoleError::MissingPersona);
        }
        let user_id = resolve_user(request.user_id.as_deref());

        // 1. Quota, then access. Both happen before any embedding or retrieval work.
        let limits_config = self.config.limits.clone();
        let uid = user_id.clone();
        let decision = self
            .with_db(move |conn| limits::check_rate_limit(conn, &uid, &limits_config))
            .await?;
        if !decision.allowed {
            return Err(ConsoleError::QuotaExceeded { remaining: 0 });
        }

        let uid = user_id.clone();
        let ids = persona_ids.clone();
        let personas = self.with_db(move |conn| load_authorized(conn, &uid, &ids)).await?;
        let multi = personas.len() > 1;

        tracing::info!(
            user_id = %user_id,
            personas = %personas.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(" + "),
            remaining = decision.remaining,
            "console loaded"
        );

        // 2. Signals and embedding. Embedding may be absent; retrieval then yields nothing.
        let signals = MessageSignals::extract(&request.message);
        let timeout = Duration::from_millis(self.config.embedding.timeout_ms);
        let query_embedding =
            embedding::generate_embedding(self.embedding.as_ref(), &request.message, timeout).await;

        // 3. Independent reads. Each is its own blocking task, but all share one
        // connection mutex, so they execute one after another.
        let retrieval = self.config.retrieval.clone();
        let memories_task = {
            let uid = user_id.clone();
            let ids = persona_ids.clone();
            let emb = query_embedding.clone();
            self.spawn_read(move |conn| {
                let blocks: Vec<String> = ids
                    .iter()
                    .map(|pid| {
                        degrade(
                            "memories",
                            search::retrieve_memories(conn, emb.as_deref(), pid, &uid, &retrieval),
                        )
                    })
                    .filter(|block| !block.is_empty())
                    .collect();
                Ok(blocks.join("\n\n"))
            })
        };
        let facts_task = {
            let uid = user_id.clone();
            self.spawn_read(move |conn| context::shared_facts(conn, &uid))
        };
        let handoff_task = {
            let uid = user_id.clone();
            let pid = persona_ids[0].clone();
            let window = chrono::Duration::minutes(self.config.retrieval.handoff_window_minutes);
            let limit = self.config.retrieval.handoff_limit;
            self.spawn_read(move |conn| {
                if multi {
                    return Ok(String::new());
                }
                context::handoff_context(conn, &uid, &pid, window, limit)
            })
        };
        let relationship_task = {
            let uid = user_id.clone();
            let pid = persona_ids[0].clone();
            self.spawn_read(move |conn| {
                if multi {
                    return Ok(String::new());
                }
                relationship::relationship_context(conn, &uid, &pid)
            })
        };
        let lockets_task = {
            let ids = persona_ids.clone();
            self.spawn_read(move |conn| context::lockets(conn, &ids))
        };

        let (memories, shared_facts, handoff, relationship, lockets) = tokio::try_join!(
            memories_task,
            facts_task,
            handoff_task,
            relationship_task,
            lockets_task
        )?;

        let memories = degrade("memories", memories);
        let shared_facts = degrade("shared_facts", shared_facts);
        let handoff = degrade("handoff", handoff);
        let relationship = degrade("relationship", relationship);
        let lockets = degrade("lockets", lockets);

        // 4. Synthesis.
        let profiles = personas
            .iter()
            .map(|persona| {
                let lines = lockets
                    .iter()
                    .find(|l| l.persona_id == persona.id)
                    .map(|l| l.lines())
                    .unwrap_or_default();
                PersonaProfile::from_persona(persona, lines)
            })
            .collect();

        let system_prompt = prompt::synthesize(&PromptInputs {
            personas: profiles,
            shared_facts,
            relationship,
            handoff,
            memories,
        });

        let temperature = personas[0].temperature.unwrap_or(DEFAULT_TEMPERATURE);

        tracing::debug!(
            user_id = %user_id,
            prompt_len = system_prompt.len(),
            has_embedding = query_embedding.is_some(),
            "system prompt synthesized"
        );

        Ok(PreparedTurn {
            user_id,
            system_prompt,
            personas: personas
                .iter()
                .map(|p| PersonaSummary {
                    id: p.id.clone(),
                    name: p.name.clone(),
                })
                .collect(),
            remaining: decision.remaining,
            temperature,
            signals,
            embedding: query_embedding,
        })
    }

    /// Persist a completed exchange for every persona that took part.
    ///
    /// Every persona is access-checked first, exactly as in `prepare_turn`. The
    /// quota is not touched again: the request was counted when it was prepared.
    /// `[SAVE_FACT]` commands in the reply are stored as shared facts and stripped
    /// before the reply is written; facts and rows commit together or not at all.
    pub async fn record_turn(&self, request: &RecordTurnRequest) -> Result<RecordedTurn> {
        let persona_ids = dedup_ids(request.persona_ids.clone());
        if persona_ids.is_empty() {
            return Err(ConsoleError::MissingPersona);
        }
        if request.user_message.trim().is_empty() {
            return Err(ConsoleError::InvalidRequest(
                "user_message must not be empty".into(),
            ));
        }

        let user_id = resolve_user(request.user_id.as_deref());
        let (commands, reply) = facts::extract_fact_commands(&request.assistant_reply);

        let uid = user_id.clone();
        let user_message = request.user_message.clone();
        let embedding = request.embedding.clone();
        let limits_config = self.config.limits.clone();
        let reply_for_store = reply.clone();

        let (stored, remaining) = self
            .with_db(move |conn| {
                load_authorized(conn, &uid, &persona_ids)?;

                let stored = store::store_turn(
                    conn,
                    &TurnRecord {
                        user_id: &uid,
                        persona_ids: &persona_ids,
                        user_message: &user_message,
                        assistant_reply: &reply_for_store,
                        embedding: embedding.as_deref(),
                        facts: &commands,
                    },
                )
                .map_err(|e| ConsoleError::Persistence(format!("storing turn: {e:#}")))?;

                let remaining = limits::remaining_quota(conn, &uid, &limits_config)?;
                Ok((stored, remaining))
            })
            .await?;
        let facts_saved = stored.fact_ids.len();

        tracing::info!(
            user_id = %user_id,
            rows = stored.memory_ids.len(),
            facts_saved,
            domain = %stored.domain,
            "turn recorded"
        );

        Ok(RecordedTurn {
            reply,
            facts_saved,
            memory_ids: stored.memory_ids,
            remaining,
        })
    }
}

/// Access-check and load every requested persona, in request order.
fn load_authorized(conn: &mut Connection, user_id: &str, persona_ids: &[String]) -> Result<Vec<Persona>> {
    let mut personas = Vec::with_capacity(persona_ids.len());
    for persona_id in persona_ids {
        if !access::check_persona_access(conn, user_id, persona_id)? {
            tracing::info!(user_id = %user_id, persona_id = %persona_id, "persona access denied");
            return Err(ConsoleError::AccessDenied {
                persona_id: persona_id.clone(),
            });
        }
        let persona = access::load_persona(conn, persona_id)?.ok_or_else(|| {
            ConsoleError::PersonaNotFound {
                persona_id: persona_id.clone(),
            }
        })?;
        personas.push(persona);
    }
    Ok(personas)
}
