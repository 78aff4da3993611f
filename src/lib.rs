//! Conversational memory and multi-persona console for AI companions.
//!
//! Kindred sits between a chat client and the language model. For each message it
//! enforces the user's daily quota and persona permissions, recalls relevant past
//! turns, and merges everything it knows about the user into one system prompt.
//! After the model replies, the exchange is written back so later turns can
//! recall it.
//!
//! | Tier | Messages exchanged |
//! |------|--------------------|
//! | **Stranger** | 0 |
//! | **Acquaintance** | 10 |
//! | **Friend** | 100 |
//! | **Close friend** | 500 |
//! | **Best friend** | 1000 |
//! | **Soulmate** | 2500 |
//!
//! # Architecture
//!
//! - **Storage**: SQLite with [sqlite-vec](https://github.com/asg017/sqlite-vec) for
//!   cosine similarity
//! - **Embeddings**: hosted all-MiniLM-L6-v2 over HTTP (384 dimensions), best-effort
//! - **Ranking**: similarity plus a bounded recency bonus with a configurable half-life
//! - **Transport**: JSON over HTTP (axum)
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite database initialization, schema, and migrations
//! - [`embedding`]: Text-to-vector embedding client
//! - [`memory`]: Signals, turn storage, retrieval, relationship tiers, shared context
//! - [`limits`] / [`access`]: Request gating
//! - [`prompt`]: System prompt synthesis
//! - [`console`]: Request orchestration
//! - [`server`]: HTTP routes and error mapping

pub mod access;
pub mod config;
pub mod console;
pub mod db;
pub mod embedding;
pub mod error;
pub mod limits;
pub mod memory;
pub mod prompt;
pub mod server;
