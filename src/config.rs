use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct KindredConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub url: String,
    pub api_token: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Cosine similarity floor; matches below it are noise.
    pub match_threshold: f64,
    pub match_count: usize,
    /// Age at which the recency bonus has halved.
    pub half_life_days: f64,
    /// Upper bound of the recency bonus added to the raw similarity.
    pub recency_weight: f64,
    pub handoff_window_minutes: i64,
    pub handoff_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LimitsConfig {
    pub free_daily_requests: i64,
}

impl Default for KindredConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8787,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_kindred_dir()
            .join("kindred.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "http".into(),
            model: "all-MiniLM-L6-v2".into(),
            url: "https://api-inference.huggingface.co/models/sentence-transformers/all-MiniLM-L6-v2"
                .into(),
            api_token: None,
            timeout_ms: 10_000,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.35,
            match_count: 10,
            half_life_days: 30.0,
            recency_weight: 0.1,
            handoff_window_minutes: 60,
            handoff_limit: 3,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            free_daily_requests: 50,
        }
    }
}

/// Returns `~/.kindred/`
pub fn default_kindred_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kindred")
}

/// Returns the default config file path: `~/.kindred/config.toml`
pub fn default_config_path() -> PathBuf {
    default_kindred_dir().join("config.toml")
}

impl KindredConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            KindredConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// `KINDRED_DB`, `KINDRED_LOG_LEVEL`, `KINDRED_PORT`, `KINDRED_EMBEDDING_URL`,
    /// and `KINDRED_EMBEDDING_TOKEN` (falling back to `HUGGINGFACE_TOKEN`).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("KINDRED_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("KINDRED_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("KINDRED_PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid KINDRED_PORT"),
            }
        }
        if let Ok(val) = std::env::var("KINDRED_EMBEDDING_URL") {
            self.embedding.url = val;
        }
        if let Ok(val) =
            std::env::var("KINDRED_EMBEDDING_TOKEN").or_else(|_| std::env::var("HUGGINGFACE_TOKEN"))
        {
            self.embedding.api_token = Some(val);
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
