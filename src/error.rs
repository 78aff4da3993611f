//! Error taxonomy for the console pipeline.
//!
//! Rejections ([`ConsoleError::QuotaExceeded`], [`ConsoleError::AccessDenied`]) are
//! kept apart from storage and internal failures so callers can show the right
//! message. Optional context sources never surface here: they degrade to an empty
//! block and a warning log instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("daily request limit reached")]
    QuotaExceeded { remaining: i64 },

    #[error("access denied for persona {persona_id}")]
    AccessDenied { persona_id: String },

    #[error("persona not found: {persona_id}")]
    PersonaNotFound { persona_id: String },

    #[error("no persona_id provided")]
    MissingPersona,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Storage failure on a path that must not fail open (quota counter, turn writes).
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ConsoleError>;

impl ConsoleError {
    /// Stable machine-readable label for API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::AccessDenied { .. } => "access_denied",
            Self::PersonaNotFound { .. } => "persona_not_found",
            Self::MissingPersona | Self::InvalidRequest(_) => "invalid_request",
            Self::Persistence(_) | Self::Database(_) | Self::Task(_) | Self::Other(_) => {
                "internal"
            }
        }
    }

    /// `true` for quota and access rejections, which are never retried.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. } | Self::AccessDenied { .. })
    }
}

impl From<tokio::task::JoinError> for ConsoleError {
    fn from(err: tokio::task::JoinError) -> Self {
        ConsoleError::Task(err.to_string())
    }
}
