//! Typed records for every table the console reads or writes.
//!
//! Enum columns round-trip through `as_str` / [`FromStr`](std::str::FromStr).
//! Rows read from storage go through the `*_lenient` constructors, which default
//! malformed values (with a warning) instead of failing the whole request.

use serde::{Deserialize, Serialize};

/// Author of a stored turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            // legacy rows wrote the assistant side as "ai"
            "assistant" | "ai" => Ok(Self::Assistant),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// Topic area a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Code,
    Business,
    Personal,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Business => "business",
            Self::Personal => "personal",
        }
    }

    pub fn from_str_lenient(s: &str) -> Self {
        s.parse().unwrap_or_else(|e: String| {
            tracing::warn!(error = %e, "defaulting domain to personal");
            Self::Personal
        })
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(Self::Code),
            "business" => Ok(Self::Business),
            "personal" => Ok(Self::Personal),
            _ => Err(format!("unknown domain: {s}")),
        }
    }
}

/// Coarse emotional tone of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Positive,
    Negative,
    Anxious,
    Neutral,
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Anxious => "anxious",
            Self::Neutral => "neutral",
        }
    }

    pub fn from_str_lenient(s: &str) -> Self {
        s.parse().unwrap_or_else(|e: String| {
            tracing::warn!(error = %e, "defaulting emotion to neutral");
            Self::Neutral
        })
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Emotion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Self::Positive),
            "negative" => Ok(Self::Negative),
            "anxious" => Ok(Self::Anxious),
            "neutral" => Ok(Self::Neutral),
            _ => Err(format!("unknown emotion: {s}")),
        }
    }
}

/// Who may chat with a persona without an explicit grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    /// Anyone.
    Public,
    /// Owner and grantees only.
    Private,
    /// Reachable by link, but chatting still needs ownership or a grant.
    Unlisted,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "PUBLIC",
            Self::Private => "PRIVATE",
            Self::Unlisted => "UNLISTED",
        }
    }

    /// Unknown values fall back to the most restrictive visibility.
    pub fn from_str_lenient(s: &str) -> Self {
        s.parse().unwrap_or_else(|e: String| {
            tracing::warn!(error = %e, "treating persona as PRIVATE");
            Self::Private
        })
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PUBLIC" => Ok(Self::Public),
            "PRIVATE" => Ok(Self::Private),
            "UNLISTED" => Ok(Self::Unlisted),
            _ => Err(format!("unknown visibility: {s}")),
        }
    }
}

/// Audience restriction applied to a persona's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyLevel {
    Adult,
    Teen,
    Child,
}

impl SafetyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Adult => "ADULT",
            Self::Teen => "TEEN",
            Self::Child => "CHILD",
        }
    }

    pub fn from_str_lenient(s: &str) -> Self {
        s.parse().unwrap_or_else(|e: String| {
            tracing::warn!(error = %e, "defaulting safety level to ADULT");
            Self::Adult
        })
    }
}

impl std::fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SafetyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADULT" => Ok(Self::Adult),
            "TEEN" => Ok(Self::Teen),
            "CHILD" => Ok(Self::Child),
            _ => Err(format!("unknown safety level: {s}")),
        }
    }
}

/// A stored conversational turn, matching the `memories` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    pub user_id: String,
    pub persona_id: String,
    pub role: Role,
    pub content: String,
    /// Exactly [`EMBEDDING_DIM`](crate::embedding::EMBEDDING_DIM) values, or `None`
    /// when embedding generation failed for that turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub domain: Domain,
    pub tags: Vec<String>,
    pub emotion: Emotion,
    /// 1–10.
    pub importance: u8,
    /// RFC 3339 UTC timestamp.
    pub created_at: String,
}

/// A fact the user opted to expose to all personas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedFact {
    pub user_id: String,
    pub content: String,
    pub fact_type: String,
    pub shared_with_all: bool,
}

/// A persistent note attached to a persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaLocket {
    pub persona_id: String,
    pub content: String,
}

/// Per-user daily quota state, matching the `user_limits` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLimit {
    pub user_id: String,
    pub requests_today: i64,
    pub max_requests_per_day: i64,
    pub is_premium: bool,
}

/// A character definition, matching the `personas` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub system_prompt: String,
    pub visibility: Visibility,
    pub owner_id: Option<String>,
    pub safety_level: SafetyLevel,
    /// Sampling temperature the dispatcher should use, when the persona sets one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}
