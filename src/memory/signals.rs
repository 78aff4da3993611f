//! Pure text classifiers run on every inbound message.
//!
//! Nothing here touches the network or the database.

use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::memory::types::{Domain, Emotion};

// SAFETY (all statics below): literal patterns, compilation cannot fail.
#[allow(clippy::expect_used)]
static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.(js|ts|py|html|css)|function|const|import|error|bug|syntax|sudo|npx|npm")
        .expect("code regex")
});

#[allow(clippy::expect_used)]
static BUSINESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)business|strategy|market|price|cost|plan|schedule|meeting")
        .expect("business regex")
});

#[allow(clippy::expect_used)]
static FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[\w-]+\.(js|ts|py|html|css|json|md|tsx|jsx)\b").expect("file regex")
});

#[allow(clippy::expect_used)]
static URGENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(urgent|asap|broken|crash|error)\b").expect("urgent regex")
});

#[allow(clippy::expect_used)]
static POSITIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(happy|excited|great|love|amazing|wonderful|fantastic)\b")
        .expect("positive regex")
});

#[allow(clippy::expect_used)]
static NEGATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(sad|depressed|tired|frustrated|angry|hate|upset|terrible)\b")
        .expect("negative regex")
});

#[allow(clippy::expect_used)]
static ANXIOUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(worried|anxious|nervous|scared|concerned)\b").expect("anxious regex")
});

#[allow(clippy::expect_used)]
static EMPHASIS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(important|critical|remember|never forget)\b").expect("emphasis regex")
});

#[allow(clippy::expect_used)]
static FAULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(bug|error|crash|broken)\b").expect("fault regex")
});

/// Everything derived from one message before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageSignals {
    pub domain: Domain,
    pub tags: Vec<String>,
    pub emotion: Emotion,
    pub importance: u8,
}

impl MessageSignals {
    pub fn extract(text: &str) -> Self {
        let domain = detect_domain(text);
        Self {
            domain,
            tags: extract_tags(text),
            emotion: detect_emotion(text),
            importance: calculate_importance(text, domain),
        }
    }
}

/// Classify a message as code, business, or personal.
///
/// The code vocabulary is matched case-sensitively (shell commands and keywords
/// are lowercase); business vocabulary is case-insensitive.
pub fn detect_domain(text: &str) -> Domain {
    if CODE_RE.is_match(text) {
        Domain::Code
    } else if BUSINESS_RE.is_match(text) {
        Domain::Business
    } else {
        Domain::Personal
    }
}

/// Lower-cased filenames mentioned in the text, plus `urgent` for urgency vocabulary.
/// De-duplicated, first occurrence wins the position.
pub fn extract_tags(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tags = Vec::new();

    let files = FILE_RE.find_iter(text).map(|m| m.as_str().to_lowercase());
    let urgent = URGENT_RE.is_match(text).then(|| "urgent".to_string());

    for tag in files.chain(urgent) {
        if seen.insert(tag.clone()) {
            tags.push(tag);
        }
    }
    tags
}

/// First matching bucket in priority order positive, negative, anxious.
pub fn detect_emotion(text: &str) -> Emotion {
    if POSITIVE_RE.is_match(text) {
        Emotion::Positive
    } else if NEGATIVE_RE.is_match(text) {
        Emotion::Negative
    } else if ANXIOUS_RE.is_match(text) {
        Emotion::Anxious
    } else {
        Emotion::Neutral
    }
}

/// Score 1–10: base 5, +3 emphasis, +2 faults, +1 business, −2 under 20 characters.
pub fn calculate_importance(text: &str, domain: Domain) -> u8 {
    let mut score: i32 = 5;
    if EMPHASIS_RE.is_match(text) {
        score += 3;
    }
    if FAULT_RE.is_match(text) {
        score += 2;
    }
    if domain == Domain::Business {
        score += 1;
    }
    // Counts Unicode scalar values; an emoji is one character, not two UTF-16 units.
    if text.chars().count() < 20 {
        score -= 2;
    }
    score.clamp(1, 10) as u8
}
