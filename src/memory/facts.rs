//! `[SAVE_FACT: type | content]` commands emitted by personas.
//!
//! The persona instructions ask the model to emit this marker when the user shares
//! something every persona should know. The marker is stripped from the reply
//! before it is stored or shown, and the fact is saved as shared with all personas.

use anyhow::Result;
use regex::Regex;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::sync::LazyLock;

use crate::db::now_timestamp;

// SAFETY: literal pattern, compilation cannot fail.
#[allow(clippy::expect_used)]
static SAVE_FACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[SAVE_FACT:\s*(\w+)\s*\|\s*(.+?)\]").expect("save fact regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactCommand {
    /// Upper-cased category label, e.g. `MEDICAL`.
    pub fact_type: String,
    pub content: String,
}

/// Pull every fact command out of `reply`. Returns the commands and the reply
/// with the markers removed and surrounding whitespace trimmed.
pub fn extract_fact_commands(reply: &str) -> (Vec<FactCommand>, String) {
    let commands = SAVE_FACT_RE
        .captures_iter(reply)
        .map(|caps| FactCommand {
            fact_type: caps[1].to_uppercase(),
            content: caps[2].trim().to_string(),
        })
        .filter(|c| !c.content.is_empty())
        .collect();

    let cleaned = SAVE_FACT_RE.replace_all(reply, "").trim().to_string();
    (commands, cleaned)
}

/// Store a fact as shared with all of the user's personas. Returns its id.
pub fn store_shared_fact(conn: &Connection, user_id: &str, fact: &FactCommand) -> Result<String> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO shared_facts (id, user_id, content, fact_type, shared_with_all, created_at) \
         VALUES (?1, ?2, ?3, ?4, 1, ?5)",
        params![id, user_id, fact.content, fact.fact_type, now_timestamp()],
    )?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_and_strips_commands() {
        let reply = "Got it, I'll keep that in mind! [SAVE_FACT: medical | Allergic to shellfish ]";
        let (commands, cleaned) = extract_fact_commands(reply);

        assert_eq!(
            commands,
            vec![FactCommand {
                fact_type: "MEDICAL".into(),
                content: "Allergic to shellfish".into(),
            }]
        );
        assert_eq!(cleaned, "Got it, I'll keep that in mind!");
    }

    #[test]
    fn extracts_multiple_commands() {
        let reply = "[SAVE_FACT: name|Goes by Sam] Nice to meet you, Sam. [SAVE_FACT: pronouns | they/them]";
        let (commands, cleaned) = extract_fact_commands(reply);

        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].fact_type, "NAME");
        assert_eq!(commands[1].content, "they/them");
        assert_eq!(cleaned, "Nice to meet you, Sam.");
    }

    #[test]
    fn reply_without_commands_is_untouched() {
        let (commands, cleaned) = extract_fact_commands("  Just chatting.  ");
        assert!(commands.is_empty());
        assert_eq!(cleaned, "Just chatting.");
    }

    #[test]
    fn malformed_marker_is_ignored() {
        let (commands, cleaned) = extract_fact_commands("[SAVE_FACT: no separator here]");
        assert!(commands.is_empty());
        assert_eq!(cleaned, "[SAVE_FACT: no separator here]");
    }

    #[test]
    fn stored_fact_is_shared() {
        let conn = crate::db::open_in_memory().unwrap();
        let fact = FactCommand {
            fact_type: "MEDICAL".into(),
            content: "Type 1 diabetic".into(),
        };
        store_shared_fact(&conn, "u1", &fact).unwrap();

        let rendered = crate::memory::context::shared_facts(&conn, "u1").unwrap();
        assert_eq!(rendered, "[SHARED FACT - MEDICAL]: Type 1 diabetic");
    }
}
