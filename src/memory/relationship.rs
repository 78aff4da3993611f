//! Relationship tiers derived from how many turns a user and persona have shared.

use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipTier {
    Stranger,
    Acquaintance,
    Friend,
    CloseFriend,
    BestFriend,
    Soulmate,
}

impl RelationshipTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stranger => "STRANGER",
            Self::Acquaintance => "ACQUAINTANCE",
            Self::Friend => "FRIEND",
            Self::CloseFriend => "CLOSE_FRIEND",
            Self::BestFriend => "BEST_FRIEND",
            Self::Soulmate => "SOULMATE",
        }
    }

    /// The fixed behavioral instruction for this tier.
    pub fn modifier(&self) -> &'static str {
        RELATIONSHIP_TIERS
            .iter()
            .find(|t| t.tier == *self)
            .map(|t| t.modifier)
            .unwrap_or(RELATIONSHIP_TIERS[0].modifier)
    }
}

impl std::fmt::Display for RelationshipTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TierDef {
    pub threshold: u64,
    pub tier: RelationshipTier,
    pub modifier: &'static str,
}

/// Ordered by strictly ascending threshold; checked at compile time below.
pub const RELATIONSHIP_TIERS: [TierDef; 6] = [
    TierDef {
        threshold: 0,
        tier: RelationshipTier::Stranger,
        modifier: "You just met this user. Be polite and slightly formal.",
    },
    TierDef {
        threshold: 10,
        tier: RelationshipTier::Acquaintance,
        modifier: "You've talked a few times. Be friendly but not overly familiar.",
    },
    TierDef {
        threshold: 100,
        tier: RelationshipTier::Friend,
        modifier: "You're friends now. Be casual, warm, and supportive.",
    },
    TierDef {
        threshold: 500,
        tier: RelationshipTier::CloseFriend,
        modifier: "You're close friends. Share inside jokes, be playful, show genuine care.",
    },
    TierDef {
        threshold: 1000,
        tier: RelationshipTier::BestFriend,
        modifier: "You're best friends. Be deeply personal, protective, and emotionally present.",
    },
    TierDef {
        threshold: 2500,
        tier: RelationshipTier::Soulmate,
        modifier: "You've shared everything. You know them better than anyone. Be their anchor.",
    },
];

const _: () = {
    assert!(RELATIONSHIP_TIERS[0].threshold == 0, "first tier must start at zero");
    let mut i = 1;
    while i < RELATIONSHIP_TIERS.len() {
        assert!(
            RELATIONSHIP_TIERS[i - 1].threshold < RELATIONSHIP_TIERS[i].threshold,
            "tier thresholds must be strictly ascending"
        );
        i += 1;
    }
};

/// Highest tier whose threshold is at most `message_count`.
pub fn relationship_level(message_count: u64) -> RelationshipTier {
    RELATIONSHIP_TIERS
        .iter()
        .rev()
        .find(|t| message_count >= t.threshold)
        .map(|t| t.tier)
        .unwrap_or(RelationshipTier::Stranger)
}

/// Number of stored turns (both roles) for one (user, persona) pair.
pub fn count_messages(conn: &Connection, user_id: &str, persona_id: &str) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memories WHERE user_id = ?1 AND persona_id = ?2",
        params![user_id, persona_id],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

/// Render the relationship block injected into single-persona prompts.
pub fn render_relationship(message_count: u64) -> String {
    let tier = relationship_level(message_count);
    format!(
        "[RELATIONSHIP STATUS]: {tier} ({message_count} messages exchanged)\n{}",
        tier.modifier()
    )
}

pub fn relationship_context(conn: &Connection, user_id: &str, persona_id: &str) -> Result<String> {
    let count = count_messages(conn, user_id, persona_id)?;
    Ok(render_relationship(count))
}
