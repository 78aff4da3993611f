//! Per-user daily request quota.
//!
//! The counter is advanced with a single conditional `UPDATE`, so two requests
//! racing for the last slot cannot both be admitted. Storage failures reject the
//! request rather than letting it through uncounted.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::config::LimitsConfig;
use crate::error::{ConsoleError, Result};
use crate::memory::types::UserLimit;

/// Effective daily limit for premium users.
pub const PREMIUM_DAILY_LIMIT: i64 = 999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left today, measured before this request was counted.
    pub remaining: i64,
}

impl RateLimitDecision {
    fn denied() -> Self {
        Self {
            allowed: false,
            remaining: 0,
        }
    }
}

impl UserLimit {
    pub fn effective_limit(&self) -> i64 {
        if self.is_premium {
            PREMIUM_DAILY_LIMIT
        } else {
            self.max_requests_per_day
        }
    }
}

fn persistence(context: &str, err: rusqlite::Error) -> ConsoleError {
    ConsoleError::Persistence(format!("{context}: {err}"))
}

pub fn load_user_limit(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<UserLimit>> {
    conn.query_row(
        "SELECT user_id, requests_today, max_requests_per_day, is_premium FROM user_limits WHERE user_id = ?1",
        params![user_id],
        |row| {
            Ok(UserLimit {
                user_id: row.get(0)?,
                requests_today: row.get(1)?,
                max_requests_per_day: row.get(2)?,
                is_premium: row.get(3)?,
            })
        },
    )
    .optional()
}

/// Count one request if the row still has room. `false` means the counter was
/// already full when the write happened.
fn try_increment(conn: &Connection, user_id: &str) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE user_limits SET requests_today = requests_today + 1 \
         WHERE user_id = ?1 AND (is_premium = 1 OR requests_today < max_requests_per_day)",
        params![user_id],
    )?;
    Ok(changed > 0)
}

/// Check the user's quota and, when admitted, count this request.
pub fn check_rate_limit(
    conn: &Connection,
    user_id: &str,
    config: &LimitsConfig,
) -> Result<RateLimitDecision> {
    let existing = load_user_limit(conn, user_id).map_err(|e| persistence("reading quota", e))?;

    let limit = match existing {
        Some(limit) => limit,
        None => {
            conn.execute(
                "INSERT OR IGNORE INTO user_limits (user_id, requests_today, max_requests_per_day, is_premium) \
                 VALUES (?1, 0, ?2, 0)",
                params![user_id, config.free_daily_requests],
            )
            .map_err(|e| persistence("creating quota row", e))?;
            tracing::info!(user_id = %user_id, limit = config.free_daily_requests, "quota row created");

            load_user_limit(conn, user_id)
                .map_err(|e| persistence("reading quota", e))?
                .ok_or_else(|| ConsoleError::Persistence("quota row missing after insert".into()))?
        }
    };

    let effective = limit.effective_limit();
    let remaining = (effective - limit.requests_today).max(0);
    if limit.requests_today >= effective {
        tracing::info!(user_id = %user_id, requests_today = limit.requests_today, "daily limit reached");
        return Ok(RateLimitDecision::denied());
    }

    let counted = try_increment(conn, user_id).map_err(|e| persistence("incrementing quota", e))?;
    if !counted {
        tracing::info!(user_id = %user_id, "lost race for the last request slot");
        return Ok(RateLimitDecision::denied());
    }

    Ok(RateLimitDecision {
        allowed: true,
        remaining,
    })
}

/// Requests left today without counting a new one. Users with no row yet get the
/// configured free allowance.
pub fn remaining_quota(conn: &Connection, user_id: &str, config: &LimitsConfig) -> Result<i64> {
    let remaining = match load_user_limit(conn, user_id).map_err(|e| persistence("reading quota", e))? {
        Some(limit) => (limit.effective_limit() - limit.requests_today).max(0),
        None => config.free_daily_requests,
    };
    Ok(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn config() -> LimitsConfig {
        LimitsConfig::default()
    }

    fn requests_today(conn: &Connection, user: &str) -> i64 {
        conn.query_row(
            "SELECT requests_today FROM user_limits WHERE user_id = ?1",
            params![user],
            |r| r.get(0),
        )
        .unwrap()
    }

    #[test]
    fn first_request_creates_row_and_counts() {
        let conn = db::open_in_memory().unwrap();
        let decision = check_rate_limit(&conn, "new-user", &config()).unwrap();

        assert_eq!(
            decision,
            RateLimitDecision {
                allowed: true,
                remaining: 50
            }
        );
        assert_eq!(requests_today(&conn, "new-user"), 1);

        let limit = load_user_limit(&conn, "new-user").unwrap().unwrap();
        assert_eq!(limit.max_requests_per_day, 50);
        assert!(!limit.is_premium);
    }

    #[test]
    fn remaining_counts_down() {
        let conn = db::open_in_memory().unwrap();
        conn.execute(
            "INSERT INTO user_limits (user_id, requests_today, max_requests_per_day, is_premium) VALUES ('u1', 10, 50, 0)",
            [],
        )
        .unwrap();

        let decision = check_rate_limit(&conn, "u1", &config()).unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 40);
        assert_eq!(requests_today(&conn, "u1"), 11);
    }

    #[test]
    fn denied_at_limit_without_incrementing() {
        let conn = db::open_in_memory().unwrap();
        conn.execute(
            "INSERT INTO user_limits (user_id, requests_today, max_requests_per_day, is_premium) VALUES ('u1', 50, 50, 0)",
            [],
        )
        .unwrap();

        let decision = check_rate_limit(&conn, "u1", &config()).unwrap();
        assert_eq!(decision, RateLimitDecision::denied());
        assert_eq!(requests_today(&conn, "u1"), 50);
    }

    #[test]
    fn last_slot_admits_exactly_once() {
        let conn = db::open_in_memory().unwrap();
        conn.execute(
            "INSERT INTO user_limits (user_id, requests_today, max_requests_per_day, is_premium) VALUES ('u1', 49, 50, 0)",
            [],
        )
        .unwrap();

        assert!(check_rate_limit(&conn, "u1", &config()).unwrap().allowed);
        assert!(!check_rate_limit(&conn, "u1", &config()).unwrap().allowed);
        assert_eq!(requests_today(&conn, "u1"), 50);
    }

    #[test]
    fn conditional_update_rejects_a_full_counter() {
        // Simulates a stale read: the row filled up between the check and the update.
        let conn = db::open_in_memory().unwrap();
        conn.execute(
            "INSERT INTO user_limits (user_id, requests_today, max_requests_per_day, is_premium) VALUES ('u1', 50, 50, 0)",
            [],
        )
        .unwrap();

        assert!(!try_increment(&conn, "u1").unwrap());
        assert_eq!(requests_today(&conn, "u1"), 50);
    }

    #[test]
    fn premium_ignores_row_limit() {
        let conn = db::open_in_memory().unwrap();
        conn.execute(
            "INSERT INTO user_limits (user_id, requests_today, max_requests_per_day, is_premium) VALUES ('vip', 500, 50, 1)",
            [],
        )
        .unwrap();

        let decision = check_rate_limit(&conn, "vip", &config()).unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, PREMIUM_DAILY_LIMIT - 500);
        assert_eq!(requests_today(&conn, "vip"), 501);
    }

    #[test]
    fn remaining_quota_does_not_count() {
        let conn = db::open_in_memory().unwrap();
        assert_eq!(remaining_quota(&conn, "u1", &config()).unwrap(), 50);

        check_rate_limit(&conn, "u1", &config()).unwrap();
        assert_eq!(remaining_quota(&conn, "u1", &config()).unwrap(), 49);
        assert_eq!(requests_today(&conn, "u1"), 1);
    }

    #[test]
    fn storage_failure_is_not_fail_open() {
        let conn = db::open_in_memory().unwrap();
        conn.execute_batch("DROP TABLE user_limits").unwrap();

        let err = check_rate_limit(&conn, "u1", &config()).unwrap_err();
        assert!(matches!(err, ConsoleError::Persistence(_)));
    }
}
