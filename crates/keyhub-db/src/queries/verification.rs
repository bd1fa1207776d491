use anyhow::Result;
use chrono::Duration;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::debug;

use crate::Database;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerificationStats {
    pub total: i64,
    pub used: i64,
}

impl VerificationStats {
    /// Share of issued codes that were redeemed, as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.used as f64 * 100.0 / self.total as f64
    }
}

/// SQLite datetime modifier, e.g. `+600 seconds`.
fn modifier(offset: Duration) -> String {
    format!("{:+} seconds", offset.num_seconds())
}

fn insert_code(conn: &Connection, email: &str, code: &str, ttl: Duration) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO verification_codes (email, code, expires_at)
         VALUES (?1, ?2, datetime('now', ?3))",
        params![email, code, modifier(ttl)],
    )?;
    Ok(())
}

fn count_recent(conn: &Connection, email: &str, window: Duration) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM verification_codes
         WHERE email = ?1 AND created_at > datetime('now', ?2)",
        params![email, modifier(-window)],
        |row| row.get(0),
    )
}

impl Database {
    pub fn store_verification_code(&self, email: &str, code: &str, ttl: Duration) -> Result<()> {
        self.with_conn(|conn| Ok(insert_code(conn, email, code, ttl)?))
    }

    /// Codes issued to `email` within the trailing `window`.
    pub fn recent_code_count(&self, email: &str, window: Duration) -> Result<i64> {
        self.with_conn(|conn| Ok(count_recent(conn, email, window)?))
    }

    /// Store `code` unless `email` already received `limit` codes within `window`.
    /// The count and the insert share one transaction. Returns false when capped.
    pub fn issue_verification_code(
        &self,
        email: &str,
        code: &str,
        ttl: Duration,
        window: Duration,
        limit: i64,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if count_recent(&tx, email, window)? >= limit {
                return Ok(false);
            }
            insert_code(&tx, email, code, ttl)?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Check `code` against the newest unused, unexpired code for `email` and mark
    /// it used on a match. Expired codes for the address are pruned first.
    pub fn consume_verification_code(&self, email: &str, code: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let pruned = tx.execute(
                "DELETE FROM verification_codes WHERE email = ?1 AND expires_at <= datetime('now')",
                [email],
            )?;
            if pruned > 0 {
                debug!("Pruned {} expired codes for {}", pruned, email);
            }

            let candidate: Option<(i64, String)> = tx
                .query_row(
                    "SELECT id, code FROM verification_codes
                     WHERE email = ?1 AND used = 0
                     ORDER BY created_at DESC, id DESC LIMIT 1",
                    [email],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let matched = match candidate {
                Some((id, stored)) if stored == code => {
                    tx.execute("UPDATE verification_codes SET used = 1 WHERE id = ?1", [id])?;
                    true
                }
                _ => false,
            };
            tx.commit()?;
            Ok(matched)
        })
    }

    pub fn verification_stats(&self, window: Duration) -> Result<VerificationStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(used), 0) FROM verification_codes
                 WHERE created_at > datetime('now', ?1)",
                [modifier(-window)],
                |row| {
                    Ok(VerificationStats {
                        total: row.get(0)?,
                        used: row.get(1)?,
                    })
                },
            )?;
            Ok(stats)
        })
    }
}
