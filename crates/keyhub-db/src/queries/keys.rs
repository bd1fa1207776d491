use std::collections::HashSet;

use anyhow::Result;
use rusqlite::{OptionalExtension, params, params_from_iter};
use tracing::debug;

use keyhub_types::models::{Key, KeyClaimer};

use super::users::{query_claimed_key, query_user};
use crate::Database;
use crate::models::{key_status, opt_timestamp};

/// Ids bound per DELETE, well under SQLite's host parameter limit.
const DELETE_CHUNK: usize = 500;

/// Result of a key claim attempt. Everything but `Claimed` leaves the store untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed(String),
    UserNotFound,
    Banned,
    NotWhitelisted,
    /// The user already holds this key.
    AlreadyClaimed(String),
    NoKeysAvailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyImport {
    pub added: usize,
    /// Submitted values that already existed in the store.
    pub duplicates: usize,
}

impl Database {
    /// Assign the oldest unclaimed key to `user_id`, checking every gate in one transaction.
    pub fn claim_key(&self, user_id: i64) -> Result<ClaimOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(user) = query_user(&tx, user_id)? else {
                return Ok(ClaimOutcome::UserNotFound);
            };
            if user.is_banned {
                return Ok(ClaimOutcome::Banned);
            }

            let whitelisted = tx
                .query_row("SELECT 1 FROM whitelist WHERE qq_number = ?1", [user_id], |_| Ok(()))
                .optional()?
                .is_some();
            if !whitelisted {
                return Ok(ClaimOutcome::NotWhitelisted);
            }

            if let Some(existing) = query_claimed_key(&tx, user_id)? {
                return Ok(ClaimOutcome::AlreadyClaimed(existing));
            }

            let available: Option<(i64, String)> = tx
                .query_row(
                    "SELECT id, key_value FROM keys WHERE status = 'unclaimed' ORDER BY id ASC LIMIT 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((key_id, key_value)) = available else {
                return Ok(ClaimOutcome::NoKeysAvailable);
            };

            tx.execute(
                "UPDATE keys SET status = 'claimed', claimed_by_user_id = ?2, claimed_at = datetime('now')
                 WHERE id = ?1",
                params![key_id, user_id],
            )?;
            tx.commit()?;

            debug!("Key {} claimed by user {}", key_id, user_id);
            Ok(ClaimOutcome::Claimed(key_value))
        })
    }

    /// All keys, newest first, with the claimer's nickname and email when known.
    pub fn list_keys(&self) -> Result<Vec<Key>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT k.id, k.key_value, k.status, k.claimed_by_user_id, k.claimed_at,
                        u.nickname, u.email
                 FROM keys k
                 LEFT JOIN users u ON u.id = k.claimed_by_user_id
                 ORDER BY k.id DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    let nickname: Option<String> = row.get(5)?;
                    let email: Option<String> = row.get(6)?;
                    Ok(Key {
                        id: row.get(0)?,
                        key_value: row.get(1)?,
                        status: key_status(row, 2)?,
                        claimed_by_user_id: row.get(3)?,
                        claimed_at: opt_timestamp(row, 4)?,
                        user: nickname
                            .zip(email)
                            .map(|(nickname, email)| KeyClaimer { nickname, email }),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Insert new unclaimed keys. Values are trimmed, blanks dropped and repeats
    /// within the batch collapsed before insertion.
    pub fn add_keys(&self, values: &[String]) -> Result<KeyImport> {
        let mut seen = HashSet::new();
        let unique: Vec<&str> = values
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty() && seen.insert(*v))
            .collect();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut added = 0;
            {
                let mut stmt = tx.prepare("INSERT OR IGNORE INTO keys (key_value) VALUES (?1)")?;
                for value in &unique {
                    added += stmt.execute([value])?;
                }
            }
            tx.commit()?;
            Ok(KeyImport {
                added,
                duplicates: unique.len() - added,
            })
        })
    }

    pub fn delete_keys(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut deleted = 0;
            for chunk in ids.chunks(DELETE_CHUNK) {
                let placeholders: Vec<String> = (1..=chunk.len()).map(|i| format!("?{}", i)).collect();
                let sql = format!("DELETE FROM keys WHERE id IN ({})", placeholders.join(", "));
                deleted += tx.execute(&sql, params_from_iter(chunk.iter()))?;
            }
            tx.commit()?;
            Ok(deleted)
        })
    }
}
